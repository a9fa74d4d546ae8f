use callgate::{
    CallContext, CallHandle, CompletionQueue, MethodReceiver, PoolConfig, Responder, Server,
    Service, WorkerPool,
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{sync::Arc, time::Instant};
use tokio::runtime::Builder;

// Calls admitted per benchmark iteration
const TOTAL_CALLS: usize = 16 * 1024;

/// Admit `TOTAL_CALLS` unary calls and wait for every reply, across a range
/// of driver counts.
fn bench_admission(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");

    let mut group = c.benchmark_group("admission/echo");
    for num_drivers in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(TOTAL_CALLS as u64));
        group.bench_function(
            format!("elems/{TOTAL_CALLS}/drivers/{num_drivers}"),
            |b| {
                b.iter_custom(|iters| {
                    rt.block_on(async {
                        let mut builder = Service::builder("bench.Echo");
                        builder.max_backlog(TOTAL_CALLS);
                        let echo = builder.add_method::<u64, u64>("Echo");
                        let service = builder.build();
                        let queue = Arc::new(CompletionQueue::new());
                        let pool = Arc::new(
                            WorkerPool::spawn(
                                &PoolConfig {
                                    queue_capacity: TOTAL_CALLS,
                                    ..PoolConfig::default()
                                },
                                &tokio::runtime::Handle::current(),
                            )
                            .expect("failed to spawn pool"),
                        );
                        let _receiver = MethodReceiver::start(
                            Arc::clone(&service),
                            echo,
                            queue.clone(),
                            pool.clone(),
                            |call: CallHandle<u64, u64>| {
                                let _ = call.respond(*call.request());
                            },
                        )
                        .expect("failed to start receiver");
                        let server = Server::start(Arc::clone(&service), queue, pool, num_drivers)
                            .expect("failed to start drivers");

                        let start = Instant::now();
                        for _ in 0..iters {
                            let mut replies = Vec::with_capacity(TOTAL_CALLS);
                            for i in 0..TOTAL_CALLS as u64 {
                                let (responder, rx) = Responder::channel();
                                service
                                    .deliver(echo, CallContext::new(), i, responder)
                                    .expect("deliver failed");
                                replies.push(rx);
                            }
                            for reply in futures::future::join_all(replies).await {
                                black_box(reply.expect("reply dropped"));
                            }
                        }
                        let elapsed = start.elapsed();

                        server.shutdown().await.expect("shutdown failed");
                        elapsed
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_admission);
criterion_main!(benches);
