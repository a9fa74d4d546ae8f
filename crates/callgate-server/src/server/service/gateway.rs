//! Bridges tonic's request handling onto the callgate core.
//!
//! Every unary request is turned into a call on the in-process
//! [`Service`] table. The method's receiver picks it up on a completion
//! driver thread and dispatches the handler to the worker pool; the tonic
//! task only awaits the oneshot reply.

use super::{
    handlers,
    proto::{EchoReply, EchoRequest, echo_server::Echo},
};
use crate::server::telemetry::{increment_calls_admitted, increment_calls_rejected};
use callgate::{
    CallContext, CompletionQueue, MethodId, MethodReceiver, Responder, Server, Service,
    WorkerPool,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status, metadata::KeyAndValueRef};

type EchoReceiver = MethodReceiver<Service, EchoRequest, EchoReply>;

/// tonic implementation of the `Echo` service.
///
/// Cheap to clone: all clones share one method table and one set of
/// receivers.
#[derive(Clone)]
pub struct EchoGateway {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<Service>,
    echo: MethodId<EchoRequest, EchoReply>,
    reverse: MethodId<EchoRequest, EchoReply>,
    receivers: Vec<Arc<EchoReceiver>>,
    server: Mutex<Option<Server>>,
}

impl EchoGateway {
    /// Registers the `Echo` methods, arms one receiver per method and starts
    /// `num_drivers` completion drivers.
    ///
    /// # Errors
    ///
    /// Fails if a receiver cannot be armed or a driver thread cannot be
    /// spawned.
    pub fn start(
        queue: Arc<CompletionQueue>,
        pool: Arc<WorkerPool>,
        num_drivers: usize,
    ) -> callgate::Result<Self> {
        let mut builder = Service::builder("callgate.echo.Echo");
        let echo = builder.add_method::<EchoRequest, EchoReply>("Echo");
        let reverse = builder.add_method::<EchoRequest, EchoReply>("Reverse");
        let service = builder.build();

        let receivers = vec![
            MethodReceiver::start(
                Arc::clone(&service),
                echo,
                queue.clone(),
                pool.clone(),
                handlers::echo,
            )?,
            MethodReceiver::start(
                Arc::clone(&service),
                reverse,
                queue.clone(),
                pool.clone(),
                handlers::reverse,
            )?,
        ];
        let server = Server::start(Arc::clone(&service), queue, pool, num_drivers)?;

        Ok(Self {
            inner: Arc::new(Inner {
                service,
                echo,
                reverse,
                receivers,
                server: Mutex::new(Some(server)),
            }),
        })
    }

    /// Stops admission, then drains drivers and workers. Calls arriving
    /// afterwards fail with `UNAVAILABLE`. Only the first call does any work.
    ///
    /// # Errors
    ///
    /// Propagates worker-pool shutdown failures.
    pub async fn shutdown(&self) -> callgate::Result<()> {
        let Some(server) = self.inner.server.lock().await.take() else {
            return Ok(());
        };
        server.shutdown().await?;

        #[cfg(feature = "tracing")]
        for receiver in &self.inner.receivers {
            tracing::info!(
                method = self.inner.service.method_name(receiver.method().index()),
                status = ?receiver.status(),
                dispatched = receiver.dispatched(),
                dispatch_failures = receiver.dispatch_failures(),
                "Receiver stopped"
            );
        }
        Ok(())
    }

    pub fn receivers(&self) -> &[Arc<EchoReceiver>] {
        &self.inner.receivers
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, fields(method = name))
    )]
    async fn call(
        &self,
        method: MethodId<EchoRequest, EchoReply>,
        name: &'static str,
        request: Request<EchoRequest>,
    ) -> Result<Response<EchoReply>, Status> {
        let context = call_context(&request);
        let (responder, reply) = Responder::channel();

        let _call_id = self
            .inner
            .service
            .deliver(method, context, request.into_inner(), responder)
            .map_err(|e| {
                increment_calls_rejected(name);
                to_status(e)
            })?;
        increment_calls_admitted(name);

        match reply.await {
            Ok(reply) => Ok(Response::new(reply)),
            Err(_) => {
                // The call was dropped without a reply: the pool rejected it,
                // or the service shut down before it was received.
                increment_calls_rejected(name);
                #[cfg(feature = "tracing")]
                tracing::warn!(call_id = _call_id, "Call dropped before a reply was sent");
                Err(Status::internal("Call dropped before a reply was sent"))
            }
        }
    }
}

#[tonic::async_trait]
impl Echo for EchoGateway {
    async fn echo(&self, request: Request<EchoRequest>) -> Result<Response<EchoReply>, Status> {
        self.call(self.inner.echo, "Echo", request).await
    }

    async fn reverse(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<EchoReply>, Status> {
        self.call(self.inner.reverse, "Reverse", request).await
    }
}

/// Copies the peer address and ASCII metadata of a tonic request.
fn call_context<T>(request: &Request<T>) -> CallContext {
    let mut context = CallContext::new().with_peer(request.remote_addr());
    for entry in request.metadata().iter() {
        if let KeyAndValueRef::Ascii(key, value) = entry
            && let Ok(value) = value.to_str()
        {
            context = context.with_metadata(key.as_str(), value);
        }
    }
    context
}

fn to_status(err: callgate::Error) -> Status {
    match err {
        callgate::Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        callgate::Error::PoolSaturated { .. } | callgate::Error::BacklogFull { .. } => {
            Status::resource_exhausted(err.to_string())
        }
        callgate::Error::UnknownMethod { .. } => Status::unimplemented(err.to_string()),
        callgate::Error::CallerGone => Status::cancelled("Request was cancelled"),
        _ => Status::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callgate::PoolConfig;
    use tonic::Code;

    fn gateway() -> EchoGateway {
        let queue = Arc::new(CompletionQueue::new());
        let pool = Arc::new(
            WorkerPool::spawn(&PoolConfig::default(), &tokio::runtime::Handle::current()).unwrap(),
        );
        EchoGateway::start(queue, pool, 2).unwrap()
    }

    fn request(message: &str) -> Request<EchoRequest> {
        Request::new(EchoRequest {
            message: message.to_string(),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn echo_and_reverse_round_trip_through_the_pool() {
        let gateway = gateway();

        let reply = gateway.echo(request("hello")).await.unwrap().into_inner();
        assert_eq!(reply.message, "hello");
        assert_eq!(reply.call_id, 1);

        let reply = gateway.reverse(request("héllo")).await.unwrap().into_inner();
        assert_eq!(reply.message, "olléh");
        assert_eq!(reply.call_id, 2);

        gateway.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_calls_each_get_their_own_reply() {
        let gateway = gateway();

        let calls = (0..64).map(|i| {
            let gateway = gateway.clone();
            async move { gateway.reverse(request(&format!("{i}-x"))).await }
        });
        let replies = futures::future::join_all(calls).await;

        let mut ids = Vec::new();
        for (i, reply) in replies.into_iter().enumerate() {
            let reply = reply.unwrap().into_inner();
            let digits: String = i.to_string().chars().rev().collect();
            assert_eq!(reply.message, format!("x-{digits}"));
            ids.push(reply.call_id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);

        gateway.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn calls_after_shutdown_are_unavailable() {
        let gateway = gateway();
        gateway.shutdown().await.unwrap();
        // Second shutdown is a no-op.
        gateway.shutdown().await.unwrap();

        let status = gateway.echo(request("late")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert!(
            gateway
                .receivers()
                .iter()
                .all(|r| r.status() == callgate::ReceiverStatus::Stopped)
        );
    }

    #[test]
    fn errors_map_to_grpc_codes() {
        assert_eq!(
            to_status(callgate::Error::ServiceShutdown).code(),
            Code::Unavailable
        );
        assert_eq!(
            to_status(callgate::Error::PoolSaturated { worker: 1 }).code(),
            Code::ResourceExhausted
        );
        assert_eq!(
            to_status(callgate::Error::BacklogFull { index: 0, limit: 8 }).code(),
            Code::ResourceExhausted
        );
        assert_eq!(
            to_status(callgate::Error::UnknownMethod {
                index: 7,
                registered: 2
            })
            .code(),
            Code::Unimplemented
        );
        assert_eq!(
            to_status(callgate::Error::SlotAlreadyFilled).code(),
            Code::Internal
        );
    }

    #[test]
    fn context_copies_ascii_metadata() {
        let mut request = request("m");
        request
            .metadata_mut()
            .insert("x-tenant", "acme".parse().unwrap());
        let context = call_context(&request);
        assert_eq!(context.metadata("x-tenant"), Some("acme"));
        assert_eq!(context.peer(), None);
    }
}
