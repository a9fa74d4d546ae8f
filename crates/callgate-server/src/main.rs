#![doc = include_str!("../README.md")]

mod server;

use callgate::{CompletionQueue, PoolConfig, WorkerPool};
use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::service::{EchoGateway, proto::FILE_DESCRIPTOR_SET, proto::echo_server::EchoServer};
use server::telemetry::{TelemetryProviders, init_telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let queue = Arc::new(CompletionQueue::new());
    let pool = Arc::new(WorkerPool::spawn(
        &PoolConfig {
            num_workers: config.num_workers,
            queue_capacity: config.work_queue_size,
            shutdown_timeout: config.shutdown_timeout,
        },
        &tokio::runtime::Handle::current(),
    )?);
    let gateway = EchoGateway::start(queue, pool, config.num_drivers)?;

    let tcp = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<EchoServer<EchoGateway>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .add_service(health_service)
        .add_service(reflection)
        .add_service(EchoServer::new(gateway.clone()))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(tcp),
            shutdown_signal(health_reporter),
        )
        .await?;

    // The transport has stopped taking requests; drain the core.
    if let Err(_e) = gateway.shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during service shutdown: {:?}", _e);
    }
    let _dropped: u64 = gateway
        .receivers()
        .iter()
        .map(|receiver| receiver.dispatch_failures())
        .sum();
    #[cfg(feature = "tracing")]
    tracing::info!(dropped = _dropped, "Calls dropped by a saturated pool");
    flush_telemetry(providers);

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting echo service on {} with full config: {:#?}",
            _config.server_addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting echo service on {} with {} workers and {} drivers",
            _config.server_addr,
            _config.num_workers,
            _config.num_drivers
        );
    }
}

async fn shutdown_signal(health_reporter: HealthReporter) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    health_reporter
        .set_not_serving::<EchoServer<EchoGateway>>()
        .await;
}

#[cfg_attr(
    not(any(feature = "tracing", feature = "metrics")),
    allow(unused_variables, clippy::needless_pass_by_value)
)]
fn flush_telemetry(providers: TelemetryProviders) {
    #[cfg(feature = "tracing")]
    {
        if let Err(err) = providers.tracer_provider.force_flush() {
            eprintln!("Error flushing traces: {err:#?}");
        }
        if let Err(err) = providers.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer: {err:#?}");
        }
    }

    #[cfg(feature = "metrics")]
    {
        if let Err(err) = providers.meter_provider.force_flush() {
            eprintln!("Error flushing metrics: {err:#?}");
        }
        if let Err(err) = providers.meter_provider.shutdown() {
            eprintln!("Error shutting down meter: {err:#?}");
        }
    }
}
