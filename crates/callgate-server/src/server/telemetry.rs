//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on. OpenTelemetry
//! export is opt-in per feature.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables OpenTelemetry distributed tracing (via spans), and
//!   the callgate core's own log sites.
//! - `metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `stdout`: Enables the stdout exporter.
//! - `otlp`: Enables the OTLP/gRPC exporter. The collector endpoint is read
//!   from `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! ## Feature constraints
//!
//! - Exporters require using at least one of: `tracing` or `metrics`.
//! - `stdout` and `otlp` can be enabled at the same time.
//!
//! ## Span behavior
//!
//! - Each gRPC call gets a span; events inside it become span events in
//!   telemetry backends.
//! - Events outside of a span (driver threads, worker lifecycle) are only
//!   shown in log output (via `fmt::layer()`), not exported.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features tracing,metrics,stdout
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run --features tracing,otlp
//! ```

// Disallow using `otlp` without `tracing` or `metrics`
#[cfg(all(feature = "otlp", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'tracing' or 'metrics' to be enabled.");

// Disallow using `stdout` without `tracing` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

// Core imports - always needed
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// OTLP-specific imports
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "tracing")))]
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder("callgate")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console output is independent of the `opentelemetry_stdout` exporter:
    // it prints spans/events as human-readable lines.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "tracing")))]
fn otlp_endpoint() -> anyhow::Result<String> {
    use anyhow::Context;

    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").context("missing `OTEL_EXPORTER_OTLP_ENDPOINT`")
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("callgate")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint()?)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(Compression::Gzip)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint()?)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(Compression::Gzip)
            .build()
            .context("failed to build tracer exporter")?;

        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();

        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static CALLS_ADMITTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CALLS_REJECTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static HANDLERS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static HANDLER_DURATION_US: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ADMISSION_DELAY_US: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = CALLS_ADMITTED.set(
        meter
            .u64_counter("calls_admitted")
            .with_description("Calls handed to the callgate method table")
            .build(),
    );

    let _ = CALLS_REJECTED.set(
        meter
            .u64_counter("calls_rejected")
            .with_description("Calls refused or dropped before a reply")
            .build(),
    );

    let _ = HANDLERS_INFLIGHT.set(
        meter
            .i64_up_down_counter("handlers_inflight")
            .with_description("Handlers currently running on the worker pool")
            .build(),
    );

    let _ = HANDLER_DURATION_US.set(
        meter
            .f64_histogram("handler_duration")
            .with_unit("us")
            .with_description("Time spent inside a handler")
            .build(),
    );

    let _ = ADMISSION_DELAY_US.set(
        meter
            .f64_histogram("admission_delay")
            .with_unit("us")
            .with_description("Time from receipt of a call to its handler starting")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_calls_admitted(method: &'static str) {
    if let Some(counter) = CALLS_ADMITTED.get() {
        counter.add(1, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_calls_admitted(_method: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_calls_rejected(method: &'static str) {
    if let Some(counter) = CALLS_REJECTED.get() {
        counter.add(1, &[KeyValue::new("method", method)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_calls_rejected(_method: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_handlers_inflight() {
    if let Some(counter) = HANDLERS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_handlers_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_handlers_inflight() {
    if let Some(counter) = HANDLERS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_handlers_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_handler_duration(duration_us: f64) {
    if let Some(histogram) = HANDLER_DURATION_US.get() {
        histogram.record(duration_us, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_handler_duration(_duration_us: f64) {}

#[cfg(feature = "metrics")]
pub fn record_admission_delay(delay_us: f64) {
    if let Some(histogram) = ADMISSION_DELAY_US.get() {
        histogram.record(delay_us, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_admission_delay(_delay_us: f64) {}
