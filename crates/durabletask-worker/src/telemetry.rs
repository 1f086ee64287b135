//! # Telemetry
//!
//! Logging is always on: [`init_telemetry`] installs a `tracing-subscriber`
//! registry with an `EnvFilter` (default `info`) and a human-readable `fmt`
//! layer. OpenTelemetry export is opt-in through features.
//!
//! ## Feature matrix
//!
//! - `traces`: exports spans through `tracing-opentelemetry`.
//! - `metrics`: exports the work-item counters and histograms below.
//! - `otlp`: OTLP/gRPC exporter, configured through
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` and `OTEL_EXPORTER_OTLP_COMPRESSION`.
//! - `stdout`: stdout exporter for local debugging.
//!
//! Exporters require at least one of `traces` or `metrics`.
//!
//! ## Metrics
//!
//! - `work_items_received` (by kind), `unknown_work_items`
//! - `active_work_items` - mirrors the dispatcher's active count
//! - `handler_failures`, `report_failures`, `abandoned_work_items`
//! - `handler_duration` (ms)
//!
//! Every recording function below compiles to a no-op without `metrics`.

#[cfg(all(feature = "otlp", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'traces' or 'metrics' to be enabled.");

#[cfg(all(feature = "stdout", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'traces' or 'metrics' to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "traces")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "traces")))]
use tonic::transport::ClientTlsConfig;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "durabletask-worker";

/// Providers that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every enabled provider.
    pub fn shutdown(self) {
        #[cfg(feature = "traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "traces")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "traces"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console logging is independent of the `stdout` exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        );

    #[cfg(feature = "traces")]
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
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "traces")))]
fn otlp_settings() -> anyhow::Result<(String, Compression)> {
    use anyhow::Context;
    use std::str::FromStr;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .context("missing `OTEL_EXPORTER_OTLP_ENDPOINT`")?;
    let compression = match std::env::var("OTEL_EXPORTER_OTLP_COMPRESSION") {
        Ok(raw) => Compression::from_str(&raw.to_ascii_lowercase())?,
        Err(_) => Compression::Gzip,
    };
    Ok((endpoint, compression))
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
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
        let reader = sdkmetrics::PeriodicReader::builder(MetricExporter::default())
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let (endpoint, compression) = otlp_settings()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(compression)
            .with_endpoint(endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "traces")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let (endpoint, compression) = otlp_settings()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(compression)
            .with_endpoint(endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;
        builder.with_batch_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static WORK_ITEMS_RECEIVED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static UNKNOWN_WORK_ITEMS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ACTIVE_WORK_ITEMS: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static HANDLER_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REPORT_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ABANDONED_WORK_ITEMS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static HANDLER_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = WORK_ITEMS_RECEIVED.set(
        meter
            .u64_counter("work_items_received")
            .with_description("Work items read from the sidecar stream")
            .build(),
    );
    let _ = UNKNOWN_WORK_ITEMS.set(
        meter
            .u64_counter("unknown_work_items")
            .with_description("Work items of an unsupported kind")
            .build(),
    );
    let _ = ACTIVE_WORK_ITEMS.set(
        meter
            .i64_up_down_counter("active_work_items")
            .with_description("Work items currently being dispatched")
            .build(),
    );
    let _ = HANDLER_FAILURES.set(
        meter
            .u64_counter("handler_failures")
            .with_description("Handlers that returned an error or panicked")
            .build(),
    );
    let _ = REPORT_FAILURES.set(
        meter
            .u64_counter("report_failures")
            .with_description("Completion reports the sidecar did not accept")
            .build(),
    );
    let _ = ABANDONED_WORK_ITEMS.set(
        meter
            .u64_counter("abandoned_work_items")
            .with_description("Work items dropped because of cancellation")
            .build(),
    );
    let _ = HANDLER_DURATION_MS.set(
        meter
            .f64_histogram("handler_duration")
            .with_unit("ms")
            .with_description("Time spent inside a work-item handler")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_work_items_received(kind: &'static str) {
    if let Some(counter) = WORK_ITEMS_RECEIVED.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_work_items_received(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_unknown_work_items() {
    if let Some(counter) = UNKNOWN_WORK_ITEMS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_unknown_work_items() {}

#[cfg(feature = "metrics")]
pub fn increment_active_work_items() {
    if let Some(counter) = ACTIVE_WORK_ITEMS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_active_work_items() {}

#[cfg(feature = "metrics")]
pub fn decrement_active_work_items() {
    if let Some(counter) = ACTIVE_WORK_ITEMS.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_active_work_items() {}

#[cfg(feature = "metrics")]
pub fn increment_handler_failures(kind: &'static str) {
    if let Some(counter) = HANDLER_FAILURES.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_handler_failures(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_report_failures(kind: &'static str) {
    if let Some(counter) = REPORT_FAILURES.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_report_failures(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_abandoned_work_items(kind: &'static str) {
    if let Some(counter) = ABANDONED_WORK_ITEMS.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_abandoned_work_items(_kind: &'static str) {}

#[cfg(feature = "metrics")]
pub fn record_handler_duration(kind: &'static str, duration_ms: f64) {
    if let Some(histogram) = HANDLER_DURATION_MS.get() {
        histogram.record(duration_ms, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_handler_duration(_kind: &'static str, _duration_ms: f64) {}
