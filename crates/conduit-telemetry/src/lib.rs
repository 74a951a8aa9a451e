//! Telemetry for Conduit
//!
//! Structured logging via the `tracing` ecosystem and optional OTLP
//! metrics export. Completion metrics are recorded by [`MetricsObserver`].

mod metadata;
pub mod metrics;
mod observer;

use std::time::Duration;

use conduit_config::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use metrics::MetricsObserver;
pub use observer::LogObserver;

/// Guard that ensures proper cleanup of telemetry resources on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Whether OTLP metrics export is active
    pub const fn exports_metrics(&self) -> bool {
        self.meter_provider.is_some()
    }

    /// Force flush all pending metrics immediately
    ///
    /// # Errors
    ///
    /// Returns an error if the meter provider fails to flush
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(ref provider) = self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
    }
}

/// Initialize logging and, when an exporter is configured, OTLP metrics
///
/// `RUST_LOG` takes precedence over the configured filter. Returns a
/// guard that must be held for the lifetime of the application.
///
/// # Errors
///
/// Returns an error if the OTLP metrics exporter cannot be built
pub fn init(config: Option<&TelemetryConfig>) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let default_config = TelemetryConfig::default();
    let config = config.unwrap_or(&default_config);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let fmt_layer = match config.log_format {
        LogFormat::Text => fmt_layer.boxed(),
        LogFormat::Json => fmt_layer.json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    let mut guard = TelemetryGuard { meter_provider: None };

    if let Some(exporter) = &config.exporter {
        let resource = metadata::build_resource(config);
        let meter_provider = init_metrics(exporter, resource)?;
        global::set_meter_provider(meter_provider.clone());
        guard.meter_provider = Some(meter_provider);

        tracing::info!(endpoint = %exporter.endpoint, protocol = ?exporter.protocol, "OTLP metrics export enabled");
    }

    Ok(guard)
}

/// Initialize OTLP metrics export
fn init_metrics(config: &ExporterConfig, resource: opentelemetry_sdk::Resource) -> anyhow::Result<SdkMeterProvider> {
    use opentelemetry_sdk::metrics::PeriodicReader;

    let exporter = build_metrics_exporter(config)?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.interval_seconds))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    Ok(provider)
}

/// Build OTLP metrics exporter based on protocol
fn build_metrics_exporter(config: &ExporterConfig) -> anyhow::Result<opentelemetry_otlp::MetricExporter> {
    use opentelemetry_otlp::MetricExporter;

    let exporter = match config.protocol {
        ExportProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC metrics exporter: {e}"))?,
        ExportProtocol::HttpProto => MetricExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP metrics exporter: {e}"))?,
    };

    Ok(exporter)
}
