//! Telemetry wiring: structured logs, the metrics exporter, and optional
//! OTLP trace export.
//!
//! The fmt layer is always installed, filtered by `RUST_LOG` or the
//! configured log level. The Prometheus endpoint needs the `prometheus`
//! feature, OTLP export the `otel` feature.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

type TelemetryError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(feature = "otel")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> =
    std::sync::OnceLock::new();

/// Install the global tracing subscriber and start the configured metric
/// and trace exporters.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    #[cfg(feature = "otel")]
    if let Some(otel_config) = &config.opentelemetry {
        registry.with(otel_layer(otel_config)?).init();
        tracing::info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
        serve_metrics(config)?;
        return Ok(());
    }

    registry.init();
    serve_metrics(config)?;
    Ok(())
}

/// Flush pending telemetry on shutdown.
pub fn shutdown() {
    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            tracing::warn!(%err, "error shutting down tracer provider");
        }
    }
}

fn serve_metrics(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "Prometheus metrics exporter listening");
    }

    #[cfg(not(feature = "prometheus"))]
    if config.prometheus_addr.is_some() {
        tracing::warn!(
            "prometheus_addr is configured but this build lacks the `prometheus` feature"
        );
    }

    Ok(())
}

#[cfg(feature = "otel")]
fn otel_layer<S>(
    config: &crate::config::OpenTelemetryConfig,
) -> Result<tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>, TelemetryError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_semantic_conventions::resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attributes([
                    KeyValue::new(resource::SERVICE_NAME, config.service_name.clone()),
                    KeyValue::new(resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                ])
                .build(),
        )
        .build();

    let tracer = provider.tracer("kube-gateway-dns");
    let _ = TRACER_PROVIDER.set(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}
