use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::SpanExporter;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use super::telemetry::{env_filter, fmt_layer};

/// Flushes pending spans when the gateway shuts down.
#[derive(Debug)]
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        let _ = self.provider.shutdown();
    }
}

/// Installs the log subscriber plus an OTLP/HTTP span exporter for `service_name`.
///
/// `endpoint` overrides the exporter's default collector URL.
pub fn init_tracing(
    service_name: &str,
    endpoint: Option<&str>,
    json_logs: bool,
) -> Result<OtelGuard, Box<dyn std::error::Error>> {
    let provider = tracer_provider(service_name, endpoint)?;
    global::set_tracer_provider(provider.clone());

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(json_logs))
        .with(otel_layer)
        .try_init()?;

    Ok(OtelGuard { provider })
}

fn tracer_provider(
    service_name: &str,
    endpoint: Option<&str>,
) -> Result<SdkTracerProvider, Box<dyn std::error::Error>> {
    let mut exporter = SpanExporter::builder().with_http();
    if let Some(endpoint) = endpoint {
        exporter = exporter.with_endpoint(endpoint.to_string());
    }

    let resource = Resource::builder_empty()
        .with_service_name(service_name.to_string())
        .build();
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter.build()?)
        .with_resource(resource)
        .build())
}
