use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "llm-meter-gateway", about = "Metered chat-completion gateway")]
struct Args {
    /// TOML or JSON config; built-in endpoints and prices are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, visible_alias = "addr", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Export spans over OTLP/HTTP (requires the `gateway-otel` feature).
    #[arg(long)]
    otel: bool,

    /// Collector URL; implies `--otel`.
    #[arg(long)]
    otel_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let otel_enabled = args.otel || args.otel_endpoint.is_some();
    let _otel_guard = attach_otel(otel_enabled, args.otel_endpoint.as_deref(), args.json_logs)?;
    if !otel_enabled {
        llm_meter::gateway::telemetry::init_logging(args.json_logs)?;
    }

    let config = match &args.config {
        Some(path) => llm_meter::GatewayConfig::from_path(path)?,
        None => llm_meter::GatewayConfig::default(),
    };
    let dispatcher = llm_meter::Dispatcher::from_config(&config)?;
    tracing::info!(
        routes = dispatcher.endpoints().len(),
        "loaded gateway configuration"
    );

    let app = llm_meter::gateway::router(llm_meter::gateway::GatewayHttpState::new(dispatcher));

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "llm-meter-gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "gateway-otel")]
fn attach_otel(
    enabled: bool,
    endpoint: Option<&str>,
    json_logs: bool,
) -> Result<Option<llm_meter::gateway::otel::OtelGuard>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }
    Ok(Some(llm_meter::gateway::otel::init_tracing(
        "llm-meter-gateway",
        endpoint,
        json_logs,
    )?))
}

#[cfg(not(feature = "gateway-otel"))]
fn attach_otel(
    enabled: bool,
    _endpoint: Option<&str>,
    _json_logs: bool,
) -> Result<Option<()>, Box<dyn std::error::Error>> {
    if enabled {
        return Err("otel requires `--features gateway-otel`".into());
    }
    Ok(None)
}
