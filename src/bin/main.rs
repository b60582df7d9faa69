//! kube-gateway-dns binary entry point.

use clap::Parser;
use kube_gateway_dns::{telemetry, Config, DnsServer, Gateway};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Authoritative DNS server over Kubernetes gateway state.
#[derive(Parser, Debug)]
#[command(name = "kube-gateway-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "kube-gateway-dns.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("KUBE_GATEWAY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.gateway.listen_addr,
        zones = ?config.gateway.zones,
        resources = ?config.gateway.resources,
        "Starting kube-gateway-dns"
    );

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    // Assemble the gateway. The cluster indexer attaches its per-resource
    // indexes, readiness probe, and dirty signal here before serving.
    let gateway = Gateway::new(&config.gateway)?;

    let server = DnsServer::new(Arc::new(gateway), config.gateway.listen_addr);
    let result = server.run(shutdown).await;

    // Shutdown telemetry
    telemetry::shutdown();

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("kube-gateway-dns shutdown complete");
    Ok(())
}
