//! tether - hybrid transport client entry point.

use anyhow::Result;
use clap::Parser;
use tether_client::diagnostics::{self, DiagnosticsState};
use tether_client::{AppConfig, TransportContext};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Resilient streaming client with stateless fallback
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TETHER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Session to connect, overriding the configured one
    #[arg(short, long)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection
    tether_ws::init_crypto();

    let args = Args::parse();
    tether_telemetry::init_logging()?;

    info!("Starting tether v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TETHER_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TETHER_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    info!(config_path = %config_path, "Loading configuration");

    let config = AppConfig::load(&config_path)?;
    let session_id = args.session_id.or_else(|| config.session_id.clone());
    let bind_addr = config.diagnostics.bind_addr.clone();

    let context = TransportContext::new(config)?;
    let shutdown = CancellationToken::new();

    let diagnostics_task = bind_addr.map(|addr| {
        let state = DiagnosticsState::new(context.streaming().clone(), context.transport_metrics());
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = diagnostics::serve(&addr, state, token).await {
                error!(error = %e, "Diagnostics server failed");
            }
        })
    });

    match session_id {
        Some(session_id) => {
            // A failed first attempt schedules reconnection on its own.
            if let Err(e) = context.connect(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Initial connect failed");
            }
        }
        None => warn!("No session configured, streaming transport stays idle"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = context.disconnect().await {
        warn!(error = %e, "Disconnect failed during shutdown");
    }
    context.shutdown();
    shutdown.cancel();
    if let Some(task) = diagnostics_task {
        let _ = task.await;
    }

    info!("tether stopped");
    Ok(())
}
