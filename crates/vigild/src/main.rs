//! # vigild
//!
//! Vigil server binary — a WebSocket server whose connections are kept
//! honest by heartbeat supervision.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vigil_ws::{ServerConfig, WsServer};

/// Heartbeat-supervised WebSocket server.
#[derive(Parser, Debug)]
#[command(name = "vigild", about = "Heartbeat-supervised WebSocket server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "9600")]
    port: u16,

    /// Milliseconds between probe pings.
    #[arg(long)]
    probe_interval_ms: Option<u64>,

    /// Milliseconds of silence before a connection is terminated.
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Maximum concurrent connections.
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Cli {
    /// Defaults, then `VIGIL_*` environment overrides, then explicit flags.
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::default().with_env_overrides();
        config.host = self.host;
        config.port = self.port;
        if let Some(ms) = self.probe_interval_ms {
            config.heartbeat.probe_interval_ms = ms;
        }
        if let Some(ms) = self.response_timeout_ms {
            config.heartbeat.response_timeout_ms = ms;
        }
        if let Some(n) = self.max_connections {
            config.max_connections = n;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    let server = WsServer::new(config).context("Invalid server configuration")?;

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("vigild listening on ws://{addr}/ws (health at http://{addr}/health)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown_and_wait(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
