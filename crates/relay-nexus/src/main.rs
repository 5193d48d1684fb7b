//! relay-nexus server entry point.
//!
//! Loads an optional TOML config, applies command-line overrides, starts the
//! Nexus on the enabled listeners and runs until Ctrl+C.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_nexus::{NexusConfig, NexusServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Channel-based publish/subscribe broker.
#[derive(Debug, Parser)]
#[command(name = "relay-nexus", version)]
struct Cli {
    /// TOML config file.  Command-line flags override its values.
    #[arg(long, env = "RELAY_NEXUS_CONFIG")]
    config: Option<PathBuf>,

    /// Address both listeners bind to.
    #[arg(long, env = "RELAY_NEXUS_BIND")]
    bind: Option<String>,

    /// TCP listener port.
    #[arg(long, env = "RELAY_NEXUS_TCP_PORT")]
    tcp_port: Option<u16>,

    /// WebSocket listener port.
    #[arg(long, env = "RELAY_NEXUS_WS_PORT")]
    ws_port: Option<u16>,

    /// Disable the TCP listener.
    #[arg(long)]
    no_tcp: bool,

    /// Disable the WebSocket listener.
    #[arg(long)]
    no_ws: bool,

    /// Tell remaining channel members when a client disconnects.
    #[arg(long, env = "RELAY_NEXUS_LEAVE_ON_DISCONNECT")]
    leave_on_disconnect: bool,
}

impl Cli {
    /// Loads the config file (or defaults) and applies the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or parsed.
    fn into_config(self) -> anyhow::Result<NexusConfig> {
        let mut config = match &self.config {
            Some(path) => NexusConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => NexusConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.tcp.bind_address = bind.clone();
            config.websocket.bind_address = bind;
        }
        if let Some(port) = self.tcp_port {
            config.tcp.port = port;
        }
        if let Some(port) = self.ws_port {
            config.websocket.port = port;
        }
        if self.no_tcp {
            config.tcp.enabled = false;
        }
        if self.no_ws {
            config.websocket.enabled = false;
        }
        if self.leave_on_disconnect {
            config.leave_on_disconnect = true;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let server = NexusServer::new(&config).context("building nexus server")?;
    server.start().await.context("starting nexus server")?;
    info!("relay-nexus ready.  Press Ctrl-C to exit.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }

    server.stop().await.context("stopping nexus server")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
