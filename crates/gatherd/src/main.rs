//! # gatherd
//!
//! Gather server binary — wires the store seams into the server and runs it
//! until SIGINT, then drains presence and shuts down gracefully.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gather_server::auth::JwtAuthenticator;
use gather_server::config::ServerConfig;
use gather_server::metrics;
use gather_server::server::GatherServer;
use gather_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use gather_store::{InMemoryEventRepository, InMemoryMembershipStore};

/// Gather server.
#[derive(Parser, Debug)]
#[command(name = "gatherd", about = "Real-time presence and update-distribution server")]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// HS256 secret for handshake tokens (overrides GATHER_JWT_SECRET).
    #[arg(long)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(secret) = cli.jwt_secret {
        config.jwt_secret = secret;
    }

    let metrics_handle = metrics::install_recorder();

    let auth = Arc::new(JwtAuthenticator::new(&config.jwt_secret));
    let repo = Arc::new(InMemoryEventRepository::new());
    let membership = Arc::new(InMemoryMembershipStore::new());

    let server = GatherServer::new(config, auth, repo, membership, Some(metrics_handle));
    let (addr, serve_handle) = server.listen().await?;
    info!(%addr, "gatherd running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // Drain live sessions and flush this node's membership records before
    // stopping the listener.
    server.presence().drain().await;
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle], DEFAULT_SHUTDOWN_TIMEOUT)
        .await;

    info!("shutdown complete");
    Ok(())
}
