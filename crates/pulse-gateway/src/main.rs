//! # pulse-gateway
//!
//! Gateway binary — loads configuration, wires the session engine to the
//! HTTP/WebSocket server, and runs until a shutdown signal.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::{EventBus, StateStore};
use pulse_server::backend::BackendClient;
use pulse_server::config::{load_config, GatewayConfig};
use pulse_server::server::GatewayServer;
use pulse_server::session::SessionManager;
use pulse_server::{logging, metrics};
use tracing::info;

/// Realtime push-notification gateway.
#[derive(Parser, Debug)]
#[command(name = "pulse-gateway", about = "Realtime push-notification gateway")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config).
    #[arg(long)]
    port: Option<u16>,
}

fn resolve_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = load_config(cli.config.as_deref()).context("configuration error")?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let log_control = Arc::new(logging::init(&config.log_level));
    let metrics_handle = metrics::install_recorder();

    let backend = Arc::new(
        BackendClient::new(&config.backend, &config.service_key)
            .context("backend client setup failed")?,
    );
    let store = Arc::new(StateStore::new());
    let bus = Arc::new(EventBus::new());
    // Extensions would register their event subscribers on `bus` here.
    let manager = SessionManager::new(store, backend.clone(), bus, &config);

    let server = GatewayServer::new(config, manager, backend, log_control, metrics_handle);
    let (addr, server_task) = server
        .listen()
        .await
        .context("failed to bind listen address")?;
    info!(%addr, "pulse gateway ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    server.shutdown().drain().await;
    let _ = server_task.await;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
