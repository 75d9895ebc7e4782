//! Integration gateway service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                 INTEGRATION GATEWAY                   │
//!   Callers       │                                                       │
//!   ──────────────┼─▶ registry / groupware / banking / fiscal            │
//!                 │        │                                              │
//!                 │        ▼                                              │
//!                 │   response cache ─▶ retry policy ─▶ transport ───────┼──▶ Authorities
//!                 │                                                       │
//!   Webhooks      │   ┌────────────┐    ┌──────────────────────────┐     │
//!   ──────────────┼─▶ │ axum server│──▶ │ banking webhook dispatch │     │
//!                 │   └────────────┘    └──────────────────────────┘     │
//!                 │                                                       │
//!                 │   background: cache sweeper, fiscal status monitor    │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use integration_gateway::config::loader::{load_config, load_default_config};
use integration_gateway::lifecycle::wait_for_signal;
use integration_gateway::observability::{logging, metrics};
use integration_gateway::{Collaborators, IntegrationGateway, WebhookServer};

/// Config path from the first argument or `GATEWAY_CONFIG`.
fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("GATEWAY_CONFIG").map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path() {
        Some(path) => load_config(&path)?,
        None => load_default_config()?,
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "integration-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for webhooks");

    let collaborators = Collaborators::from_config(&config);
    let gateway = Arc::new(IntegrationGateway::new(config, collaborators).await?);

    let server = WebhookServer::new(gateway.clone());
    let server_shutdown = gateway.shutdown_signal().await;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(listener, server_shutdown).await {
            tracing::error!(error = %e, "Webhook server failed");
        }
    });
    gateway.track("webhook-server", server_task).await;

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown signal received");
    gateway.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
