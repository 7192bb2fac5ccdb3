//! Media API Gateway
//!
//! A fault-tolerant API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────┐
//!                        │                 MEDIA GATEWAY                   │
//!                        │                                                 │
//!   Client Request       │  ┌──────────┐   ┌─────────┐   ┌────────────┐   │
//!   ─────────────────────┼─▶│  access  │──▶│  rate   │──▶│  routing   │   │
//!                        │  │ control  │   │ limiter │   │  / views   │   │
//!                        │  └──────────┘   └─────────┘   └─────┬──────┘   │
//!                        │                                     │          │
//!                        │                                     ▼          │
//!                        │                         ┌────────────────────┐ │
//!                        │                         │  policy pipeline   │ │
//!                        │                         │ timeout/retry/cb   │ │
//!                        │                         └─────────┬──────────┘ │
//!                        │                                   │            │
//!                        │        content ◀──────────────────┼──▶ processing
//!                        │                                   └──▶ analytics
//!                        └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use tokio::net::TcpListener;

use media_gateway::config::loader::load_config;
use media_gateway::config::GatewayConfig;
use media_gateway::http::HttpServer;
use media_gateway::lifecycle::Shutdown;
use media_gateway::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config path: first CLI argument, else MEDIA_GATEWAY_CONFIG, else defaults.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MEDIA_GATEWAY_CONFIG").ok())
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("media-gateway v0.1.0 starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        auth_enabled = config.auth.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
