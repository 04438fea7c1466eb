//! Service Gateway
//!
//! Dynamic service routing with per-route resilience, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                   SERVICE GATEWAY                     │
//!   Client Request        │  ┌─────────┐   ┌─────────┐   ┌─────────┐             │
//!   ──────────────────────┼─▶│  http   │──▶│ routing │──▶│ circuit │             │
//!                         │  │ server  │   │ matcher │   │ breaker │             │
//!                         │  └─────────┘   └─────────┘   └────┬────┘             │
//!                         │                                   ▼                  │
//!                         │                  ┌──────────┐  ┌──────────────┐      │
//!                         │                  │ response │◀─│load_balancer │      │
//!                         │                  │  cache   │  │   + pool     │      │
//!                         │                  └──────────┘  └──────┬───────┘      │
//!   Client Response       │  ┌─────────┐                  ┌──────▼───────┐      │
//!   ◀─────────────────────┼──│response │◀─────────────────│    relay     │◀─────┼── Upstream
//!                         │  └─────────┘                  └──────────────┘      │
//!                         │                                                      │
//!                         │   health monitor · admin API · metrics · lifecycle   │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use service_gateway::lifecycle::signals;
use service_gateway::observability::{logging, metrics};
use service_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "service-gateway", version, about = "API gateway routing and resilience core")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        health_checks = config.health_check.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    // Config updates: file watcher and SIGHUP feed the same channel.
    let (config_updates, _watch_handle) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(signals::reload_on_sighup(
                path.clone(),
                watcher.sender(),
                shutdown.subscribe(),
            ));
            let handle = if args.no_watch {
                None
            } else {
                Some(watcher.run()?)
            };
            (updates, handle)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let mut server = HttpServer::new(config);
    if let Some(path) = &args.config {
        server = server.with_config_path(path.clone());
    }

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
