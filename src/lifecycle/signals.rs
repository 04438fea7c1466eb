//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads routes from the config file, never shuts down
//! - A config that fails to load or validate keeps the current routes

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc};

use crate::config::{load_config, GatewayConfig};

/// Resolve on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}

/// Reload `path` on every SIGHUP and push the result through `updates`.
#[cfg(unix)]
pub async fn reload_on_sighup(
    path: PathBuf,
    updates: mpsc::UnboundedSender<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGHUP");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!(path = ?path, "SIGHUP received, reloading routes");
                match load_config(&path) {
                    Ok(config) => {
                        if updates.send(config).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Reload failed, keeping current routes"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// SIGHUP does not exist here; wait for shutdown instead.
#[cfg(not(unix))]
pub async fn reload_on_sighup(
    _path: PathBuf,
    _updates: mpsc::UnboundedSender<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let _ = shutdown.recv().await;
}
