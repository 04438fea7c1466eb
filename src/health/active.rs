//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend of every route
//! - Update backend health state based on results
//! - Restore soft-failed backends whose recovery window has elapsed
//! - Append every outcome to the health log
//!
//! # Design Decisions
//! - One route table snapshot per tick; a reload mid-tick does not matter
//! - Probes run concurrently, each with its own timeout
//! - Shutdown interrupts a sweep in progress
//! - Never touches routing decisions, only per-backend flags

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::body::Body;
use axum::http::{header, Request, StatusCode, Uri};
use futures_util::future::{join_all, BoxFuture};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::gateway::relay::{upstream_uri, RelayError};
use crate::gateway::Gateway;
use crate::health::log::{CheckType, HealthLog, HealthRecord, HealthStatus};
use crate::load_balancer::backend::{unix_millis, Backend};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::routing::Route;

/// Tick used for the recovery sweep when probing is disabled.
const RECOVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Issues a single health probe.
pub trait Prober: Send + Sync {
    fn probe(&self, uri: Uri) -> BoxFuture<'_, Result<StatusCode, RelayError>>;
}

/// Probes with plain `GET` requests over the hyper-util client.
#[derive(Clone)]
pub struct HyperProber {
    client: Client<HttpConnector, Body>,
}

impl HyperProber {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }
}

impl Prober for HyperProber {
    fn probe(&self, uri: Uri) -> BoxFuture<'_, Result<StatusCode, RelayError>> {
        Box::pin(async move {
            let request = Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::USER_AGENT, "service-gateway-health-check")
                .body(Body::empty())
                .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

            let response = self.client.request(request).await.map_err(|e| {
                if e.is_connect() {
                    RelayError::Connect(e.to_string())
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;
            Ok(response.status())
        })
    }
}

pub struct HealthMonitor {
    gateway: Arc<Gateway>,
    config: HealthCheckConfig,
    prober: Arc<dyn Prober>,
    log: Arc<HealthLog>,
}

impl HealthMonitor {
    pub fn new(
        gateway: Arc<Gateway>,
        config: HealthCheckConfig,
        prober: Arc<dyn Prober>,
        log: Arc<HealthLog>,
    ) -> Self {
        Self {
            gateway,
            config,
            prober,
            log,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = if self.config.enabled {
            tracing::info!(
                interval = self.config.interval_secs,
                path = %self.config.path,
                "Health monitor starting"
            );
            Duration::from_secs(self.config.interval_secs.max(1))
        } else {
            tracing::info!("Active health checks disabled, running recovery sweep only");
            RECOVERY_SWEEP_INTERVAL
        };

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }

            self.sweep_recoveries();
            if !self.config.enabled {
                continue;
            }
            tokio::select! {
                count = self.check_all() => {
                    tracing::debug!(probes = count, "Health sweep complete");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal mid-sweep, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend once. Returns the number of probes issued.
    pub async fn check_all(&self) -> usize {
        let table = self.gateway.registry().snapshot();
        let probes: Vec<_> = table
            .routes()
            .iter()
            .flat_map(|route| {
                route
                    .pool
                    .backends()
                    .iter()
                    .map(move |backend| self.check_one(route, backend))
            })
            .collect();

        let count = probes.len();
        join_all(probes).await;
        count
    }

    /// Restore soft-failed backends whose window has passed.
    pub fn sweep_recoveries(&self) -> usize {
        let now = SystemTime::now();
        let table = self.gateway.registry().snapshot();
        let mut restored = 0;

        for route in table.routes() {
            for backend in route.pool.backends() {
                if backend.try_recover(now) {
                    restored += 1;
                    tracing::info!(
                        route_id = %route.id,
                        server = %backend.url,
                        "Backend restored after recovery window"
                    );
                    metrics::record_backend_health(&route.service_name, backend.url.as_str(), true);
                }
            }
        }
        restored
    }

    async fn check_one(&self, route: &Route, backend: &Arc<Backend>) {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let started = Instant::now();

        let outcome = match upstream_uri(&backend.url, &self.config.path) {
            Ok(uri) => with_timeout(timeout, self.prober.probe(uri)).await,
            Err(err) => Err(err),
        };

        let (healthy, status_code, error, response_time) = match outcome {
            Ok(status) => (status.is_success(), Some(status.as_u16()), None, started.elapsed()),
            Err(err) => {
                let elapsed = match err {
                    RelayError::Timeout(limit) => limit,
                    _ => started.elapsed(),
                };
                (false, None, Some(err.to_string()), elapsed)
            }
        };

        let was_healthy = backend.is_healthy();
        backend.record_probe(healthy, response_time, SystemTime::now());

        if was_healthy && !healthy {
            tracing::warn!(
                route_id = %route.id,
                server = %backend.url,
                status = ?status_code,
                error = ?error,
                "Health check failed"
            );
        } else if !was_healthy && healthy {
            tracing::info!(route_id = %route.id, server = %backend.url, "Backend healthy again");
        }
        metrics::record_backend_health(&route.service_name, backend.url.as_str(), healthy);

        self.log.append(HealthRecord {
            service: route.service_name.clone(),
            route_id: route.id.clone(),
            server_url: backend.url.to_string(),
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            response_time_ms: response_time.as_millis() as u64,
            status_code,
            error,
            checked_at: unix_millis(SystemTime::now()),
            check_type: CheckType::Automatic,
        });
    }
}
