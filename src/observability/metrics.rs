//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, health, breakers, cache)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rejections_total` (counter): dispatch failures by reason code
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy, by service and server
//! - `gateway_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open, by route
//! - `gateway_cache_lookups_total` (counter): by result (hit, miss)
//! - `gateway_cache_entries` (gauge): live cache entries
//!
//! # Design Decisions
//! - Facade macros only; the exporter is installed once by the binary
//! - Labels for route, server, status code

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(route_id: &str, method: &str, status: u16, started: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route_id.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route_id.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("gateway_rejections_total", "reason" => reason).increment(1);
}

pub fn record_backend_health(service: &str, server: &str, healthy: bool) {
    gauge!(
        "gateway_backend_health",
        "service" => service.to_string(),
        "server" => server.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_breaker_state(route_id: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_breaker_state", "route" => route_id.to_string()).set(value);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("gateway_cache_entries").set(entries as f64);
}
