//! Route and service health reporting.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Strategy;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};
use crate::routing::RouteTable;

/// Aggregate counters over the live route table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub total_routes: usize,
    /// Routes with an enabled breaker.
    pub active_circuit_breakers: usize,
    pub open_circuit_breakers: usize,
    pub half_open_circuit_breakers: usize,
    /// Services with at least one healthy backend.
    pub healthy_services: usize,
    pub unhealthy_services: usize,
    pub healthy_backends: usize,
    pub unhealthy_backends: usize,
    pub cached_responses: usize,
    pub generation: u64,
}

/// One backend as seen by monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    pub route_id: String,
    pub url: String,
    pub healthy: bool,
    pub weight: u32,
    pub current_connections: usize,
    pub total_requests: u64,
    pub last_health_check: Option<u64>,
    pub response_time_ms: u64,
}

/// One route of a service.
#[derive(Debug, Clone, Serialize)]
pub struct RouteHealth {
    pub route_id: String,
    pub strategy: Strategy,
    pub breaker: BreakerSnapshot,
    pub servers: Vec<ServerHealth>,
}

/// Per-service snapshot, keyed by service name.
pub type ServiceHealth = BTreeMap<String, Vec<RouteHealth>>;

pub fn route_stats(table: &RouteTable, cached_responses: usize) -> RouteStats {
    let mut stats = RouteStats {
        total_routes: table.len(),
        cached_responses,
        generation: table.generation(),
        ..RouteStats::default()
    };
    let mut services: BTreeMap<&str, bool> = BTreeMap::new();

    for route in table.routes() {
        if route.breaker.is_enabled() {
            stats.active_circuit_breakers += 1;
        }
        match route.breaker.state() {
            CircuitState::Open => stats.open_circuit_breakers += 1,
            CircuitState::HalfOpen => stats.half_open_circuit_breakers += 1,
            CircuitState::Closed => {}
        }

        let healthy = route.pool.healthy_count();
        stats.healthy_backends += healthy;
        stats.unhealthy_backends += route.pool.backends().len() - healthy;

        *services.entry(route.service_name.as_str()).or_default() |= healthy > 0;
    }

    stats.healthy_services = services.values().filter(|up| **up).count();
    stats.unhealthy_services = services.len() - stats.healthy_services;
    stats
}

pub fn service_health(table: &RouteTable) -> ServiceHealth {
    let mut services = ServiceHealth::new();

    for route in table.routes() {
        let servers = route
            .pool
            .backends()
            .iter()
            .map(|backend| ServerHealth {
                route_id: route.id.clone(),
                url: backend.url.to_string(),
                healthy: backend.is_healthy(),
                weight: backend.weight,
                current_connections: backend.current_connections(),
                total_requests: backend.total_requests(),
                last_health_check: backend.last_health_check(),
                response_time_ms: backend.response_time_ms(),
            })
            .collect();

        services
            .entry(route.service_name.clone())
            .or_default()
            .push(RouteHealth {
                route_id: route.id.clone(),
                strategy: route.strategy(),
                breaker: route.breaker.snapshot(),
                servers,
            });
    }
    services
}
