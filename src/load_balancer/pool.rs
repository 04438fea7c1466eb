//! Backend pool management.
//!
//! # Responsibilities
//! - Own the backends of one route
//! - Apply the route's load balancing algorithm to the healthy subset
//! - Provide connection guards for tracking
//! - Take failing servers out of rotation

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::Strategy;
use crate::load_balancer::{
    LoadBalancer,
    backend::{Backend, BackendConnectionGuard},
    least_conn::LeastConnections,
    round_robin::RoundRobin,
    weighted::WeightedRandom,
};

/// Default time a soft-failed server stays out of rotation.
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(60);

/// The server pool of a single route.
#[derive(Debug)]
pub struct ServerPool {
    backends: Vec<Arc<Backend>>,
    strategy: Strategy,
    balancer: Box<dyn LoadBalancer>,
    recovery_window: Duration,
}

impl ServerPool {
    /// Create a pool. Callers guarantee `backends` is non-empty.
    pub fn new(backends: Vec<Arc<Backend>>, strategy: Strategy) -> Self {
        let balancer: Box<dyn LoadBalancer> = match strategy {
            Strategy::RoundRobin => Box::new(RoundRobin::new()),
            Strategy::Weighted => Box::new(WeightedRandom::new()),
            Strategy::LeastConnections => Box::new(LeastConnections::new()),
        };

        Self {
            backends,
            strategy,
            balancer,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
        }
    }

    /// Override the soft recovery window used by `mark_unhealthy`.
    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = window;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// All backends, healthy or not (for health checking and reporting).
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Select a healthy backend.
    /// Returns a guard that releases the connection count on drop.
    pub fn next_server(&self) -> Option<BackendConnectionGuard> {
        let healthy: Vec<Arc<Backend>> = self
            .backends
            .iter()
            .filter(|b| b.is_healthy())
            .cloned()
            .collect();

        match self.balancer.next_server(&healthy) {
            Some(backend) => Some(BackendConnectionGuard::new(backend)),
            None => {
                tracing::debug!(
                    backend_count = self.backends.len(),
                    strategy = %self.strategy,
                    "No healthy backends in pool"
                );
                None
            }
        }
    }

    /// Release a connection previously taken by `next_server` without a guard.
    /// Extra calls never drive the counter below zero.
    pub fn release(&self, backend: &Backend) {
        backend.release();
    }

    /// Take a server out of rotation until the recovery window elapses or the
    /// next health probe decides.
    pub fn mark_unhealthy(&self, backend: &Backend) {
        backend.mark_unhealthy(SystemTime::now(), self.recovery_window);
        tracing::warn!(
            server = %backend.url,
            recovery_secs = self.recovery_window.as_secs(),
            "Backend marked unhealthy"
        );
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }
}
