//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server of a route
//! - Track active connections (for Least Connections LB) and request totals
//! - Track health state, probe latency and pending soft recovery
//!
//! Every field is an independent atomic: the request path and the health
//! checker update them concurrently as best-effort counters.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Milliseconds since the Unix epoch.
pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL requests are forwarded to.
    pub url: Url,
    /// Weight for weighted selection (0 is treated as 1).
    pub weight: u32,

    healthy: AtomicBool,
    current_connections: AtomicUsize,
    total_requests: AtomicU64,
    /// Unix millis of the last probe, 0 = never probed.
    last_health_check: AtomicU64,
    response_time_ms: AtomicU64,
    /// Unix millis after which a soft-failed server returns to rotation, 0 = none.
    recover_at: AtomicU64,
}

impl Backend {
    /// Create a new backend. Backends start healthy.
    pub fn new(url: Url, weight: u32) -> Self {
        Self {
            url,
            weight,
            healthy: AtomicBool::new(true),
            current_connections: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            last_health_check: AtomicU64::new(0),
            response_time_ms: AtomicU64::new(0),
            recover_at: AtomicU64::new(0),
        }
    }

    /// Weight used by the weighted strategy.
    pub fn effective_weight(&self) -> u64 {
        u64::from(self.weight.max(1))
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn current_connections(&self) -> usize {
        self.current_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn response_time_ms(&self) -> u64 {
        self.response_time_ms.load(Ordering::Relaxed)
    }

    /// Unix millis of the last completed probe, if any.
    pub fn last_health_check(&self) -> Option<u64> {
        match self.last_health_check.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Record a selection: one more in-flight request.
    pub(crate) fn acquire(&self) {
        self.current_connections.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the in-flight counter, never below zero.
    pub fn release(&self) {
        let _ = self
            .current_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Take the server out of rotation until `now + window`, or until the
    /// next active probe decides, whichever comes first.
    pub fn mark_unhealthy(&self, now: SystemTime, window: Duration) {
        self.healthy.store(false, Ordering::Release);
        self.recover_at
            .store(unix_millis(now + window), Ordering::Release);
    }

    /// Restore a soft-failed server whose recovery window has elapsed.
    /// Returns true if the server was restored.
    pub fn try_recover(&self, now: SystemTime) -> bool {
        let due = self.recover_at.load(Ordering::Acquire);
        if due == 0 || unix_millis(now) < due {
            return false;
        }
        if self
            .recover_at
            .compare_exchange(due, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.healthy.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Apply the result of an active probe.
    pub fn record_probe(&self, healthy: bool, response_time: Duration, at: SystemTime) {
        self.last_health_check.store(unix_millis(at), Ordering::Relaxed);
        self.response_time_ms
            .store(response_time.as_millis() as u64, Ordering::Relaxed);
        // A probe result supersedes any pending soft recovery.
        self.recover_at.store(0, Ordering::Release);
        self.healthy.store(healthy, Ordering::Release);
    }
}

/// A RAII guard for one selection; dropping it releases the connection.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
}

impl BackendConnectionGuard {
    pub(crate) fn new(backend: Arc<Backend>) -> Self {
        backend.acquire();
        Self { backend }
    }
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.release();
    }
}
