//! Circuit breaker for route protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within window
//!                (or failure rate >= rate threshold once enough samples)
//! Open → Half-Open: first acquire after recovery timeout
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-route circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering recovering upstream)
//! - Outcomes of requests admitted before a transition never drive the
//!   Half-Open decision; only the trial permit does

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::load_balancer::backend::unix_millis;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Admission to call the upstream. Must be handed back through
/// [`CircuitBreaker::record`] or [`CircuitBreaker::abandon`].
#[derive(Debug)]
#[must_use]
pub struct Permit {
    trial: bool,
}

impl Permit {
    /// True if this is the single Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// The circuit is open; retry after the given delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub retry_after: Duration,
}

/// Point-in-time view for stats endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub enabled: bool,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub failures_in_window: usize,
    pub successes_in_window: usize,
    /// Percentage, 0-100.
    pub failure_rate: f64,
    /// Unix millis of the last recorded failure.
    pub last_failure_at: Option<u64>,
    /// Time until a trial is admitted, when open.
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// (when, success)
    window: VecDeque<(Instant, bool)>,
    /// Failed entries currently in `window`.
    failures: usize,
    last_failure_at: Option<SystemTime>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// A per-route circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    enabled: bool,
    failure_threshold: u32,
    recovery_timeout: Duration,
    monitoring_window: Duration,
    failure_rate_threshold: f64,
    minimum_requests: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_millis(config.recovery_timeout_ms),
            monitoring_window: Duration::from_millis(config.monitoring_window_ms),
            failure_rate_threshold: config.failure_rate_threshold,
            minimum_requests: config.minimum_requests,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                failures: 0,
                last_failure_at: None,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current state without triggering time-based transitions.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask to call the upstream.
    pub fn try_acquire(&self) -> Result<Permit, Rejected> {
        self.try_acquire_at(Instant::now())
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, permit: Permit, success: bool) {
        self.record_at(permit, success, Instant::now());
    }

    /// Hand back a permit whose request never reached the upstream.
    pub fn abandon(&self, permit: Permit) {
        if !permit.trial {
            return;
        }
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<Permit, Rejected> {
        if !self.enabled {
            return Ok(Permit { trial: false });
        }

        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit { trial: false }),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Ok(Permit { trial: true })
                } else {
                    Err(Rejected {
                        retry_after: self.recovery_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(Rejected {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit { trial: true })
                }
            }
        }
    }

    fn record_at(&self, permit: Permit, success: bool, now: Instant) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        self.prune(&mut inner, now);
        inner.window.push_back((now, success));
        if !success {
            inner.failures += 1;
            inner.last_failure_at = Some(SystemTime::now());
        }

        match inner.state {
            CircuitState::HalfOpen if permit.trial => {
                inner.trial_in_flight = false;
                if success {
                    inner.window.clear();
                    inner.failures = 0;
                    inner.opened_at = None;
                    self.transition(&mut inner, CircuitState::Closed);
                } else {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::Closed if !success => {
                if self.should_open(&inner) {
                    self.open(&mut inner, now);
                }
            }
            // Late outcome of a request admitted before the last transition.
            _ => {}
        }
    }

    fn snapshot_at(&self, now: Instant) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.prune(&mut inner, now);

        let failures = inner.failures;
        let total = inner.window.len();
        let retry_after_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                self.recovery_timeout
                    .saturating_sub(now.saturating_duration_since(opened_at))
                    .as_millis() as u64,
            ),
            _ => None,
        };

        BreakerSnapshot {
            enabled: self.enabled,
            state: inner.state,
            failure_threshold: self.failure_threshold,
            failures_in_window: failures,
            successes_in_window: total - failures,
            failure_rate: failure_rate(failures, total),
            last_failure_at: inner.last_failure_at.map(unix_millis),
            retry_after_ms,
        }
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(&(at, ok)) = inner.window.front() {
            if now.saturating_duration_since(at) <= self.monitoring_window {
                break;
            }
            inner.window.pop_front();
            if !ok {
                inner.failures -= 1;
            }
        }
    }

    fn should_open(&self, inner: &Inner) -> bool {
        let failures = inner.failures;
        if failures >= self.failure_threshold as usize {
            return true;
        }

        let total = inner.window.len();
        self.minimum_requests > 0
            && total >= self.minimum_requests as usize
            && failure_rate(failures, total) >= self.failure_rate_threshold
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        inner.opened_at = Some(now);
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        if from == to {
            return;
        }
        match to {
            CircuitState::Open => tracing::warn!(
                route_id = %self.name,
                from = %from,
                threshold = self.failure_threshold,
                recovery_ms = self.recovery_timeout.as_millis() as u64,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(route_id = %self.name, from = %from, to = %to, "Circuit breaker transition"),
        }
        metrics::record_breaker_state(&self.name, to);
    }
}

fn failure_rate(failures: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        failures as f64 * 100.0 / total as f64
    }
}
