//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (admit, or fail fast while open)
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On transport failure: retries.rs (retryable?) + backoff.rs (delay)
//!     → circuit_breaker.rs (record outcome, open circuit if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for transport failures, never for upstream responses
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;
