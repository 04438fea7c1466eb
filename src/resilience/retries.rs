//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failed attempt is retryable
//! - Compute the attempt budget of a route
//!
//! # Design Decisions
//! - Only transport-level failures (connect, timeout, broken stream) retry
//! - Upstream responses are never retried, 4xx or 5xx
//! - An open breaker stops retrying (checked by the dispatcher)

use crate::gateway::relay::RelayError;

/// Whether a failed attempt may be retried.
pub fn is_retryable(error: &RelayError) -> bool {
    matches!(
        error,
        RelayError::Connect(_) | RelayError::Timeout(_) | RelayError::Transport(_)
    )
}

/// Total attempts for a route configured with `retry_attempts` retries.
pub fn max_attempts(retry_attempts: u32) -> u32 {
    retry_attempts.saturating_add(1)
}
