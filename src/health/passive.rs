//! Passive outcome classification.
//!
//! # Design Decisions
//! - 5xx responses are failures for the route breaker
//! - Transport errors and timeouts are failures and also evict the server
//! - 4xx are NOT failures (client error, not backend)
//! - An oversized response is a complete answer: neither failure nor eviction

use axum::http::StatusCode;

use crate::gateway::relay::RelayError;

/// Whether an upstream response counts against the route's breaker.
pub fn is_failure_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Whether a relay error counts against the route's breaker.
pub fn is_failure_error(error: &RelayError) -> bool {
    !matches!(error, RelayError::ResponseTooLarge { .. })
}

/// Whether a transport error should take the server out of rotation.
pub fn evicts_server(error: &RelayError) -> bool {
    !matches!(
        error,
        RelayError::InvalidRequest(_) | RelayError::ResponseTooLarge { .. }
    )
}
