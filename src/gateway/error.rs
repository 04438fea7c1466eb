//! Dispatch failures.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::gateway::relay::RelayError;

/// Why a request could not be served.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route for {method} {path}")]
    NoRoute { method: Method, path: String },

    #[error("circuit breaker open for route {route_id}")]
    CircuitOpen {
        route_id: String,
        service: String,
        retry_after: Duration,
    },

    #[error("no healthy backend for route {route_id}")]
    NoHealthyBackend { route_id: String, service: String },

    #[error("upstream {server} failed after {attempts} attempt(s): {error}")]
    Upstream {
        route_id: String,
        service: String,
        server: String,
        attempts: u32,
        #[source]
        error: RelayError,
    },
}

impl DispatchError {
    /// Machine-readable reason, stable across releases.
    pub fn reason_code(&self) -> &'static str {
        match self {
            DispatchError::NoRoute { .. } => "NO_ROUTE",
            DispatchError::CircuitOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            DispatchError::NoHealthyBackend { .. } => "NO_HEALTHY_BACKEND",
            DispatchError::Upstream {
                error: RelayError::Timeout(_),
                ..
            } => "UPSTREAM_TIMEOUT",
            DispatchError::Upstream {
                error: RelayError::ResponseTooLarge { .. },
                ..
            } => "UPSTREAM_RESPONSE_TOO_LARGE",
            DispatchError::Upstream { .. } => "UPSTREAM_UNREACHABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NoRoute { .. } => StatusCode::NOT_FOUND,
            DispatchError::CircuitOpen { .. } | DispatchError::NoHealthyBackend { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DispatchError::Upstream {
                error: RelayError::Timeout(_),
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Service of the matched route, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            DispatchError::NoRoute { .. } => None,
            DispatchError::CircuitOpen { service, .. }
            | DispatchError::NoHealthyBackend { service, .. }
            | DispatchError::Upstream { service, .. } => Some(service),
        }
    }

    pub fn route_id(&self) -> Option<&str> {
        match self {
            DispatchError::NoRoute { .. } => None,
            DispatchError::CircuitOpen { route_id, .. }
            | DispatchError::NoHealthyBackend { route_id, .. }
            | DispatchError::Upstream { route_id, .. } => Some(route_id),
        }
    }
}
