//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route pattern and server URL once up front
//! - Validate value ranges (timeouts > 0, rates within 0-100)
//! - Detect duplicate route ids
//! - Check that upstream credentials form valid headers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Inactive routes are validated too, so activating one later cannot fail

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, RouteConfig};
use crate::routing::matcher::PathPattern;
use crate::routing::route::{parse_server_url, UpstreamCredential};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("routes[{0}]: id must not be empty")]
    EmptyRouteId(usize),

    #[error("route {0}: duplicate id")]
    DuplicateRouteId(String),

    #[error("route {route}: {reason}")]
    InvalidPattern { route: String, reason: String },

    #[error("route {route}: invalid method {method:?}")]
    InvalidMethod { route: String, method: String },

    #[error("route {0}: needs at least one server or an upstream_url")]
    NoServers(String),

    #[error("route {route}: {reason}")]
    InvalidServer { route: String, reason: String },

    #[error("route {route}: failure_rate_threshold {value} outside 0-100")]
    InvalidFailureRate { route: String, value: f64 },

    #[error("route {route}: strip_prefix {prefix:?} must start with '/'")]
    InvalidStripPrefix { route: String, prefix: String },

    #[error("route {route}: {reason}")]
    InvalidUpstreamAuth { route: String, reason: String },

    #[error("health_check.path {0:?} must start with '/'")]
    InvalidHealthPath(String),
}

/// Validate a full configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let health = &config.health_check;
    if health.enabled && health.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs".into()));
    }
    if health.enabled && health.timeout_secs == 0 {
        errors.push(ValidationError::Zero("health_check.timeout_secs".into()));
    }
    if !health.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(health.path.clone()));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs".into()));
    }

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.is_empty() {
            errors.push(ValidationError::EmptyRouteId(index));
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }
        validate_route(&mut errors, route);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(errors: &mut Vec<ValidationError>, route: &RouteConfig) {
    let id = &route.id;

    if let Err(e) = PathPattern::parse(&route.path_pattern) {
        errors.push(ValidationError::InvalidPattern {
            route: id.clone(),
            reason: e.to_string(),
        });
    }

    if Method::from_bytes(route.method.trim().to_ascii_uppercase().as_bytes()).is_err() {
        errors.push(ValidationError::InvalidMethod {
            route: id.clone(),
            method: route.method.clone(),
        });
    }

    if route.servers.is_empty() && route.upstream_url.is_none() {
        errors.push(ValidationError::NoServers(id.clone()));
    }
    let urls = route
        .servers
        .iter()
        .map(|s| s.url.as_str())
        .chain(route.upstream_url.as_deref());
    for url in urls {
        if let Err(e) = parse_server_url(id, url) {
            errors.push(ValidationError::InvalidServer {
                route: id.clone(),
                reason: e.to_string(),
            });
        }
    }

    if route.timeout_ms == 0 {
        errors.push(ValidationError::Zero(format!("route {id}: timeout_ms")));
    }

    let breaker = &route.circuit_breaker;
    if breaker.enabled {
        if breaker.monitoring_window_ms == 0 {
            errors.push(ValidationError::Zero(format!(
                "route {id}: circuit_breaker.monitoring_window_ms"
            )));
        }
        if !(0.0..=100.0).contains(&breaker.failure_rate_threshold) {
            errors.push(ValidationError::InvalidFailureRate {
                route: id.clone(),
                value: breaker.failure_rate_threshold,
            });
        }
    }

    if let Some(prefix) = &route.strip_prefix {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidStripPrefix {
                route: id.clone(),
                prefix: prefix.clone(),
            });
        }
    }

    if let Some(auth) = &route.upstream_auth {
        if let Err(e) = UpstreamCredential::from_config(id, auth) {
            errors.push(ValidationError::InvalidUpstreamAuth {
                route: id.clone(),
                reason: e.to_string(),
            });
        }
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
