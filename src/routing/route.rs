//! Compiled, immutable route.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

use crate::config::{RouteConfig, Strategy, UpstreamAuth};
use crate::load_balancer::backend::Backend;
use crate::load_balancer::pool::ServerPool;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::routing::matcher::{PathPattern, PatternError};

/// Errors raised while compiling a route from configuration.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {id}: {source}")]
    Pattern {
        id: String,
        #[source]
        source: PatternError,
    },

    #[error("route {id}: invalid method {method:?}")]
    Method { id: String, method: String },

    #[error("route {id}: invalid server url {url:?}: {source}")]
    ServerUrl {
        id: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("route {id}: server url {url:?} must use http")]
    ServerScheme { id: String, url: String },

    #[error("route {0}: no servers and no upstream_url")]
    NoServers(String),

    #[error("route {0}: is inactive")]
    Inactive(String),

    #[error("route {0}: id already registered")]
    DuplicateId(String),

    #[error("route {id}: upstream_auth {reason}")]
    UpstreamAuth { id: String, reason: String },
}

/// Cache policy of a route.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Duration,
}

/// The header a route adds to every upstream request.
#[derive(Debug, Clone)]
pub struct UpstreamCredential {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl UpstreamCredential {
    pub fn from_config(id: &str, auth: &UpstreamAuth) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::UpstreamAuth {
            id: id.to_string(),
            reason: reason.to_string(),
        };
        let (name, value) = match auth {
            UpstreamAuth::Bearer { token } => (header::AUTHORIZATION, format!("Bearer {token}")),
            UpstreamAuth::Token { key, secret } => {
                (header::AUTHORIZATION, format!("token {key}:{secret}"))
            }
            UpstreamAuth::ApiKey { header, key } => {
                let name = HeaderName::from_bytes(header.trim().as_bytes())
                    .map_err(|_| invalid("header is not a valid header name"))?;
                (name, key.clone())
            }
        };
        let mut value =
            HeaderValue::from_str(&value).map_err(|_| invalid("credential is not a valid header value"))?;
        value.set_sensitive(true);
        Ok(Self { name, value })
    }
}

/// A registered route with its own pool and breaker.
#[derive(Debug)]
pub struct Route {
    pub id: String,
    pub method: Method,
    pub pattern: PathPattern,
    pub service_name: String,
    pub pool: ServerPool,
    pub breaker: CircuitBreaker,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub cache: CachePolicy,
    pub priority: i32,
    pub strip_prefix: Option<String>,
    pub upstream_auth: Option<UpstreamCredential>,
}

impl Route {
    /// Compile a route. The pool is never empty on success.
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        if !config.active {
            return Err(RouteError::Inactive(config.id.clone()));
        }

        let pattern = PathPattern::parse(&config.path_pattern).map_err(|source| {
            RouteError::Pattern {
                id: config.id.clone(),
                source,
            }
        })?;

        let method = Method::from_bytes(config.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteError::Method {
                id: config.id.clone(),
                method: config.method.clone(),
            })?;

        let backends = build_backends(config)?;
        let upstream_auth = config
            .upstream_auth
            .as_ref()
            .map(|auth| UpstreamCredential::from_config(&config.id, auth))
            .transpose()?;

        Ok(Self {
            id: config.id.clone(),
            method,
            pattern,
            service_name: config.service_name.clone(),
            pool: ServerPool::new(backends, config.strategy),
            breaker: CircuitBreaker::new(config.id.clone(), &config.circuit_breaker),
            timeout: Duration::from_millis(config.timeout_ms),
            retry_attempts: config.retry_attempts,
            cache: CachePolicy {
                enabled: config.cache.enabled,
                ttl: Duration::from_millis(config.cache.ttl_ms),
            },
            priority: config.priority,
            strip_prefix: config.strip_prefix.clone().filter(|p| !p.is_empty()),
            upstream_auth,
        })
    }

    /// Set the soft recovery window of the pool.
    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.pool = self.pool.with_recovery_window(window);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.pool.strategy()
    }

    /// Path sent upstream after prefix stripping.
    pub fn upstream_path<'a>(&self, path: &'a str) -> &'a str {
        match &self.strip_prefix {
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some("") => "/",
                Some(rest) if rest.starts_with('/') => rest,
                _ => path,
            },
            None => path,
        }
    }
}

/// Parse and check a backend base URL.
pub fn parse_server_url(id: &str, raw: &str) -> Result<Url, RouteError> {
    let url = Url::parse(raw).map_err(|source| RouteError::ServerUrl {
        id: id.to_string(),
        url: raw.to_string(),
        source,
    })?;
    if url.scheme() != "http" {
        return Err(RouteError::ServerScheme {
            id: id.to_string(),
            url: raw.to_string(),
        });
    }
    Ok(url)
}

fn build_backends(config: &RouteConfig) -> Result<Vec<Arc<Backend>>, RouteError> {
    if config.servers.is_empty() {
        return match &config.upstream_url {
            Some(upstream) => {
                let url = parse_server_url(&config.id, upstream)?;
                Ok(vec![Arc::new(Backend::new(url, 1))])
            }
            None => Err(RouteError::NoServers(config.id.clone())),
        };
    }

    config
        .servers
        .iter()
        .map(|server| {
            let url = parse_server_url(&config.id, &server.url)?;
            Ok(Arc::new(Backend::new(url, server.weight)))
        })
        .collect()
}
