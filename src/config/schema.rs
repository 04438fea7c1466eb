//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to upstream services.
    pub routes: Vec<RouteConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Retry backoff configuration.
    pub retries: RetryConfig,

    /// Response cache housekeeping.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound request body buffered for forwarding, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Load balancing strategy for a route's server pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Weighted,
    LeastConnections,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::RoundRobin => write!(f, "round_robin"),
            Strategy::Weighted => write!(f, "weighted"),
            Strategy::LeastConnections => write!(f, "least_connections"),
        }
    }
}

/// A registered route: method + path pattern mapped to an upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: String,

    /// HTTP method to match (case-insensitive).
    pub method: String,

    /// Path pattern with `{name}` parameters and an optional trailing `*`.
    pub path_pattern: String,

    /// Logical service name (used for cache keys and health reporting).
    pub service_name: String,

    /// Fallback upstream used when `servers` is empty.
    #[serde(default)]
    pub upstream_url: Option<String>,

    /// Backend servers behind this route.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Load balancing strategy.
    #[serde(default)]
    pub strategy: Strategy,

    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-attempt upstream timeout in milliseconds.
    #[serde(default = "default_route_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts on transport-level failures.
    #[serde(default)]
    pub retry_attempts: u32,

    /// Response caching for GET requests.
    #[serde(default)]
    pub cache: RouteCacheConfig,

    /// Inactive routes are ignored at registration.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: i32,

    /// Path prefix removed before forwarding upstream.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Credential the gateway presents to the upstream in place of the caller's.
    #[serde(default)]
    pub upstream_auth: Option<UpstreamAuth>,
}

impl RouteConfig {
    /// Minimal route with a single server and defaults everywhere else.
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        path_pattern: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            path_pattern: path_pattern.into(),
            service_name: service_name.into(),
            upstream_url: None,
            servers: Vec::new(),
            strategy: Strategy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            timeout_ms: default_route_timeout_ms(),
            retry_attempts: 0,
            cache: RouteCacheConfig::default(),
            active: true,
            priority: 0,
            strip_prefix: None,
            upstream_auth: None,
        }
    }

    /// Add a backend server.
    pub fn with_server(mut self, url: impl Into<String>, weight: u32) -> Self {
        self.servers.push(ServerConfig {
            url: url.into(),
            weight,
        });
        self
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL (e.g., "http://127.0.0.1:3000").
    pub url: String,

    /// Weight for weighted load balancing (0 is treated as 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Upstream credential, keyed by `type`.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamAuth {
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// `Authorization: token <key>:<secret>`
    Token { key: String, secret: String },
    /// The key sent verbatim in a dedicated header.
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
        key: String,
    },
}

impl std::fmt::Debug for UpstreamAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamAuth::Bearer { .. } => f.write_str("Bearer(..)"),
            UpstreamAuth::Token { key, .. } => write!(f, "Token({key}:..)"),
            UpstreamAuth::ApiKey { header, .. } => write!(f, "ApiKey({header})"),
        }
    }
}

/// Per-route circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Disabled breakers admit every request.
    pub enabled: bool,

    /// Failures within the monitoring window that open the circuit.
    pub failure_threshold: u32,

    /// Time spent open before a trial request is admitted, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Rolling window over which outcomes are counted, in milliseconds.
    pub monitoring_window_ms: u64,

    /// Failure percentage (0-100) that opens the circuit once
    /// `minimum_requests` outcomes are in the window.
    pub failure_rate_threshold: f64,

    /// Outcomes required before the failure rate is considered.
    pub minimum_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            monitoring_window_ms: 60_000,
            failure_rate_threshold: 50.0,
            minimum_requests: 10,
        }
    }
}

/// Per-route response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteCacheConfig {
    /// Cache GET responses for this route.
    pub enabled: bool,

    /// Time-to-live in milliseconds.
    pub ttl_ms: u64,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: 300_000,
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_route_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_api_key_header() -> String {
    "x-api-key".into()
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health probes. The recovery sweep runs regardless.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// How long a server marked unhealthy by live traffic stays out of
    /// rotation when it is not re-probed, in seconds.
    pub recovery_secs: u64,

    /// Number of health records retained in the in-memory log.
    pub log_capacity: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
            recovery_secs: 60,
            log_capacity: 1000,
        }
    }
}

/// Retry backoff configuration. Attempt counts are per route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

/// Response cache housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval of the expired-entry sweep in seconds (0 disables it).
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration for the inbound side.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout towards upstreams in seconds.
    pub connect_secs: u64,

    /// Hard ceiling for a whole inbound request in seconds.
    pub request_secs: u64,

    /// Largest upstream response body buffered, in bytes.
    pub max_response_bytes: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 120,
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
