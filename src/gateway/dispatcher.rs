//! Request dispatch.
//!
//! # Responsibilities
//! - Resolve the route of an inbound request
//! - Gate it on the route's circuit breaker
//! - Serve cacheable GETs from the response cache
//! - Select a backend, forward, retry transport failures
//! - Feed every outcome back into the breaker, the pool and the cache
//!
//! # Design Decisions
//! - Typed outcomes for every pre-upstream rejection; the HTTP layer maps them
//! - Upstream failures are recorded, then returned to the caller unchanged
//! - A dropped dispatch future counts as a failed attempt

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::cache::{CacheKey, CachedResponse, ResponseCache};
use crate::config::{GatewayConfig, RetryConfig, RouteConfig};
use crate::gateway::error::DispatchError;
use crate::gateway::relay::{HttpRelay, RelayRequest, RelayResponse};
use crate::gateway::stats::{self, RouteStats, ServiceHealth};
use crate::health::passive;
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::resilience::circuit_breaker::{CircuitBreaker, Permit};
use crate::resilience::retries::{is_retryable, max_attempts};
use crate::resilience::timeouts::with_timeout;
use crate::routing::{ReloadReport, Route, RouteError, RouteRegistry};

pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_ROLE: &str = "x-user-role";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_GATEWAY_SERVICE: &str = "x-gateway-service";
pub const X_ORIGINAL_HOST: &str = "x-original-host";

/// Headers that never cross the gateway.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Identity established by the authentication layer in front of the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub role: Option<String>,
}

/// An inbound request, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct RouteQuery {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub caller: Option<CallerIdentity>,
    pub client_addr: Option<IpAddr>,
    pub request_id: Option<String>,
}

impl RouteQuery {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            caller: None,
            client_addr: None,
            request_id: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into()).filter(|q: &String| !q.is_empty());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = Some(caller);
        self
    }
}

/// A successfully served request.
#[derive(Debug)]
pub enum Dispatched {
    CacheHit {
        route_id: String,
        service: String,
        response: CachedResponse,
    },
    Forwarded {
        route_id: String,
        service: String,
        server: String,
        attempts: u32,
        /// Whether the request was eligible for caching (a MISS).
        cacheable: bool,
        response: RelayResponse,
    },
}

impl Dispatched {
    pub fn status(&self) -> StatusCode {
        match self {
            Dispatched::CacheHit { response, .. } => response.status,
            Dispatched::Forwarded { response, .. } => response.status,
        }
    }

    pub fn route_id(&self) -> &str {
        match self {
            Dispatched::CacheHit { route_id, .. } | Dispatched::Forwarded { route_id, .. } => {
                route_id
            }
        }
    }
}

/// Records a breaker failure unless the attempt is settled explicitly.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<Permit>,
}

impl<'a> InFlight<'a> {
    fn new(breaker: &'a CircuitBreaker, permit: Permit) -> Self {
        Self {
            breaker,
            permit: Some(permit),
        }
    }

    fn settle(mut self, success: bool) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record(permit, success);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            tracing::debug!("Upstream attempt cancelled");
            self.breaker.record(permit, false);
        }
    }
}

/// The gateway coordinator.
pub struct Gateway {
    registry: RouteRegistry,
    cache: ResponseCache,
    relay: Arc<dyn HttpRelay>,
    retries: RetryConfig,
}

impl Gateway {
    /// Build a gateway and load the configured routes.
    pub fn new(config: &GatewayConfig, relay: Arc<dyn HttpRelay>) -> Self {
        let registry =
            RouteRegistry::new(Duration::from_secs(config.health_check.recovery_secs));
        let gateway = Self {
            registry,
            cache: ResponseCache::new(),
            relay,
            retries: config.retries.clone(),
        };
        gateway.reload_routes(&config.routes);
        gateway
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Add a single route to the live table.
    pub fn register_route(&self, config: &RouteConfig) -> Result<Arc<Route>, RouteError> {
        self.registry.register(config)
    }

    /// Replace the live table.
    pub fn reload_routes(&self, configs: &[RouteConfig]) -> ReloadReport {
        self.registry.reload(configs)
    }

    pub fn route_stats(&self) -> RouteStats {
        stats::route_stats(&self.registry.snapshot(), self.cache.len())
    }

    pub fn service_health(&self) -> ServiceHealth {
        stats::service_health(&self.registry.snapshot())
    }

    /// Serve one request.
    pub async fn dispatch(&self, query: RouteQuery) -> Result<Dispatched, DispatchError> {
        let result = self.dispatch_inner(query).await;
        if let Err(err) = &result {
            metrics::record_rejection(err.reason_code());
        }
        result
    }

    async fn dispatch_inner(&self, query: RouteQuery) -> Result<Dispatched, DispatchError> {
        // 1. Route
        let matched = self
            .registry
            .match_route(&query.method, &query.path)
            .ok_or_else(|| DispatchError::NoRoute {
                method: query.method.clone(),
                path: query.path.clone(),
            })?;
        let route = matched.route;

        // 2. Breaker
        let mut permit = route.breaker.try_acquire().map_err(|rejected| {
            tracing::warn!(
                route_id = %route.id,
                service = %route.service_name,
                retry_after_ms = rejected.retry_after.as_millis() as u64,
                "Circuit breaker open"
            );
            DispatchError::CircuitOpen {
                route_id: route.id.clone(),
                service: route.service_name.clone(),
                retry_after: rejected.retry_after,
            }
        })?;

        // 3. Cache
        let cache_key = (route.cache.enabled && query.method == Method::GET).then(|| {
            CacheKey::new(
                &route.service_name,
                &query.method,
                &query.path,
                query.query.as_deref(),
            )
        });
        if let Some(key) = &cache_key {
            if let Some(response) = self.cache.get(key) {
                route.breaker.abandon(permit);
                tracing::debug!(route_id = %route.id, key = %key, "Cache hit");
                return Ok(Dispatched::CacheHit {
                    route_id: route.id.clone(),
                    service: route.service_name.clone(),
                    response,
                });
            }
        }

        // 4-6. Select, forward, record
        let request = self.upstream_request(&route, &query);
        let max = max_attempts(route.retry_attempts);
        let mut attempt = 0;
        // (server, error) of the previous failed attempt
        let mut last_failure = None;

        loop {
            attempt += 1;

            let Some(server) = route.pool.next_server() else {
                route.breaker.abandon(permit);
                if let Some((server, error)) = last_failure {
                    // Retries ran out of servers; report what actually failed.
                    return Err(DispatchError::Upstream {
                        route_id: route.id.clone(),
                        service: route.service_name.clone(),
                        server,
                        attempts: attempt - 1,
                        error,
                    });
                }
                tracing::warn!(
                    route_id = %route.id,
                    service = %route.service_name,
                    "No healthy backend"
                );
                return Err(DispatchError::NoHealthyBackend {
                    route_id: route.id.clone(),
                    service: route.service_name.clone(),
                });
            };

            let in_flight = InFlight::new(&route.breaker, permit);
            let result =
                with_timeout(route.timeout, self.relay.forward(&server.url, request.clone())).await;

            match result {
                Ok(response) => {
                    in_flight.settle(!passive::is_failure_status(response.status));
                    let server_url = server.url.to_string();
                    drop(server);

                    if let Some(key) = cache_key.clone() {
                        if response.status == StatusCode::OK {
                            let content_type = response
                                .headers
                                .get(header::CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            self.cache.set(
                                key,
                                CachedResponse {
                                    status: response.status,
                                    content_type,
                                    body: response.body.clone(),
                                },
                                route.cache.ttl,
                            );
                        }
                    }

                    return Ok(Dispatched::Forwarded {
                        route_id: route.id.clone(),
                        service: route.service_name.clone(),
                        server: server_url,
                        attempts: attempt,
                        cacheable: cache_key.is_some(),
                        response,
                    });
                }
                Err(error) => {
                    in_flight.settle(!passive::is_failure_error(&error));
                    if passive::evicts_server(&error) {
                        route.pool.mark_unhealthy(&server);
                    }
                    let server_url = server.url.to_string();
                    drop(server);

                    tracing::warn!(
                        route_id = %route.id,
                        server = %server_url,
                        attempt,
                        error = %error,
                        "Upstream attempt failed"
                    );

                    if attempt < max && is_retryable(&error) {
                        tokio::time::sleep(retry_delay(attempt, &self.retries)).await;
                        if let Ok(next) = route.breaker.try_acquire() {
                            permit = next;
                            last_failure = Some((server_url, error));
                            continue;
                        }
                        tracing::debug!(route_id = %route.id, "Breaker opened, not retrying");
                    }

                    return Err(DispatchError::Upstream {
                        route_id: route.id.clone(),
                        service: route.service_name.clone(),
                        server: server_url,
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }

    fn upstream_request(&self, route: &Route, query: &RouteQuery) -> RelayRequest {
        let mut headers = query.headers.clone();
        strip_hop_by_hop(&mut headers);
        // The client recomputes the length from the buffered body.
        headers.remove(header::CONTENT_LENGTH);
        let original_host = headers.remove(header::HOST);
        // Identity comes only from the authentication layer.
        headers.remove(X_USER_ID);
        headers.remove(X_USER_ROLE);

        if let Some(credential) = &route.upstream_auth {
            headers.remove(header::AUTHORIZATION);
            headers.insert(credential.name.clone(), credential.value.clone());
        }
        if let Some(host) = original_host {
            headers.insert(X_ORIGINAL_HOST, host);
        }

        if let Some(id) = query.request_id.as_deref() {
            insert_header(&mut headers, crate::http::request::X_REQUEST_ID, id);
        }
        if let Some(addr) = query.client_addr {
            let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{existing}, {addr}"),
                None => addr.to_string(),
            };
            insert_header(&mut headers, X_FORWARDED_FOR, &forwarded);
        }
        insert_header(&mut headers, X_GATEWAY_SERVICE, &route.service_name);
        if let Some(caller) = &query.caller {
            insert_header(&mut headers, X_USER_ID, &caller.user_id);
            if let Some(role) = &caller.role {
                insert_header(&mut headers, X_USER_ROLE, role);
            }
        }

        let path = route.upstream_path(&query.path);
        let path_and_query = match &query.query {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };

        RelayRequest {
            method: query.method.clone(),
            path_and_query,
            headers,
            body: query.body.clone(),
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = name, "Dropping header with invalid value"),
    }
}
