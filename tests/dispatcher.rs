//! Dispatcher behavior against a scripted upstream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use futures_util::future::BoxFuture;
use service_gateway::config::{GatewayConfig, RouteConfig};
use service_gateway::gateway::{
    DispatchError, Dispatched, Gateway, HttpRelay, RelayError, RelayRequest, RelayResponse,
    RouteQuery,
};
use service_gateway::resilience::circuit_breaker::CircuitState;
use service_gateway::routing::Route;
use url::Url;

#[derive(Debug, Clone)]
enum Step {
    Status(u16),
    Fail(RelayError),
    /// Respond 200 after the delay.
    Delay(Duration),
}

/// Plays back a script; answers 200 once the script runs out.
#[derive(Default)]
struct ScriptedRelay {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    targets: Mutex<Vec<String>>,
}

impl ScriptedRelay {
    fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpRelay for ScriptedRelay {
    fn forward<'a>(
        &'a self,
        target: &'a Url,
        _request: RelayRequest,
    ) -> BoxFuture<'a, Result<RelayResponse, RelayError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.to_string());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Status(200));

        Box::pin(async move {
            let status = match step {
                Step::Status(code) => code,
                Step::Fail(error) => return Err(error),
                Step::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    200
                }
            };
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(RelayResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers,
                body: Bytes::from(format!("{{\"status\":{status}}}")),
            })
        })
    }
}

fn gateway(routes: Vec<RouteConfig>, relay: Arc<ScriptedRelay>) -> Arc<Gateway> {
    let mut config = GatewayConfig {
        routes,
        ..GatewayConfig::default()
    };
    config.retries.base_delay_ms = 1;
    Arc::new(Gateway::new(&config, relay))
}

fn route_of(gateway: &Gateway, id: &str) -> Arc<Route> {
    gateway.registry().snapshot().get(id).cloned().unwrap()
}

fn get(path: &str) -> RouteQuery {
    RouteQuery::new(Method::GET, path)
}

fn total_selections(route: &Route) -> u64 {
    route.pool.backends().iter().map(|b| b.total_requests()).sum()
}

fn in_flight(route: &Route) -> usize {
    route
        .pool
        .backends()
        .iter()
        .map(|b| b.current_connections())
        .sum()
}

#[tokio::test]
async fn test_breaker_open_half_open_close() {
    let mut config = RouteConfig::new("orders", "GET", "/orders/*", "orders")
        .with_server("http://127.0.0.1:3001", 1);
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.recovery_timeout_ms = 100;

    let relay = ScriptedRelay::new([Step::Status(500), Step::Status(503)]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "orders");

    for _ in 0..2 {
        let outcome = gw.dispatch(get("/orders/1")).await.unwrap();
        assert!(outcome.status().is_server_error());
    }
    assert_eq!(route.breaker.state(), CircuitState::Open);

    // Fails fast without selecting a server.
    let selected = total_selections(&route);
    let err = gw.dispatch(get("/orders/1")).await.unwrap_err();
    assert!(matches!(err, DispatchError::CircuitOpen { .. }));
    assert_eq!(err.reason_code(), "CIRCUIT_BREAKER_OPEN");
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(total_selections(&route), selected);
    assert_eq!(relay.calls(), 2);

    tokio::time::sleep(Duration::from_millis(120)).await;

    // Trial succeeds and closes the circuit.
    let outcome = gw.dispatch(get("/orders/1")).await.unwrap();
    assert_eq!(outcome.status(), StatusCode::OK);
    assert_eq!(route.breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_admits_one_trial() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.recovery_timeout_ms = 50;

    let relay = ScriptedRelay::new([
        Step::Status(500),
        Step::Delay(Duration::from_millis(200)),
    ]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "r");

    gw.dispatch(get("/a")).await.unwrap();
    assert_eq!(route.breaker.state(), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let trial_gw = gw.clone();
    let trial = tokio::spawn(async move { trial_gw.dispatch(get("/a")).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(route.breaker.state(), CircuitState::HalfOpen);

    let err = gw.dispatch(get("/a")).await.unwrap_err();
    assert!(matches!(err, DispatchError::CircuitOpen { .. }));

    let outcome = trial.await.unwrap().unwrap();
    assert_eq!(outcome.status(), StatusCode::OK);
    assert_eq!(route.breaker.state(), CircuitState::Closed);
    assert_eq!(relay.calls(), 2);
}

#[tokio::test]
async fn test_client_errors_keep_breaker_closed() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    config.circuit_breaker.failure_threshold = 1;

    let relay = ScriptedRelay::new(std::iter::repeat(Step::Status(404)).take(5));
    let gw = gateway(vec![config], relay);
    let route = route_of(&gw, "r");

    for _ in 0..5 {
        let outcome = gw.dispatch(get("/missing")).await.unwrap();
        assert_eq!(outcome.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(route.breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cache_hit_skips_selection() {
    let mut config = RouteConfig::new("items", "GET", "/items/{id}", "catalog")
        .with_server("http://127.0.0.1:3001", 1);
    config.cache.enabled = true;
    config.cache.ttl_ms = 60_000;

    let relay = ScriptedRelay::new([]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "items");

    let first = gw.dispatch(get("/items/1")).await.unwrap();
    assert!(matches!(first, Dispatched::Forwarded { cacheable: true, .. }));
    let selected = total_selections(&route);

    let second = gw.dispatch(get("/items/1")).await.unwrap();
    match second {
        Dispatched::CacheHit { response, .. } => {
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.content_type.as_deref(), Some("application/json"));
            assert_eq!(response.body, Bytes::from_static(b"{\"status\":200}"));
        }
        other => panic!("expected cache hit, got {other:?}"),
    }
    assert_eq!(total_selections(&route), selected);
    assert_eq!(relay.calls(), 1);
    assert_eq!(gw.cache().len(), 1);
}

#[tokio::test]
async fn test_cache_entry_expires() {
    let mut config = RouteConfig::new("items", "GET", "/items/{id}", "catalog")
        .with_server("http://127.0.0.1:3001", 1);
    config.cache.enabled = true;
    config.cache.ttl_ms = 50;

    let relay = ScriptedRelay::new([]);
    let gw = gateway(vec![config], relay.clone());

    gw.dispatch(get("/items/1")).await.unwrap();
    gw.dispatch(get("/items/1")).await.unwrap();
    assert_eq!(relay.calls(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let outcome = gw.dispatch(get("/items/1")).await.unwrap();
    assert!(matches!(outcome, Dispatched::Forwarded { .. }));
    assert_eq!(relay.calls(), 2);
}

#[tokio::test]
async fn test_only_ok_get_responses_are_cached() {
    let mut items = RouteConfig::new("items", "GET", "/items/{id}", "catalog")
        .with_server("http://127.0.0.1:3001", 1);
    items.cache.enabled = true;
    let mut orders = RouteConfig::new("orders", "POST", "/orders", "orders")
        .with_server("http://127.0.0.1:3002", 1);
    orders.cache.enabled = true;

    let relay = ScriptedRelay::new([Step::Status(500)]);
    let gw = gateway(vec![items, orders], relay.clone());

    // 500 is not stored, the following 200 is
    gw.dispatch(get("/items/1")).await.unwrap();
    gw.dispatch(get("/items/1")).await.unwrap();
    assert_eq!(relay.calls(), 2);

    // Non-GET never touches the cache
    let created = gw
        .dispatch(RouteQuery::new(Method::POST, "/orders").with_body("{}"))
        .await
        .unwrap();
    assert!(matches!(created, Dispatched::Forwarded { cacheable: false, .. }));
    assert_eq!(gw.cache().len(), 1);
}

#[tokio::test]
async fn test_no_healthy_backend() {
    let config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1)
        .with_server("http://127.0.0.1:3002", 1);
    let relay = ScriptedRelay::new([]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "r");

    for backend in route.pool.backends() {
        route.pool.mark_unhealthy(backend);
    }

    let err = gw.dispatch(get("/a")).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoHealthyBackend { .. }));
    assert_eq!(err.reason_code(), "NO_HEALTHY_BACKEND");
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(relay.calls(), 0);
}

#[tokio::test]
async fn test_timeout_evicts_server() {
    let mut config = RouteConfig::new("slow", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    config.timeout_ms = 50;

    let relay = ScriptedRelay::new([Step::Delay(Duration::from_secs(5))]);
    let gw = gateway(vec![config], relay);
    let route = route_of(&gw, "slow");

    let err = gw.dispatch(get("/a")).await.unwrap_err();
    assert_eq!(err.reason_code(), "UPSTREAM_TIMEOUT");
    assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

    assert!(!route.pool.backends()[0].is_healthy());
    assert_eq!(in_flight(&route), 0);
    assert_eq!(route.breaker.snapshot().failures_in_window, 1);
}

#[tokio::test]
async fn test_oversized_response_is_not_a_backend_failure() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1)
        .with_server("http://127.0.0.1:3002", 1);
    config.retry_attempts = 2;
    config.circuit_breaker.failure_threshold = 1;

    let relay = ScriptedRelay::new([Step::Fail(RelayError::ResponseTooLarge { limit: 1024 })]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "r");

    let err = gw.dispatch(get("/a")).await.unwrap_err();
    assert_eq!(err.reason_code(), "UPSTREAM_RESPONSE_TOO_LARGE");
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

    assert_eq!(relay.calls(), 1);
    assert!(route.pool.backends().iter().all(|b| b.is_healthy()));
    assert_eq!(route.breaker.state(), CircuitState::Closed);
    assert_eq!(route.breaker.snapshot().failures_in_window, 0);
    assert_eq!(in_flight(&route), 0);
}

#[tokio::test]
async fn test_cancelled_dispatch_counts_as_failure() {
    let config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    let relay = ScriptedRelay::new([Step::Delay(Duration::from_secs(5))]);
    let gw = gateway(vec![config], relay);
    let route = route_of(&gw, "r");

    let dropped = tokio::time::timeout(Duration::from_millis(50), gw.dispatch(get("/a"))).await;
    assert!(dropped.is_err());

    assert_eq!(in_flight(&route), 0);
    assert_eq!(route.breaker.snapshot().failures_in_window, 1);
}

#[tokio::test]
async fn test_retry_moves_to_next_server() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1)
        .with_server("http://127.0.0.1:3002", 1);
    config.retry_attempts = 2;

    let relay = ScriptedRelay::new([Step::Fail(RelayError::Connect("refused".into()))]);
    let gw = gateway(vec![config], relay.clone());

    match gw.dispatch(get("/a")).await.unwrap() {
        Dispatched::Forwarded { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected forward, got {other:?}"),
    }
    let targets = relay.targets.lock().unwrap();
    assert_eq!(targets.len(), 2);
    assert_ne!(targets[0], targets[1]);
}

#[tokio::test]
async fn test_exhausted_retries_return_upstream_error() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1)
        .with_server("http://127.0.0.1:3002", 1);
    config.retry_attempts = 5;

    let relay = ScriptedRelay::new([
        Step::Fail(RelayError::Connect("refused".into())),
        Step::Fail(RelayError::Connect("refused".into())),
    ]);
    let gw = gateway(vec![config], relay.clone());

    let err = gw.dispatch(get("/a")).await.unwrap_err();
    match &err {
        DispatchError::Upstream {
            attempts, error, ..
        } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(error, RelayError::Connect(_)));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(err.reason_code(), "UPSTREAM_UNREACHABLE");
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(relay.calls(), 2);
}

#[tokio::test]
async fn test_upstream_5xx_is_not_retried() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1)
        .with_server("http://127.0.0.1:3002", 1);
    config.retry_attempts = 3;

    let relay = ScriptedRelay::new([Step::Status(502)]);
    let gw = gateway(vec![config], relay.clone());
    let route = route_of(&gw, "r");

    let outcome = gw.dispatch(get("/a")).await.unwrap();
    assert_eq!(outcome.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(relay.calls(), 1);
    // A response, even a 5xx, proves the server is reachable.
    assert_eq!(route.pool.healthy_count(), 2);
}

#[tokio::test]
async fn test_unmatched_request() {
    let config = RouteConfig::new("r", "GET", "/api/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    let relay = ScriptedRelay::new([]);
    let gw = gateway(vec![config], relay.clone());

    let err = gw.dispatch(get("/other")).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoRoute { .. }));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert!(err.route_id().is_none());
    assert_eq!(relay.calls(), 0);
}

#[tokio::test]
async fn test_stats_reflect_traffic() {
    let mut config = RouteConfig::new("r", "GET", "/*", "svc")
        .with_server("http://127.0.0.1:3001", 1);
    config.circuit_breaker.failure_threshold = 1;
    config.cache.enabled = true;

    let relay = ScriptedRelay::new([Step::Status(200), Step::Status(500)]);
    let gw = gateway(vec![config], relay);

    gw.dispatch(get("/cached")).await.unwrap();
    gw.dispatch(get("/fails")).await.unwrap();

    let stats = gw.route_stats();
    assert_eq!(stats.total_routes, 1);
    assert_eq!(stats.open_circuit_breakers, 1);
    assert_eq!(stats.cached_responses, 1);

    let health = gw.service_health();
    assert_eq!(health["svc"][0].route_id, "r");
}
