//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the proxy listener
//! - Wire up middleware (tracing, timeout, request ID)
//! - Turn inbound requests into dispatch queries
//! - Spawn background tasks: health monitor, cache janitor, route reloads
//! - Serve the admin API on its own listener
//! - Drain everything on shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::gateway::{CallerIdentity, Gateway, HttpRelay, HyperRelay, RouteQuery};
use crate::health::{HealthLog, HealthMonitor, HyperProber, Prober};
use crate::http::{request, response};
use crate::lifecycle::shutdown::wait as wait_for_shutdown;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub health_log: Arc<HealthLog>,
    pub config: Arc<GatewayConfig>,
    /// File `POST /admin/reload` re-reads, if any.
    pub config_path: Option<PathBuf>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    state: AppState,
    prober: Arc<dyn Prober>,
}

impl HttpServer {
    /// Create a server forwarding with the hyper-util client.
    pub fn new(config: GatewayConfig) -> Self {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let relay = HyperRelay::new(connect_timeout, config.timeouts.max_response_bytes);
        let prober = HyperProber::new(connect_timeout);
        Self::with_collaborators(config, Arc::new(relay), Arc::new(prober))
    }

    /// Create a server with custom relay and probe implementations.
    pub fn with_collaborators(
        config: GatewayConfig,
        relay: Arc<dyn HttpRelay>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let gateway = Arc::new(Gateway::new(&config, relay));
        let health_log = Arc::new(HealthLog::new(config.health_check.log_capacity));

        Self {
            state: AppState {
                gateway,
                health_log,
                config: Arc::new(config),
                config_path: None,
                started_at: Instant::now(),
            },
            prober,
        }
    }

    /// Enable `POST /admin/reload` from this file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state.config_path = Some(path.into());
        self
    }

    /// Shared handler state (also used by the admin router).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        self.state.gateway.clone()
    }

    pub fn health_log(&self) -> Arc<HealthLog> {
        self.state.health_log.clone()
    }

    /// The proxy router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let request_timeout = Duration::from_secs(self.state.config.timeouts.request_secs);
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self.state.clone())
            .layer(request::propagate_request_id_layer())
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(request::set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Validated configs arriving on `config_updates` replace the route table.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let config = self.state.config.clone();
        tracing::info!(
            address = %addr,
            routes = self.state.gateway.registry().snapshot().len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(
            self.state.gateway.clone(),
            config.health_check.clone(),
            self.prober.clone(),
            self.state.health_log.clone(),
        );
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        if config.cache.sweep_interval_secs > 0 {
            let cache = self.state.gateway.cache().clone();
            tokio::spawn(cache.run_janitor(
                Duration::from_secs(config.cache.sweep_interval_secs),
                shutdown.resubscribe(),
            ));
        }

        tokio::spawn(apply_config_updates(
            self.state.gateway.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        if config.admin.enabled {
            let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
            let admin = setup_admin_router(self.state.clone());
            let admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, admin)
                    .with_graceful_shutdown(wait_for_shutdown(admin_shutdown))
                    .await
                {
                    tracing::error!(error = %e, "Admin server failed");
                }
            });
        }

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    gateway: Arc<Gateway>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    let report = gateway.reload_routes(&config.routes);
                    if !report.skipped.is_empty() {
                        tracing::warn!(skipped = ?report.skipped, "Some routes were not loaded");
                    }
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// Main proxy handler: every method and path is dispatched.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();

    let body = match axum::body::to_bytes(body, state.config.listener.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, path = %parts.uri.path(), "Rejecting request body");
            return response::payload_too_large();
        }
    };

    let query = RouteQuery {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().filter(|q| !q.is_empty()).map(str::to_string),
        request_id: request::request_id(&parts.headers),
        caller: parts.extensions.get::<CallerIdentity>().cloned(),
        client_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip()),
        headers: parts.headers,
        body,
    };

    tracing::debug!(
        request_id = ?query.request_id,
        method = %query.method,
        path = %query.path,
        "Dispatching request"
    );

    let (route_label, res) = match state.gateway.dispatch(query).await {
        Ok(outcome) => (outcome.route_id().to_string(), response::dispatched_response(outcome)),
        Err(err) => {
            let label = err.route_id().unwrap_or("none").to_string();
            (label, response::error_response(&err))
        }
    };

    metrics::record_request(&route_label, method.as_str(), res.status().as_u16(), started);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::gateway::{RelayError, RelayRequest, RelayResponse};
    use axum::http::{HeaderMap, StatusCode, Uri};
    use futures_util::future::BoxFuture;
    use tower::ServiceExt;
    use url::Url;

    struct Echo;

    impl HttpRelay for Echo {
        fn forward<'a>(
            &'a self,
            _target: &'a Url,
            request: RelayRequest,
        ) -> BoxFuture<'a, Result<RelayResponse, RelayError>> {
            Box::pin(async move {
                Ok(RelayResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: request.path_and_query.into(),
                })
            })
        }
    }

    struct AlwaysUp;

    impl Prober for AlwaysUp {
        fn probe(&self, _uri: Uri) -> BoxFuture<'_, Result<StatusCode, RelayError>> {
            Box::pin(async { Ok(StatusCode::OK) })
        }
    }

    fn server() -> HttpServer {
        let mut config = GatewayConfig::default();
        config.routes.push(
            RouteConfig::new("items", "GET", "/items/{id}", "catalog")
                .with_server("http://127.0.0.1:3001", 1),
        );
        HttpServer::with_collaborators(config, Arc::new(Echo), Arc::new(AlwaysUp))
    }

    #[tokio::test]
    async fn test_router_forwards_and_tags_response() {
        let res = server()
            .router()
            .oneshot(Request::get("/items/7?x=1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[response::X_ROUTE_ID], "items");
        assert!(res.headers().contains_key(request::X_REQUEST_ID));

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"/items/7?x=1");
    }

    #[tokio::test]
    async fn test_router_no_route() {
        let res = server()
            .router()
            .oneshot(Request::post("/items/7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut config = GatewayConfig::default();
        config.listener.max_body_bytes = 4;
        config.routes.push(
            RouteConfig::new("up", "POST", "/up", "files").with_server("http://127.0.0.1:1", 1),
        );
        let server = HttpServer::with_collaborators(config, Arc::new(Echo), Arc::new(AlwaysUp));

        let res = server
            .router()
            .oneshot(Request::post("/up").body(Body::from("too large")).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
