//! Admin API.
//!
//! Read-only views of routes, breakers and backend health, plus a reload
//! trigger. Served on its own listener behind a bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/health", get(get_health))
        .route("/admin/health/log", get(get_health_log))
        .route("/admin/reload", post(post_reload))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RouteConfig};
    use crate::http::HttpServer;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::io::Write;
    use tower::ServiceExt;

    fn state() -> AppState {
        let mut config = GatewayConfig::default();
        config.admin.api_key = "secret".into();
        config.routes.push(
            RouteConfig::new("items", "GET", "/items", "catalog")
                .with_server("http://127.0.0.1:3001", 1),
        );
        HttpServer::new(config).state()
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let router = setup_admin_router(state());

        let res = router.clone().oneshot(get("/admin/stats", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router.clone().oneshot(get("/admin/stats", Some("wrong"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router.oneshot(get("/admin/stats", Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let stats = body_json(res).await;
        assert_eq!(stats["total_routes"], 1);
        assert_eq!(stats["open_circuit_breakers"], 0);
    }

    #[tokio::test]
    async fn test_health_snapshot() {
        let router = setup_admin_router(state());
        let res = router.oneshot(get("/admin/health", Some("secret"))).await.unwrap();
        let health = body_json(res).await;
        assert_eq!(health["catalog"][0]["route_id"], "items");
        assert_eq!(health["catalog"][0]["servers"][0]["healthy"], true);
        assert_eq!(health["catalog"][0]["breaker"]["state"], "closed");
    }

    #[tokio::test]
    async fn test_reload_from_file() {
        let mut state = state();
        let mut file = std::env::temp_dir();
        file.push(format!("gateway-admin-reload-{}.toml", std::process::id()));
        let mut f = std::fs::File::create(&file).unwrap();
        writeln!(
            f,
            r#"
            [[routes]]
            id = "a"
            method = "GET"
            path_pattern = "/a"
            service_name = "alpha"
            upstream_url = "http://127.0.0.1:4000"

            [[routes]]
            id = "b"
            method = "GET"
            path_pattern = "/b"
            service_name = "beta"
            upstream_url = "http://127.0.0.1:4001"
            active = false
            "#
        )
        .unwrap();
        state.config_path = Some(file.clone());
        let gateway = state.gateway.clone();

        let router = setup_admin_router(state);
        let req = Request::post("/admin/reload")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let report = body_json(res).await;
        assert_eq!(report["loaded"], 1);
        assert_eq!(report["inactive"], 1);
        assert!(gateway.registry().snapshot().get("a").is_some());
        assert!(gateway.registry().snapshot().get("items").is_none());

        let _ = std::fs::remove_file(file);
    }

    #[tokio::test]
    async fn test_reload_without_file_conflicts() {
        let router = setup_admin_router(state());
        let req = Request::post("/admin/reload")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
