use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::load_config;
use crate::gateway::{RouteStats, ServiceHealth};
use crate::health::HealthRecord;
use crate::http::server::AppState;

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub generation: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub service: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let table = state.gateway.registry().snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: table.len(),
        generation: table.generation(),
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<RouteStats> {
    Json(state.gateway.route_stats())
}

pub async fn get_health(State(state): State<AppState>) -> Json<ServiceHealth> {
    Json(state.gateway.service_health())
}

pub async fn get_health_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<HealthRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.health_log.recent(query.service.as_deref(), limit))
}

/// Re-read the config file and swap in its routes.
pub async fn post_reload(State(state): State<AppState>) -> Response {
    let Some(path) = state.config_path.as_deref() else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "success": false,
                "error": "gateway was started without a config file",
            })),
        )
            .into_response();
    };

    match load_config(path) {
        Ok(config) => {
            let report = state.gateway.reload_routes(&config.routes);
            Json(report).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Admin reload failed, keeping current routes");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
