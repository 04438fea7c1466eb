//! Response construction.
//!
//! # Responsibilities
//! - Turn dispatch outcomes into client responses
//! - Add gateway headers (X-Service, X-Route-ID, X-Cache)
//! - Map dispatch errors to status codes and a JSON error body
//!
//! # Design Decisions
//! - Upstream bodies are already buffered; hop-by-hop headers are stripped
//! - Error bodies always carry a machine-readable `code`

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::gateway::dispatcher::strip_hop_by_hop;
use crate::gateway::{DispatchError, Dispatched};

pub const X_SERVICE: &str = "x-service";
pub const X_ROUTE_ID: &str = "x-route-id";
pub const X_CACHE: &str = "x-cache";

/// JSON body of every gateway-generated error.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub success: bool,
    pub error: String,
    pub code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'a str>,
}

/// Response for a served request.
pub fn dispatched_response(outcome: Dispatched) -> Response {
    match outcome {
        Dispatched::CacheHit {
            route_id,
            service,
            response,
        } => {
            let mut res = Response::new(Body::from(response.body));
            *res.status_mut() = response.status;
            if let Some(content_type) = response
                .content_type
                .and_then(|ct| HeaderValue::from_str(&ct).ok())
            {
                res.headers_mut().insert(header::CONTENT_TYPE, content_type);
            }
            res.headers_mut()
                .insert(X_CACHE, HeaderValue::from_static("HIT"));
            with_route_headers(res, &route_id, &service)
        }
        Dispatched::Forwarded {
            route_id,
            service,
            cacheable,
            response,
            ..
        } => {
            let mut headers = response.headers;
            strip_hop_by_hop(&mut headers);

            let mut res = Response::new(Body::from(response.body));
            *res.status_mut() = response.status;
            *res.headers_mut() = headers;
            if cacheable {
                res.headers_mut()
                    .insert(X_CACHE, HeaderValue::from_static("MISS"));
            }
            with_route_headers(res, &route_id, &service)
        }
    }
}

/// Response for a failed dispatch.
pub fn error_response(err: &DispatchError) -> Response {
    let body = ErrorBody {
        success: false,
        error: err.to_string(),
        code: err.reason_code(),
        service: err.service(),
    };
    let mut res = (err.status_code(), Json(body)).into_response();

    if let DispatchError::CircuitOpen { retry_after, .. } = err {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        res.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
    }
    if let (Some(route_id), Some(service)) = (err.route_id(), err.service()) {
        res = with_route_headers(res, route_id, service);
    }
    res
}

/// Inbound request body over the configured limit.
pub fn payload_too_large() -> Response {
    let body = ErrorBody {
        success: false,
        error: "request body too large".to_string(),
        code: "PAYLOAD_TOO_LARGE",
        service: None,
    };
    (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response()
}

fn with_route_headers(mut res: Response, route_id: &str, service: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(service) {
        res.headers_mut().insert(X_SERVICE, value);
    }
    if let Ok(value) = HeaderValue::from_str(route_id) {
        res.headers_mut().insert(X_ROUTE_ID, value);
    }
    res
}
