//! Upstream HTTP relay.
//!
//! # Responsibilities
//! - Send one request to one backend
//! - Buffer the full response body (bounded)
//! - Classify transport failures apart from oversized responses
//!
//! # Design Decisions
//! - The dispatcher talks to a trait so tests can script upstream behavior
//! - Deadlines are applied by the caller, not here

use std::str::FromStr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

/// A request ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    /// Path plus optional `?query`, already rewritten for the upstream.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport-level failures. Upstream status codes are never errors here.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// The upstream answered, but with a body over the buffering limit.
    #[error("upstream response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

/// Something that can forward a request to a backend.
pub trait HttpRelay: Send + Sync {
    fn forward<'a>(
        &'a self,
        target: &'a Url,
        request: RelayRequest,
    ) -> BoxFuture<'a, Result<RelayResponse, RelayError>>;
}

/// Join a backend base URL with an upstream path.
pub fn upstream_uri(base: &Url, path_and_query: &str) -> Result<Uri, RelayError> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path_and_query);
    Uri::from_str(&joined).map_err(|e| RelayError::InvalidRequest(format!("{joined}: {e}")))
}

/// The production relay, backed by the hyper-util pooled client.
#[derive(Clone)]
pub struct HyperRelay {
    client: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl HyperRelay {
    pub fn new(connect_timeout: Duration, max_response_bytes: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            max_response_bytes,
        }
    }
}

impl HttpRelay for HyperRelay {
    fn forward<'a>(
        &'a self,
        target: &'a Url,
        request: RelayRequest,
    ) -> BoxFuture<'a, Result<RelayResponse, RelayError>> {
        Box::pin(async move {
            let uri = upstream_uri(target, &request.path_and_query)?;
            let head = request.method == Method::HEAD;
            let mut upstream = Request::builder()
                .method(request.method)
                .uri(uri)
                .body(Body::from(request.body))
                .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
            *upstream.headers_mut() = request.headers;

            let response = self.client.request(upstream).await.map_err(|e| {
                if e.is_connect() {
                    RelayError::Connect(e.to_string())
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;

            let (parts, body) = response.into_parts();
            // HEAD answers carry the GET length with no body.
            let declared = if head { None } else { content_length(&parts.headers) };
            let body = read_body(declared, Body::new(body), self.max_response_bytes).await?;

            Ok(RelayResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Buffer a response body, refusing anything over `limit` bytes.
async fn read_body(declared: Option<usize>, body: Body, limit: usize) -> Result<Bytes, RelayError> {
    if declared.is_some_and(|len| len > limit) {
        return Err(RelayError::ResponseTooLarge { limit });
    }

    let mut buf = Vec::with_capacity(declared.unwrap_or_default().min(limit));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| RelayError::Transport(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(RelayError::ResponseTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
