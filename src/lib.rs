//! Service gateway library.
//!
//! Routes inbound requests to upstream services with per-route load
//! balancing, circuit breaking, active health checks and response caching.

pub mod admin;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use gateway::{DispatchError, Dispatched, Gateway, RouteQuery};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
