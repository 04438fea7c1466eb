//! Gateway coordinator.
//!
//! # Data Flow
//! ```text
//! RouteQuery
//!     → routing (match)
//!     → circuit breaker (gate)
//!     → response cache (GET, cache-enabled routes)
//!     → load balancer (select) → relay (forward, with timeout)
//!     → breaker / pool / cache bookkeeping
//!     → Dispatched | DispatchError
//! ```

pub mod dispatcher;
pub mod error;
pub mod relay;
pub mod stats;

pub use dispatcher::{CallerIdentity, Dispatched, Gateway, RouteQuery};
pub use error::DispatchError;
pub use relay::{HttpRelay, HyperRelay, RelayError, RelayRequest, RelayResponse};
pub use stats::{RouteStats, ServiceHealth};
