//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → route's ServerPool
//!     → pool.rs (filter healthy backends)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (weighted random draw)
//!         - least_conn.rs (pick backend with fewest connections)
//!     → backend.rs (connection guard, released on drop)
//!     → Return guard or "no server available"
//! ```
//!
//! # Design Decisions
//! - Algorithms only ever see healthy backends; no fallback to unhealthy ones
//! - Algorithm selection per route
//! - Counters are per-backend atomics, no pool-wide lock

use std::sync::Arc;

use crate::load_balancer::backend::Backend;

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

/// A backend selection policy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one of the given (healthy) backends.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
