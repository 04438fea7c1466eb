//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! GET on a cache-enabled route
//!     → key.rs (service + method + normalized path + sorted query)
//!     → store.rs lookup: hit → served without touching the load balancer
//!                        miss / expired → dispatched upstream
//!     → 200 OK upstream response → store.rs insert with the route's TTL
//! ```
//!
//! # Design Decisions
//! - Expiry strictly by TTL; no invalidation API
//! - Expired entries are dropped lazily on lookup, plus an optional sweep
//! - Responses are fully buffered before they reach the cache

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CachedResponse, ResponseCache};
