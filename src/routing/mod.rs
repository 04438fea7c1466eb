//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (snapshot of the live RouteTable)
//!     → matcher.rs (segment-wise pattern match)
//!     → Return: RouteMatch { route, params } or None
//!
//! Route Compilation (startup, register, reload):
//!     RouteConfig[]
//!     → route.rs (compile pattern, build pool and breaker)
//!     → Sort by priority (stable)
//!     → Swap in as the new immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority, then registration)

pub mod matcher;
pub mod route;
pub mod router;

pub use matcher::{PathPattern, PatternError};
pub use route::{Route, RouteError};
pub use router::{ReloadReport, RouteMatch, RouteRegistry, RouteTable};
