//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each backend of each route
//!     → Backend healthy flag, response time, last check
//!     → log.rs (bounded record of outcomes)
//!
//! Passive signals (passive.rs):
//!     Upstream outcome observed by the dispatcher
//!     → 5xx / transport error feed the route breaker
//!     → transport error takes the server out of rotation (soft)
//!
//! Soft recovery:
//!     Same periodic timer
//!     → Restore servers whose recovery window has elapsed
//! ```
//!
//! # Design Decisions
//! - A single scheduled loop owns recovery; no per-failure timers
//! - Health state is per-backend, not per-pool

pub mod active;
pub mod log;
pub mod passive;

pub use active::{HealthMonitor, HyperProber, Prober};
pub use log::{HealthLog, HealthRecord};
