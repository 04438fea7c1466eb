//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → listeners drain, background tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload config file → route table swap
//! ```
//!
//! # Design Decisions
//! - Ordered startup in main: config, logging, metrics, then listeners
//! - One broadcast channel reaches every long-running task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
