//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Check entry point → Validate config → pick role
//!         coordinator: panic hook → metrics → signals → fork workers
//!         worker:      start server → serve until drained
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → cluster shutdown
//!     SIGUSR2        → rolling restart
//!
//! Shutdown (shutdown.rs):
//!     Latched trigger the embedded server waits on
//! ```
//!
//! # Design Decisions
//! - Fail fast: only bootstrap errors are returned to the caller
//! - One binary, two roles, selected by environment

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{is_worker_process, Cluster, ClusterBuilder};
