//! Worker-side runtime.
//!
//! # Data Flow
//! ```text
//! entry point → ServerResource (embedded server)
//!     → "online" to coordinator
//!     → monitor.rs (memory / interval) ──confirm-restart──▶ coordinator
//!
//! "restart" from coordinator, SIGTERM, or channel closed
//!     → drain.rs: set GracefulFlag → poll connections ┐
//!                                  drain window ──────┴→ disconnect
//!                                  → clean exit or force-exit backstop
//! ```
//!
//! # Design Decisions
//! - Every wait in the cascade is bounded by a timer
//! - The drain state machine is pure; timers are applied by a thin driver
//! - The graceful flag is the only state shared with the embedded server

pub mod drain;
pub mod flag;
pub mod monitor;
pub mod resource;
pub mod runtime;
pub(crate) mod timer;

pub use drain::{DrainCascade, DrainReport, DrainTimings, RestartSequencer};
pub use flag::GracefulFlag;
pub use resource::ServerResource;
pub use runtime::{WorkerContext, WorkerEntry};
