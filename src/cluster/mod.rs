//! Coordinator-side cluster management.
//!
//! # Data Flow
//! ```text
//! spawner.rs (fork, per-worker channel)
//!     → event.rs (messages, disconnects, exits, signals)
//!     → coordinator.rs (single event loop)
//!         → health_gate.rs + state.rs (admit restart, closing set)
//!         → rolling.rs (SIGUSR2 one-by-one queue)
//!         → shutdown.rs (SIGTERM/SIGINT sequence)
//! ```
//!
//! # Design Decisions
//! - One task owns all cluster state; no locks, no interleaved handlers
//! - Unexpected exits are replaced immediately while not shutting down
//! - Every wait (shutdown, re-fork retry) has a bounded timer

pub mod coordinator;
pub mod event;
pub mod health_gate;
pub mod rolling;
pub mod shutdown;
pub mod spawner;
pub mod state;

pub use coordinator::{Coordinator, CoordinatorOptions, ExitCallback, RestartDecision};
pub use event::{ClusterEvent, ClusterSignal, WorkerExit};
pub use shutdown::ShutdownOutcome;
pub use spawner::{ProcessSpawner, SpawnedWorker, WorkerLink, WorkerSpawner, WORKER_ENV};
pub use state::{ClusterState, Rejection, WorkerHandle, WorkerState};
