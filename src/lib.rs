//! Graceful multi-process cluster for network servers.
//!
//! A coordinator process forks N copies of the current binary. Each worker
//! hosts a server on a shared port and can ask to be restarted; the
//! coordinator admits restarts only while enough workers stay healthy, and
//! shuts the whole cluster down in bounded time on SIGTERM/SIGINT.

// Cluster core
pub mod cluster;
pub mod ipc;
pub mod worker;

// Embedded server
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ClusterConfig;
pub use error::{ClusterError, Result};
pub use lifecycle::{Cluster, ClusterBuilder};
pub use worker::{GracefulFlag, ServerResource, WorkerContext, WorkerEntry};
