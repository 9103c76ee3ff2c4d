//! Error taxonomy for the cluster.
//!
//! Only bootstrap failures travel back to the caller of
//! [`Cluster::start`](crate::Cluster::start). Everything that happens once the
//! cluster is running (crashes, rejected restarts, drain timeouts) is
//! recovered in place and reported through `tracing`.

use crate::config::loader::ConfigError;

/// Errors produced by the cluster runtime.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The builder was finished without a worker entry point.
    #[error("worker entry point is required")]
    MissingEntryPoint,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Forking a worker process failed.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// The IPC channel between coordinator and worker failed.
    #[error("ipc error: {0}")]
    Ipc(String),

    /// Installing or delivering an OS signal failed.
    #[error("signal error: {0}")]
    Signal(String),

    /// The embedded server failed to start.
    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClusterError>;
