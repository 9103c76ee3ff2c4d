//! IPC message schema.
//!
//! Messages are JSON-serialized and newline-delimited.

use serde::{Deserialize, Serialize};

/// Message from a worker to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// The worker asks to be restarted (memory, interval or application).
    ConfirmRestart {
        /// Requesting worker.
        pid: u32,
    },

    /// The worker's server is up and serving.
    Online {
        /// Reporting worker.
        pid: u32,
    },
}

impl WorkerMessage {
    pub fn pid(&self) -> u32 {
        match self {
            Self::ConfirmRestart { pid } | Self::Online { pid } => *pid,
        }
    }
}

/// Message from the coordinator to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatorMessage {
    /// Restart admitted: start the drain cascade.
    Restart,
}
