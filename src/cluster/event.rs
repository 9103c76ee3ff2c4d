//! Events consumed by the coordinator's event loop.

use std::fmt;

use crate::ipc::WorkerMessage;

/// Everything the coordinator reacts to arrives as one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// A worker sent a message over its channel.
    Message { pid: u32, message: WorkerMessage },
    /// A worker's channel closed (it disconnected or died).
    Disconnected { pid: u32 },
    /// A worker process exited.
    Exited { pid: u32, exit: WorkerExit },
    /// An OS signal was delivered to the coordinator.
    Signal(ClusterSignal),
}

/// OS signals the coordinator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSignal {
    /// SIGTERM.
    Terminate,
    /// SIGINT.
    Interrupt,
    /// SIGUSR2: rolling restart, one worker at a time.
    RollingRestart,
}

impl fmt::Display for ClusterSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Interrupt => f.write_str("SIGINT"),
            Self::RollingRestart => f.write_str("SIGUSR2"),
        }
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited with a status code.
    Code(i32),
    /// Killed by a signal number.
    Signaled(i32),
    /// Exit status could not be collected.
    Unknown,
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            Self::Code(code)
        } else if let Some(signal) = status.signal() {
            Self::Signaled(signal)
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with code {}", code),
            Self::Signaled(signal) => write!(f, "killed by signal {}", signal),
            Self::Unknown => write!(f, "exited for an unknown reason"),
        }
    }
}
