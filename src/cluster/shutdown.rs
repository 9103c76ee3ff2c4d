//! Cluster-wide shutdown sequencing.
//!
//! # States
//! ```text
//! NotShuttingDown ──SIGTERM/SIGINT──▶ ShuttingDown ──all gone / timeout──▶ Done
//!        │                                                               ▲
//!        └────────────── SIGTERM/SIGINT (graceful disabled) ─────────────┘
//! ```
//!
//! A second signal while shutting down or done is ignored, so the sequence
//! is armed exactly once.

use std::fmt;

/// Phase of the cluster-wide shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    NotShuttingDown,
    ShuttingDown,
    Done,
}

/// What the coordinator must do after a terminate/interrupt signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    /// Graceful mode is disabled: invoke the exit callback now.
    ExitNow,
    /// Signal every live worker and arm the shutdown timeout.
    SignalWorkers,
    /// A shutdown is already in progress or finished.
    AlreadyInProgress,
}

/// How the shutdown ended; handed to the exit callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker exited before the timeout.
    Drained,
    /// The shutdown timeout fired with workers still alive.
    TimedOut,
    /// Graceful mode disabled; workers were not signalled.
    Immediate,
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drained => f.write_str("drained"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Immediate => f.write_str("immediate"),
        }
    }
}

/// Shutdown state owned by the coordinator's event loop.
#[derive(Debug)]
pub struct ShutdownSequencer {
    phase: ShutdownPhase,
    disable_graceful: bool,
}

impl ShutdownSequencer {
    pub fn new(disable_graceful: bool) -> Self {
        Self {
            phase: ShutdownPhase::NotShuttingDown,
            disable_graceful,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    pub fn is_shutting_down(&self) -> bool {
        self.phase != ShutdownPhase::NotShuttingDown
    }

    pub fn is_done(&self) -> bool {
        self.phase == ShutdownPhase::Done
    }

    /// Handle SIGTERM/SIGINT.
    pub fn begin(&mut self) -> ShutdownStep {
        match self.phase {
            ShutdownPhase::NotShuttingDown if self.disable_graceful => {
                self.phase = ShutdownPhase::Done;
                ShutdownStep::ExitNow
            }
            ShutdownPhase::NotShuttingDown => {
                self.phase = ShutdownPhase::ShuttingDown;
                ShutdownStep::SignalWorkers
            }
            ShutdownPhase::ShuttingDown | ShutdownPhase::Done => ShutdownStep::AlreadyInProgress,
        }
    }

    /// A worker exited; `remaining` live workers are left.
    ///
    /// Returns the outcome when this exit completes the shutdown.
    pub fn on_worker_exit(&mut self, remaining: usize) -> Option<ShutdownOutcome> {
        if self.phase == ShutdownPhase::ShuttingDown && remaining == 0 {
            self.phase = ShutdownPhase::Done;
            return Some(ShutdownOutcome::Drained);
        }
        None
    }

    /// The shutdown timeout fired.
    pub fn on_timeout(&mut self) -> Option<ShutdownOutcome> {
        if self.phase == ShutdownPhase::ShuttingDown {
            self.phase = ShutdownPhase::Done;
            return Some(ShutdownOutcome::TimedOut);
        }
        None
    }
}
