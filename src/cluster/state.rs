//! Worker handles and the cluster state they live in.
//!
//! # State Transitions
//! ```text
//! Starting ──online──▶ Running ──restart sent──▶ RestartAdmitted
//!    │                    │                            │
//!    │                    └──── ipc closed / SIGTERM ──┴──▶ Terminating
//!    │                                                            │
//!    └───────────────────────── exit notification ────────────────┴──▶ Gone
//! ```
//!
//! # Invariants
//! - Workers are unique by pid
//! - The closing set is a subset of the live pids
//! - Admission check and closing-set insert happen in one call
//!   ([`ClusterState::admit_restart`]), so they cannot interleave

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cluster::health_gate;
use crate::cluster::spawner::WorkerLink;

/// Lifecycle state of a worker as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Forked, server not reported up yet.
    Starting,
    /// Serving traffic.
    Running,
    /// Restart instruction sent, worker is draining.
    RestartAdmitted,
    /// Worker was told to terminate or has disconnected its channel.
    Terminating,
    /// Process exit observed.
    Gone,
}

impl WorkerState {
    /// Whether a restart request from a worker in this state may be admitted.
    pub fn accepts_restart(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::RestartAdmitted => "restart-admitted",
            Self::Terminating => "terminating",
            Self::Gone => "gone",
        };
        f.write_str(name)
    }
}

/// The coordinator's view of one worker process.
pub struct WorkerHandle {
    pid: u32,
    state: WorkerState,
    link: Box<dyn WorkerLink>,
}

impl WorkerHandle {
    pub fn new(pid: u32, link: Box<dyn WorkerLink>) -> Self {
        Self {
            pid,
            state: WorkerState::Starting,
            link,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn link(&self) -> &dyn WorkerLink {
        self.link.as_ref()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish()
    }
}

/// Why a restart request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No live worker with that pid.
    UnknownWorker,
    /// Pid is already in the closing set.
    AlreadyClosing,
    /// Worker is in a state that cannot restart.
    NotRestartable(WorkerState),
    /// Admitting would drop availability to or below the floor.
    BelowHealthFloor,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorker => write!(f, "unknown worker"),
            Self::AlreadyClosing => write!(f, "already closing"),
            Self::NotRestartable(state) => write!(f, "worker is {}", state),
            Self::BelowHealthFloor => write!(f, "health floor reached"),
        }
    }
}

/// Live workers plus the set of pids admitted for restart.
#[derive(Debug, Default)]
pub struct ClusterState {
    workers: BTreeMap<u32, WorkerHandle>,
    closing: BTreeSet<u32>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly forked worker. Returns `false` on a duplicate pid.
    pub fn insert(&mut self, handle: WorkerHandle) -> bool {
        if self.workers.contains_key(&handle.pid) {
            return false;
        }
        self.workers.insert(handle.pid, handle);
        true
    }

    /// Starting → Running. Returns `false` if the worker was not starting.
    pub fn mark_running(&mut self, pid: u32) -> bool {
        match self.workers.get_mut(&pid) {
            Some(handle) if handle.state == WorkerState::Starting => {
                handle.state = WorkerState::Running;
                true
            }
            _ => false,
        }
    }

    /// Consult the health gate and, on success, add `pid` to the closing set
    /// and move it to RestartAdmitted in the same step.
    pub fn admit_restart(
        &mut self,
        pid: u32,
        desired: usize,
        floor_percent: u32,
    ) -> Result<&WorkerHandle, Rejection> {
        if self.closing.contains(&pid) {
            return Err(Rejection::AlreadyClosing);
        }
        let live = self.workers.len();
        let closing = self.closing.len();
        let handle = self.workers.get_mut(&pid).ok_or(Rejection::UnknownWorker)?;
        if !handle.state.accepts_restart() {
            return Err(Rejection::NotRestartable(handle.state));
        }
        if !health_gate::admit(live, closing, desired, floor_percent) {
            return Err(Rejection::BelowHealthFloor);
        }
        handle.state = WorkerState::RestartAdmitted;
        self.closing.insert(pid);
        Ok(handle)
    }

    /// Any live state → Terminating. Returns `false` for unknown pids.
    pub fn mark_terminating(&mut self, pid: u32) -> bool {
        match self.workers.get_mut(&pid) {
            Some(handle) => {
                handle.state = WorkerState::Terminating;
                true
            }
            None => false,
        }
    }

    /// Drop a worker whose exit was observed, clearing it from the closing set.
    pub fn remove_on_exit(&mut self, pid: u32) -> Option<WorkerHandle> {
        self.closing.remove(&pid);
        self.workers.remove(&pid).map(|mut handle| {
            handle.state = WorkerState::Gone;
            handle
        })
    }

    pub fn get(&self, pid: u32) -> Option<&WorkerHandle> {
        self.workers.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.workers.contains_key(&pid)
    }

    pub fn is_closing(&self, pid: u32) -> bool {
        self.closing.contains(&pid)
    }

    pub fn live_count(&self) -> usize {
        self.workers.len()
    }

    pub fn closing_count(&self) -> usize {
        self.closing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.workers.keys().copied().collect()
    }

    /// Workers forked but not yet online.
    pub fn starting_count(&self) -> usize {
        self.workers
            .values()
            .filter(|handle| handle.state == WorkerState::Starting)
            .count()
    }
}
