//! One-by-one rolling restart (SIGUSR2).
//!
//! The signal snapshots the live pids; the coordinator offers the queue head
//! to the normal admission path whenever no restart is in flight.

use std::collections::VecDeque;

use crate::cluster::state::ClusterState;

#[derive(Debug, Default)]
pub struct RollingRestart {
    queue: VecDeque<u32>,
}

impl RollingRestart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `pids` for restart. Returns `false` if a rolling restart is
    /// already in progress.
    pub fn start(&mut self, pids: Vec<u32>) -> bool {
        if !self.queue.is_empty() {
            return false;
        }
        self.queue.extend(pids);
        true
    }

    pub fn is_active(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Pop the next queued pid that is still alive, dropping dead ones.
    pub fn next_live(&mut self, state: &ClusterState) -> Option<u32> {
        while let Some(pid) = self.queue.pop_front() {
            if state.contains(pid) {
                return Some(pid);
            }
        }
        None
    }

    /// Put a pid back at the head after a health-floor rejection.
    pub fn requeue(&mut self, pid: u32) {
        self.queue.push_front(pid);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
