//! Worker self-monitoring: memory threshold and restart interval.
//!
//! Both triggers only *request* a restart; the coordinator decides. A
//! rejected request is simply repeated on the next tick.

use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::Interval;

use crate::config::WorkerConfig;
use crate::worker::runtime::WorkerContext;
use crate::worker::timer;

/// Source of the worker's resident memory.
pub trait MemorySource: Send + 'static {
    /// Resident set size in bytes, if it can be read.
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Reads this process's memory through `sysinfo`.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for ProcessMemory {
    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|process| process.memory())
    }
}

/// Why a worker asked for its own restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartTrigger {
    Memory { resident: u64, threshold: u64 },
    Interval(Duration),
}

/// Periodic self-restart triggers.
pub struct SelfMonitor {
    memory_threshold: Option<u64>,
    memory_check_interval: Duration,
    restart_interval: Option<Duration>,
    source: Box<dyn MemorySource>,
}

impl SelfMonitor {
    pub fn new(config: &WorkerConfig, source: Box<dyn MemorySource>) -> Self {
        Self {
            memory_threshold: config.memory_threshold(),
            memory_check_interval: config.memory_check_interval(),
            restart_interval: config.restart_interval(),
            source,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.memory_threshold.is_some() || self.restart_interval.is_some()
    }

    /// Run until aborted, asking `context` for a restart whenever a trigger
    /// fires.
    pub async fn run(mut self, context: WorkerContext) {
        if !self.is_enabled() {
            return;
        }
        tracing::debug!(
            memory_threshold = ?self.memory_threshold,
            restart_interval = ?self.restart_interval,
            "Self monitor started"
        );

        let mut memory_ticker: Option<Interval> = self
            .memory_threshold
            .map(|_| timer::every(self.memory_check_interval));
        let mut restart_ticker: Option<Interval> = self.restart_interval.map(timer::every);

        loop {
            let trigger = tokio::select! {
                _ = timer::tick(&mut memory_ticker) => self.check_memory(),
                _ = timer::tick(&mut restart_ticker) => self.restart_interval.map(RestartTrigger::Interval),
            };
            if let Some(trigger) = trigger {
                tracing::info!(pid = context.pid(), ?trigger, "Requesting restart");
                context.restart_current_worker();
            }
        }
    }

    fn check_memory(&mut self) -> Option<RestartTrigger> {
        let threshold = self.memory_threshold?;
        let resident = self.source.resident_bytes()?;
        (resident > threshold).then_some(RestartTrigger::Memory { resident, threshold })
    }
}
