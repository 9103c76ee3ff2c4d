//! The coordinator: owns the workers and reacts to cluster events.
//!
//! All state lives in one [`Coordinator`] value driven by a single task, so
//! every event handler runs to completion before the next one starts. That
//! is what makes "check the health gate, then add to the closing set"
//! atomic with respect to concurrent restart requests.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::cluster::event::{ClusterEvent, ClusterSignal, WorkerExit};
use crate::cluster::rolling::RollingRestart;
use crate::cluster::shutdown::{ShutdownOutcome, ShutdownSequencer, ShutdownStep};
use crate::cluster::spawner::WorkerSpawner;
use crate::cluster::state::{ClusterState, Rejection, WorkerHandle, WorkerState};
use crate::config::ClusterSection;
use crate::ipc::{CoordinatorMessage, WorkerMessage};
use crate::observability::metrics;
use crate::resilience::backoff::refork_delay;

/// Called once when the cluster finishes shutting down.
pub type ExitCallback = Box<dyn FnOnce(ShutdownOutcome) + Send>;

/// Default exit callback: terminate the process with code 0.
pub fn exit_process() -> ExitCallback {
    Box::new(|_| std::process::exit(0))
}

/// Coordinator tuning, derived from [`ClusterSection`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub desired_workers: usize,
    pub minimum_health_percent: u32,
    pub shutdown_timeout: Duration,
    pub disable_graceful: bool,
    pub refork_base_delay: Duration,
    pub refork_max_delay: Duration,
}

impl From<&ClusterSection> for CoordinatorOptions {
    fn from(section: &ClusterSection) -> Self {
        Self {
            desired_workers: section.workers,
            minimum_health_percent: section.minimum_health_percent,
            shutdown_timeout: section.shutdown_timeout(),
            disable_graceful: section.disable_graceful,
            refork_base_delay: Duration::from_millis(section.refork_base_delay_ms),
            refork_max_delay: Duration::from_millis(section.refork_max_delay_ms),
        }
    }
}

/// Result of handling one restart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Admitted,
    Rejected(Rejection),
}

pub struct Coordinator<S> {
    options: CoordinatorOptions,
    spawner: S,
    state: ClusterState,
    shutdown: ShutdownSequencer,
    rolling: RollingRestart,
    events_tx: mpsc::UnboundedSender<ClusterEvent>,
    events_rx: mpsc::UnboundedReceiver<ClusterEvent>,
    shutdown_deadline: Option<Instant>,
    refork_at: Option<Instant>,
    refork_attempt: u32,
    exit_callback: Option<ExitCallback>,
    outcome: Option<ShutdownOutcome>,
}

impl<S: WorkerSpawner> Coordinator<S> {
    pub fn new(options: CoordinatorOptions, spawner: S, exit_callback: ExitCallback) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shutdown: ShutdownSequencer::new(options.disable_graceful),
            options,
            spawner,
            state: ClusterState::new(),
            rolling: RollingRestart::new(),
            events_tx,
            events_rx,
            shutdown_deadline: None,
            refork_at: None,
            refork_attempt: 0,
            exit_callback: Some(exit_callback),
            outcome: None,
        }
    }

    /// Sender for feeding events (signals, tests) into the loop.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ClusterEvent> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn outcome(&self) -> Option<ShutdownOutcome> {
        self.outcome
    }

    pub fn rolling_remaining(&self) -> usize {
        self.rolling.remaining()
    }

    /// Fork workers until the desired count is reached.
    ///
    /// Stops at the first failure and schedules a retry.
    pub fn start_workers(&mut self) {
        while self.state.live_count() < self.options.desired_workers {
            if !self.fork_one() {
                break;
            }
        }
    }

    /// Run the event loop until the shutdown sequence completes.
    pub async fn run(mut self) -> ShutdownOutcome {
        tracing::info!(
            workers = self.options.desired_workers,
            minimum_health_percent = self.options.minimum_health_percent,
            "Coordinator starting"
        );
        self.start_workers();

        while self.outcome.is_none() {
            let shutdown_deadline = self.shutdown_deadline;
            let refork_at = self.refork_at;
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = sleep_until(shutdown_deadline) => self.on_shutdown_timeout(),
                _ = sleep_until(refork_at) => self.on_refork_due(),
            }
        }

        self.outcome.unwrap_or(ShutdownOutcome::Immediate)
    }

    /// Handle an event, surviving a panicking handler.
    fn dispatch(&mut self, event: ClusterEvent) {
        let handled = std::panic::catch_unwind(AssertUnwindSafe(|| self.handle_event(event)));
        if handled.is_err() {
            tracing::error!("Event handler panicked, coordinator continuing");
        }
    }

    /// Dispatch one event.
    pub fn handle_event(&mut self, event: ClusterEvent) {
        match event {
            ClusterEvent::Message { pid, message } => match message {
                WorkerMessage::Online { .. } => self.on_online(pid),
                WorkerMessage::ConfirmRestart { .. } => {
                    self.handle_restart_request(pid);
                }
            },
            ClusterEvent::Disconnected { pid } => self.on_disconnected(pid),
            ClusterEvent::Exited { pid, exit } => self.on_exit(pid, exit),
            ClusterEvent::Signal(signal) => self.on_signal(signal),
        }
        metrics::set_worker_gauges(self.state.live_count(), self.state.closing_count());
    }

    /// Consult the health gate and, if admitted, send the restart instruction.
    ///
    /// Rejected requests are dropped; the requester retries on its own.
    pub fn handle_restart_request(&mut self, pid: u32) -> RestartDecision {
        if self.shutdown.is_shutting_down() {
            tracing::debug!(pid, "Ignoring restart request during shutdown");
            return RestartDecision::Rejected(Rejection::NotRestartable(WorkerState::Terminating));
        }

        let desired = self.options.desired_workers;
        let floor = self.options.minimum_health_percent;
        let decision = match self.state.admit_restart(pid, desired, floor) {
            Ok(handle) => {
                if let Err(e) = handle.link().send(CoordinatorMessage::Restart) {
                    // The worker stays in the closing set until its exit arrives.
                    tracing::warn!(pid, error = %e, "Failed to send restart instruction");
                }
                RestartDecision::Admitted
            }
            Err(reason) => RestartDecision::Rejected(reason),
        };

        match decision {
            RestartDecision::Admitted => tracing::info!(
                pid,
                live = self.state.live_count(),
                closing = self.state.closing_count(),
                "Restart admitted"
            ),
            RestartDecision::Rejected(reason) => tracing::debug!(
                pid,
                live = self.state.live_count(),
                closing = self.state.closing_count(),
                %reason,
                "Restart rejected"
            ),
        }
        metrics::record_restart_request(decision == RestartDecision::Admitted);
        decision
    }

    /// The cluster-wide shutdown timeout fired.
    pub fn on_shutdown_timeout(&mut self) {
        self.shutdown_deadline = None;
        if let Some(outcome) = self.shutdown.on_timeout() {
            tracing::warn!(
                remaining = self.state.live_count(),
                "Shutdown timeout reached, exiting with workers still alive"
            );
            self.finish(outcome);
        }
    }

    /// The re-fork backoff timer fired.
    pub fn on_refork_due(&mut self) {
        self.refork_at = None;
        if self.shutdown.is_shutting_down() {
            return;
        }
        self.start_workers();
    }

    fn fork_one(&mut self) -> bool {
        match self.spawner.spawn(&self.events_tx) {
            Ok(spawned) => {
                let pid = spawned.pid;
                if !self.state.insert(WorkerHandle::new(pid, spawned.link)) {
                    tracing::error!(pid, "Forked worker reused a live pid");
                    return false;
                }
                metrics::record_fork();
                tracing::info!(pid, live = self.state.live_count(), "Worker forked");
                true
            }
            Err(e) => {
                let delay = self.schedule_refork();
                tracing::error!(
                    error = %e,
                    attempt = self.refork_attempt,
                    retry_in = ?delay,
                    "Failed to fork worker"
                );
                false
            }
        }
    }

    /// Count a failed start and arm the re-fork timer, keeping an earlier
    /// deadline if one is already armed.
    fn schedule_refork(&mut self) -> Duration {
        self.refork_attempt = self.refork_attempt.saturating_add(1);
        let delay = refork_delay(
            self.refork_attempt,
            self.options.refork_base_delay,
            self.options.refork_max_delay,
        );
        if self.refork_at.is_none() {
            self.refork_at = Some(Instant::now() + delay);
        }
        delay
    }

    fn on_online(&mut self, pid: u32) {
        if self.state.mark_running(pid) {
            self.refork_attempt = 0;
            tracing::info!(pid, "Worker online");
            self.pump_rolling_restart();
        }
    }

    fn on_disconnected(&mut self, pid: u32) {
        let admitted = self
            .state
            .get(pid)
            .is_some_and(|handle| handle.state() == WorkerState::RestartAdmitted);
        if admitted {
            self.state.mark_terminating(pid);
            tracing::debug!(pid, "Worker disconnected");
        }
    }

    fn on_exit(&mut self, pid: u32, exit: WorkerExit) {
        let prior = match self.state.get(pid) {
            Some(handle) => handle.state(),
            None => {
                tracing::debug!(pid, %exit, "Exit notification for unknown worker");
                return;
            }
        };
        self.state.remove_on_exit(pid);

        if self.shutdown.is_shutting_down() {
            tracing::info!(pid, %exit, remaining = self.state.live_count(), "Worker exited during shutdown");
            metrics::record_exit(true);
            if let Some(outcome) = self.shutdown.on_worker_exit(self.state.live_count()) {
                self.finish(outcome);
            }
            return;
        }

        let expected = matches!(prior, WorkerState::RestartAdmitted | WorkerState::Terminating);
        metrics::record_exit(expected);
        if expected {
            tracing::info!(pid, %exit, "Worker exited for restart");
        } else {
            tracing::warn!(pid, %exit, state = %prior, "Worker died unexpectedly");
        }

        if prior == WorkerState::Starting {
            // Never came online: back off like a failed fork.
            let delay = self.schedule_refork();
            tracing::warn!(pid, attempt = self.refork_attempt, retry_in = ?delay, "Worker failed to start");
        } else if self.refork_at.is_none() {
            self.fork_one();
        }
    }

    fn on_signal(&mut self, signal: ClusterSignal) {
        match signal {
            ClusterSignal::Terminate | ClusterSignal::Interrupt => self.begin_shutdown(signal),
            ClusterSignal::RollingRestart => self.begin_rolling_restart(),
        }
    }

    fn begin_shutdown(&mut self, signal: ClusterSignal) {
        match self.shutdown.begin() {
            ShutdownStep::ExitNow => {
                tracing::info!(%signal, "Graceful shutdown disabled, exiting now");
                self.finish(ShutdownOutcome::Immediate);
            }
            ShutdownStep::SignalWorkers => {
                tracing::info!(
                    %signal,
                    workers = self.state.live_count(),
                    timeout = ?self.options.shutdown_timeout,
                    "Shutting down cluster"
                );
                self.rolling.clear();
                self.refork_at = None;
                for pid in self.state.pids() {
                    self.state.mark_terminating(pid);
                    if let Some(handle) = self.state.get(pid) {
                        if let Err(e) = handle.link().terminate() {
                            tracing::warn!(pid, error = %e, "Failed to signal worker");
                        }
                    }
                }
                self.shutdown_deadline = Some(Instant::now() + self.options.shutdown_timeout);
                if let Some(outcome) = self.shutdown.on_worker_exit(self.state.live_count()) {
                    self.finish(outcome);
                }
            }
            ShutdownStep::AlreadyInProgress => {
                tracing::debug!(%signal, "Shutdown already in progress");
            }
        }
    }

    fn begin_rolling_restart(&mut self) {
        if self.shutdown.is_shutting_down() {
            tracing::debug!("Ignoring rolling restart during shutdown");
            return;
        }
        if !self.rolling.start(self.state.pids()) {
            tracing::info!(remaining = self.rolling.remaining(), "Rolling restart already in progress");
            return;
        }
        tracing::info!(workers = self.rolling.remaining(), "Rolling restart requested");
        self.pump_rolling_restart();
    }

    /// Offer the next queued worker for restart once the previous one's
    /// replacement is online: nothing closing and nothing still starting.
    fn pump_rolling_restart(&mut self) {
        if !self.rolling.is_active()
            || self.shutdown.is_shutting_down()
            || self.state.closing_count() > 0
            || self.state.starting_count() > 0
        {
            return;
        }
        while let Some(pid) = self.rolling.next_live(&self.state) {
            match self.handle_restart_request(pid) {
                RestartDecision::Admitted => {
                    if !self.rolling.is_active() {
                        tracing::info!("Rolling restart: last worker admitted");
                    }
                    return;
                }
                RestartDecision::Rejected(Rejection::BelowHealthFloor) => {
                    self.rolling.requeue(pid);
                    return;
                }
                RestartDecision::Rejected(_) => continue,
            }
        }
        tracing::info!("Rolling restart queue drained");
    }

    fn finish(&mut self, outcome: ShutdownOutcome) {
        self.shutdown_deadline = None;
        self.refork_at = None;
        self.outcome = Some(outcome);
        tracing::info!(%outcome, "Cluster shutdown complete");
        if let Some(callback) = self.exit_callback.take() {
            callback(outcome);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Log panics through `tracing` instead of letting them vanish on stderr.
///
/// With graceful mode disabled only the message is logged.
pub fn install_panic_hook(disable_graceful: bool) {
    std::panic::set_hook(Box::new(move |info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());

        if disable_graceful {
            tracing::error!(%message, "Uncaught panic in coordinator");
        } else {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let backtrace = std::backtrace::Backtrace::force_capture();
            tracing::error!(%message, %location, %backtrace, "Uncaught panic in coordinator");
        }
    }));
}
