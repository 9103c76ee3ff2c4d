//! The per-worker drain cascade.
//!
//! # States
//! ```text
//! Idle ──start──▶ Draining ──poll reads 0──────▶ Disconnecting ──closed──────▶ Exited(0)
//!                     │                               ▲      │
//!                     └──drain window elapsed─────────┘      └──force exit──▶ Exited(1)
//! ```
//!
//! Draining races two timers: the connection poll and the drain window.
//! Whichever wins takes the single disconnect transition, which cancels the
//! sibling timers and arms the force-exit backstop. Cancellation is emitted
//! by the transition itself, so no timer is cancelled twice and no poll
//! outlives the drain.
//!
//! [`RestartSequencer`] is the pure state machine; [`DrainCascade`] drives it
//! with tokio timers against a [`ServerResource`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{Instant, Interval, Sleep};

use crate::config::WorkerConfig;
use crate::worker::flag::GracefulFlag;
use crate::worker::resource::ServerResource;
use crate::worker::timer;

/// Exit code after a clean disconnect.
pub const EXIT_CLEAN: i32 = 0;
/// Exit code when the force-exit backstop fires.
pub const EXIT_FORCED: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPhase {
    Idle,
    Draining,
    Disconnecting,
    Exited,
}

/// Inputs to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEvent {
    /// A restart instruction or terminate signal arrived.
    Start,
    /// The poll timer sampled the live connection count.
    PollTick { connections: usize },
    /// The drain window elapsed.
    DrainWindowElapsed,
    /// The force-exit backstop elapsed.
    ForceExitElapsed,
    /// The server finished closing.
    Closed,
}

/// Side effects requested by a transition, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainAction {
    SetGracefulFlag,
    StartPoll,
    StartDrainWindow,
    CancelPoll,
    CancelDrainWindow,
    StartForceExit,
    CancelForceExit,
    /// Stop accepting work and leave the cluster. `forced` when connections
    /// were still open.
    Disconnect { forced: bool },
    Exit { code: i32 },
}

/// Pure drain state machine.
#[derive(Debug)]
pub struct RestartSequencer {
    phase: DrainPhase,
    poll_armed: bool,
    window_armed: bool,
    force_armed: bool,
}

impl Default for RestartSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartSequencer {
    pub fn new() -> Self {
        Self {
            phase: DrainPhase::Idle,
            poll_armed: false,
            window_armed: false,
            force_armed: false,
        }
    }

    pub fn phase(&self) -> DrainPhase {
        self.phase
    }

    pub fn handle(&mut self, event: DrainEvent) -> Vec<DrainAction> {
        match (self.phase, event) {
            (DrainPhase::Idle, DrainEvent::Start) => {
                self.phase = DrainPhase::Draining;
                self.poll_armed = true;
                self.window_armed = true;
                vec![
                    DrainAction::SetGracefulFlag,
                    DrainAction::StartPoll,
                    DrainAction::StartDrainWindow,
                ]
            }
            (DrainPhase::Draining, DrainEvent::PollTick { connections: 0 }) => self.disconnect(false),
            (DrainPhase::Draining, DrainEvent::DrainWindowElapsed) => {
                self.window_armed = false;
                self.disconnect(true)
            }
            (DrainPhase::Draining, DrainEvent::Closed) => {
                // The server went away on its own; nothing left to drain.
                let mut actions = self.cancel_all();
                actions.push(DrainAction::Exit { code: EXIT_CLEAN });
                self.phase = DrainPhase::Exited;
                actions
            }
            (DrainPhase::Disconnecting, DrainEvent::Closed) => {
                let actions = vec![
                    DrainAction::CancelForceExit,
                    DrainAction::Exit { code: EXIT_CLEAN },
                ];
                self.force_armed = false;
                self.phase = DrainPhase::Exited;
                actions
            }
            (DrainPhase::Disconnecting, DrainEvent::ForceExitElapsed) => {
                self.force_armed = false;
                self.phase = DrainPhase::Exited;
                vec![DrainAction::Exit { code: EXIT_FORCED }]
            }
            _ => Vec::new(),
        }
    }

    fn disconnect(&mut self, forced: bool) -> Vec<DrainAction> {
        let mut actions = self.cancel_all();
        actions.push(DrainAction::StartForceExit);
        actions.push(DrainAction::Disconnect { forced });
        self.force_armed = true;
        self.phase = DrainPhase::Disconnecting;
        actions
    }

    fn cancel_all(&mut self) -> Vec<DrainAction> {
        let mut actions = Vec::new();
        if std::mem::take(&mut self.poll_armed) {
            actions.push(DrainAction::CancelPoll);
        }
        if std::mem::take(&mut self.window_armed) {
            actions.push(DrainAction::CancelDrainWindow);
        }
        if std::mem::take(&mut self.force_armed) {
            actions.push(DrainAction::CancelForceExit);
        }
        actions
    }
}

/// Timer settings for the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTimings {
    pub poll_interval: Duration,
    pub disconnect_delay: Duration,
    pub force_exit_timeout: Duration,
}

impl From<&WorkerConfig> for DrainTimings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.drain_poll_interval(),
            disconnect_delay: config.disconnect_delay(),
            force_exit_timeout: config.force_shutdown_timeout(),
        }
    }
}

/// What happened during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Time from start to disconnect, and whether it was forced.
    pub disconnect: Option<(Duration, bool)>,
    /// Connection counts observed by the poll, in order.
    pub polls: Vec<usize>,
    /// Time from start to exit.
    pub exited_after: Duration,
    pub exit_code: i32,
}

/// Runs the sequencer against real timers and a server resource.
pub struct DrainCascade {
    sequencer: RestartSequencer,
    timings: DrainTimings,
    flag: GracefulFlag,
    resource: Arc<dyn ServerResource>,
    on_disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl DrainCascade {
    pub fn new(timings: DrainTimings, flag: GracefulFlag, resource: Arc<dyn ServerResource>) -> Self {
        Self {
            sequencer: RestartSequencer::new(),
            timings,
            flag,
            resource,
            on_disconnect: None,
        }
    }

    /// Extra work on disconnect, after the server is closed (the runtime
    /// uses this to close the coordinator channel).
    pub fn on_disconnect(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    pub async fn run(mut self) -> DrainReport {
        let started = Instant::now();
        let mut poll: Option<Interval> = None;
        let mut window: Option<Pin<Box<Sleep>>> = None;
        let mut force: Option<Pin<Box<Sleep>>> = None;
        let mut closed: Option<BoxFuture<'static, ()>> = None;
        let mut report = DrainReport {
            disconnect: None,
            polls: Vec::new(),
            exited_after: Duration::ZERO,
            exit_code: EXIT_CLEAN,
        };

        let mut pending: VecDeque<DrainAction> = self.sequencer.handle(DrainEvent::Start).into();
        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    DrainAction::SetGracefulFlag => self.flag.set(),
                    DrainAction::StartPoll => poll = Some(timer::every(self.timings.poll_interval)),
                    DrainAction::StartDrainWindow => {
                        window = Some(Box::pin(tokio::time::sleep(self.timings.disconnect_delay)))
                    }
                    DrainAction::StartForceExit => {
                        force = Some(Box::pin(tokio::time::sleep(self.timings.force_exit_timeout)))
                    }
                    DrainAction::CancelPoll => poll = None,
                    DrainAction::CancelDrainWindow => window = None,
                    DrainAction::CancelForceExit => force = None,
                    DrainAction::Disconnect { forced } => {
                        let connections = self.resource.connection_count();
                        if forced {
                            tracing::warn!(connections, "Drain window elapsed, forcing disconnect");
                        } else {
                            tracing::info!("Connections drained, disconnecting");
                        }
                        report.disconnect = Some((started.elapsed(), forced));
                        closed = Some(self.resource.closed());
                        self.resource.close();
                        if let Some(hook) = self.on_disconnect.take() {
                            hook();
                        }
                    }
                    DrainAction::Exit { code } => {
                        if code == EXIT_FORCED {
                            tracing::error!(
                                connections = self.resource.connection_count(),
                                timeout = ?self.timings.force_exit_timeout,
                                "Force exit timeout reached"
                            );
                        }
                        report.exited_after = started.elapsed();
                        report.exit_code = code;
                        return report;
                    }
                }
            }

            let event = tokio::select! {
                _ = timer::tick(&mut poll) => {
                    let connections = self.resource.connection_count();
                    tracing::debug!(connections, "Drain poll");
                    report.polls.push(connections);
                    DrainEvent::PollTick { connections }
                }
                _ = timer::fire(&mut window) => {
                    window = None;
                    DrainEvent::DrainWindowElapsed
                }
                _ = timer::fire(&mut force) => {
                    force = None;
                    DrainEvent::ForceExitElapsed
                }
                _ = timer::resolve(&mut closed) => {
                    closed = None;
                    DrainEvent::Closed
                }
            };
            pending.extend(self.sequencer.handle(event));
        }
    }
}
