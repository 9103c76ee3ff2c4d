//! OS signal handling for the coordinator.
//!
//! # Responsibilities
//! - Register SIGTERM, SIGINT and SIGUSR2 handlers
//! - Translate them into [`ClusterEvent::Signal`] for the event loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The listener only forwards; idempotence of repeated SIGTERM/SIGINT is
//!   the shutdown sequencer's job

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cluster::event::{ClusterEvent, ClusterSignal};
use crate::error::{ClusterError, Result};

fn install(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).map_err(|e| ClusterError::Signal(format!("failed to install {} handler: {}", name, e)))
}

/// Forward coordinator signals into `events` until the receiver is gone.
pub fn spawn_signal_listener(events: mpsc::UnboundedSender<ClusterEvent>) -> Result<JoinHandle<()>> {
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut rolling = install(SignalKind::user_defined2(), "SIGUSR2")?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = terminate.recv() => ClusterSignal::Terminate,
                Some(()) = interrupt.recv() => ClusterSignal::Interrupt,
                Some(()) = rolling.recv() => ClusterSignal::RollingRestart,
                else => break,
            };
            tracing::info!(signal = %received, "Signal received");
            if events.send(ClusterEvent::Signal(received)).is_err() {
                break;
            }
        }
    }))
}
