//! The forking primitive.
//!
//! The coordinator only sees two seams: [`WorkerSpawner`] creates a worker
//! and [`WorkerLink`] talks to it. Everything a worker reports back
//! (messages, channel close, process exit) arrives as a [`ClusterEvent`] on
//! the sender handed to `spawn`.
//!
//! [`ProcessSpawner`] is the OS implementation: it re-executes the current
//! binary with [`WORKER_ENV`] set, using the child's stdin/stdout as the
//! channel.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cluster::event::{ClusterEvent, WorkerExit};
use crate::error::{ClusterError, Result};
use crate::ipc::{CoordinatorMessage, LineReceiver, LineSender, WorkerMessage};

/// Environment variable marking a process as a worker.
pub const WORKER_ENV: &str = "GRACEFUL_CLUSTER_WORKER";

/// Coordinator-side connection to one worker.
pub trait WorkerLink: Send {
    /// Queue a message for the worker.
    fn send(&self, message: CoordinatorMessage) -> Result<()>;

    /// Ask the worker process to terminate (SIGTERM).
    fn terminate(&self) -> Result<()>;
}

/// A worker that was forked successfully.
pub struct SpawnedWorker {
    pub pid: u32,
    pub link: Box<dyn WorkerLink>,
}

/// Creates worker processes.
pub trait WorkerSpawner: Send {
    fn spawn(&mut self, events: &mpsc::UnboundedSender<ClusterEvent>) -> Result<SpawnedWorker>;
}

/// Spawns workers by re-executing the current program.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute this binary with the arguments it was started with.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| ClusterError::Spawn(format!("failed to get current executable: {}", e)))?;
        Ok(Self::new(program, std::env::args_os().skip(1).collect()))
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&mut self, events: &mpsc::UnboundedSender<ClusterEvent>) -> Result<SpawnedWorker> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ClusterError::Spawn(e.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| ClusterError::Spawn("worker exited before reporting a pid".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClusterError::Spawn("worker stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::Spawn("worker stdout not captured".into()))?;

        let (outbox, mut inbox) = mpsc::unbounded_channel::<CoordinatorMessage>();
        tokio::spawn(async move {
            let mut sender = LineSender::new(stdin);
            while let Some(message) = inbox.recv().await {
                if let Err(e) = sender.send(&message).await {
                    tracing::warn!(pid, error = %e, "Failed to deliver message to worker");
                    break;
                }
            }
        });

        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            let mut receiver = LineReceiver::new(stdout);
            loop {
                match receiver.recv::<WorkerMessage>().await {
                    Ok(Some(message)) => {
                        if message.pid() != pid {
                            tracing::warn!(pid, claimed = message.pid(), "Worker message carries a foreign pid");
                        }
                        let _ = reader_events.send(ClusterEvent::Message { pid, message });
                    }
                    Ok(None) => break,
                    Err(ClusterError::Ipc(e)) => {
                        tracing::warn!(pid, error = %e, "Ignoring malformed worker message");
                    }
                    Err(e) => {
                        tracing::warn!(pid, error = %e, "Worker channel failed");
                        break;
                    }
                }
            }
            let _ = reader_events.send(ClusterEvent::Disconnected { pid });
        });

        let exit_events = events.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => WorkerExit::from(status),
                Err(e) => {
                    tracing::error!(pid, error = %e, "Failed to collect worker exit status");
                    WorkerExit::Unknown
                }
            };
            // Report the channel close before the exit.
            let _ = reader.await;
            let _ = exit_events.send(ClusterEvent::Exited { pid, exit });
        });

        Ok(SpawnedWorker {
            pid,
            link: Box::new(ProcessLink { pid, outbox }),
        })
    }
}

struct ProcessLink {
    pid: u32,
    outbox: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl WorkerLink for ProcessLink {
    fn send(&self, message: CoordinatorMessage) -> Result<()> {
        self.outbox
            .send(message)
            .map_err(|_| ClusterError::Ipc(format!("channel to worker {} is closed", self.pid)))
    }

    fn terminate(&self) -> Result<()> {
        let pid = i32::try_from(self.pid)
            .map_err(|_| ClusterError::Signal(format!("pid {} out of range", self.pid)))?;
        signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| ClusterError::Signal(format!("failed to send SIGTERM to {}: {}", self.pid, e)))
    }
}
