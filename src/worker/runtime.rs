//! Worker process main loop.
//!
//! # Responsibilities
//! - Start the embedded server through the user's entry point
//! - Report readiness and forward restart requests to the coordinator
//! - Run the drain cascade on a restart instruction, SIGTERM, or loss of
//!   the coordinator channel

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};

use crate::config::WorkerConfig;
use crate::error::{ClusterError, Result};
use crate::ipc::{CoordinatorMessage, LineReceiver, LineSender, WorkerMessage};
use crate::worker::drain::{DrainCascade, DrainReport, DrainTimings, EXIT_FORCED};
use crate::worker::flag::GracefulFlag;
use crate::worker::monitor::{ProcessMemory, SelfMonitor};
use crate::worker::resource::ServerResource;

/// Starts the embedded server inside a worker.
///
/// Receives the worker's [`WorkerContext`] and returns the running server as
/// a [`ServerResource`].
pub type WorkerEntry =
    Arc<dyn Fn(WorkerContext) -> BoxFuture<'static, Result<Arc<dyn ServerResource>>> + Send + Sync>;

/// Handle given to application code running inside a worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pid: u32,
    outbox: mpsc::UnboundedSender<WorkerMessage>,
    flag: GracefulFlag,
}

impl WorkerContext {
    pub fn new(pid: u32, outbox: mpsc::UnboundedSender<WorkerMessage>, flag: GracefulFlag) -> Self {
        Self { pid, outbox, flag }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Flag the server should consult to stop offering keep-alive.
    pub fn graceful_flag(&self) -> GracefulFlag {
        self.flag.clone()
    }

    /// Ask the coordinator to restart this worker.
    ///
    /// Goes through the same admission as the memory and interval triggers;
    /// if the health floor is reached the request is dropped and may be
    /// repeated later.
    pub fn restart_current_worker(&self) {
        if self
            .outbox
            .send(WorkerMessage::ConfirmRestart { pid: self.pid })
            .is_err()
        {
            tracing::warn!(pid = self.pid, "Coordinator channel closed, restart request dropped");
        }
    }

    fn notify_online(&self) {
        let _ = self.outbox.send(WorkerMessage::Online { pid: self.pid });
    }
}

/// Why the worker started draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// Restart admitted by the coordinator.
    Restart,
    /// SIGTERM from the coordinator's shutdown.
    Terminate,
    /// The coordinator channel closed.
    ChannelClosed,
}

/// Run a worker over stdin/stdout and return its exit code.
pub async fn run_worker(config: &WorkerConfig, entry: WorkerEntry) -> Result<i32> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| ClusterError::Signal(format!("failed to install SIGTERM handler: {}", e)))?;
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| ClusterError::Signal(format!("failed to install SIGINT handler: {}", e)))?;

    // Ctrl-C reaches the whole process group; only the coordinator acts on it.
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            tracing::debug!("Worker ignoring SIGINT");
        }
    });

    let report = serve(
        config,
        entry,
        std::process::id(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        async move {
            terminate.recv().await;
        },
    )
    .await?;
    Ok(report.exit_code)
}

/// Drive one worker over the given channel halves.
///
/// `terminate` resolves when the worker is told to shut down without a
/// restart (SIGTERM in production).
pub async fn serve<R, W, T>(
    config: &WorkerConfig,
    entry: WorkerEntry,
    pid: u32,
    inbound: R,
    outbound: W,
    terminate: T,
) -> Result<DrainReport>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    T: Future<Output = ()>,
{
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<WorkerMessage>();
    let (disconnect_tx, mut disconnect_rx) = oneshot::channel::<()>();

    // Dropping the writer closes our end of the channel, which the
    // coordinator observes as a disconnect.
    tokio::spawn(async move {
        let mut sender = LineSender::new(outbound);
        loop {
            tokio::select! {
                message = outgoing.recv() => match message {
                    Some(message) => {
                        if let Err(e) = sender.send(&message).await {
                            tracing::warn!(error = %e, "Failed to write to coordinator");
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut disconnect_rx => break,
            }
        }
    });

    let flag = GracefulFlag::new();
    let context = WorkerContext::new(pid, outbox, flag.clone());
    let resource = entry(context.clone()).await?;
    context.notify_online();
    tracing::info!(pid, "Worker online");

    let monitor = tokio::spawn(
        SelfMonitor::new(config, Box::new(ProcessMemory::new())).run(context.clone()),
    );

    let mut receiver = LineReceiver::new(inbound);
    let mut server_closed = resource.closed();
    tokio::pin!(terminate);

    let reason = loop {
        tokio::select! {
            message = receiver.recv::<CoordinatorMessage>() => match message {
                Ok(Some(CoordinatorMessage::Restart)) => break DrainReason::Restart,
                Ok(None) => break DrainReason::ChannelClosed,
                Err(ClusterError::Ipc(e)) => {
                    tracing::warn!(pid, error = %e, "Ignoring malformed coordinator message");
                }
                Err(e) => {
                    tracing::warn!(pid, error = %e, "Coordinator channel failed");
                    break DrainReason::ChannelClosed;
                }
            },
            _ = &mut terminate => break DrainReason::Terminate,
            _ = &mut server_closed => {
                monitor.abort();
                tracing::error!(pid, "Server stopped unexpectedly");
                return Ok(DrainReport {
                    disconnect: None,
                    polls: Vec::new(),
                    exited_after: std::time::Duration::ZERO,
                    exit_code: EXIT_FORCED,
                });
            }
        }
    };

    monitor.abort();
    tracing::info!(
        pid,
        ?reason,
        connections = resource.connection_count(),
        "Draining worker"
    );

    let report = DrainCascade::new(DrainTimings::from(config), flag, resource)
        .on_disconnect(move || {
            let _ = disconnect_tx.send(());
        })
        .run()
        .await;

    tracing::info!(pid, exit_code = report.exit_code, after = ?report.exited_after, "Worker exiting");
    Ok(report)
}
