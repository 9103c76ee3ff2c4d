//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use graceful_cluster::cluster::coordinator::{CoordinatorOptions, ExitCallback};
use graceful_cluster::cluster::shutdown::ShutdownOutcome;
use graceful_cluster::cluster::spawner::{SpawnedWorker, WorkerLink, WorkerSpawner};
use graceful_cluster::cluster::ClusterEvent;
use graceful_cluster::ipc::CoordinatorMessage;
use graceful_cluster::{ClusterError, Result, ServerResource};

/// First pid handed out by [`FakeSpawner`].
pub const FIRST_PID: u32 = 1000;

/// Something the coordinator did to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCall {
    Send(u32, CoordinatorMessage),
    Terminate(u32),
}

/// Shared record of every link call, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<LinkCall>>>);

impl CallLog {
    fn push(&self, call: LinkCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.0.lock().unwrap().clone()
    }

    /// Pids that were sent a restart instruction.
    pub fn restarts(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LinkCall::Send(pid, CoordinatorMessage::Restart) => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Pids that were sent SIGTERM.
    pub fn terminations(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LinkCall::Terminate(pid) => Some(pid),
                _ => None,
            })
            .collect()
    }
}

struct RecordingLink {
    pid: u32,
    log: CallLog,
}

impl WorkerLink for RecordingLink {
    fn send(&self, message: CoordinatorMessage) -> Result<()> {
        self.log.push(LinkCall::Send(self.pid, message));
        Ok(())
    }

    fn terminate(&self) -> Result<()> {
        self.log.push(LinkCall::Terminate(self.pid));
        Ok(())
    }
}

/// Hands out sequential pids without starting any process.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    next_pid: Arc<AtomicUsize>,
    forks: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    panics: Arc<AtomicBool>,
    log: CallLog,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Successful forks so far.
    pub fn forks(&self) -> usize {
        self.forks.load(Ordering::SeqCst)
    }

    /// Make the next `n` spawn attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next spawn attempt panic.
    pub fn panic_next(&self) {
        self.panics.store(true, Ordering::SeqCst);
    }
}

impl WorkerSpawner for FakeSpawner {
    fn spawn(&mut self, _events: &mpsc::UnboundedSender<ClusterEvent>) -> Result<SpawnedWorker> {
        if self.panics.swap(false, Ordering::SeqCst) {
            panic!("injected spawner panic");
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClusterError::Spawn("injected fork failure".into()));
        }

        let pid = FIRST_PID + self.next_pid.fetch_add(1, Ordering::SeqCst) as u32;
        self.forks.fetch_add(1, Ordering::SeqCst);
        Ok(SpawnedWorker {
            pid,
            link: Box::new(RecordingLink {
                pid,
                log: self.log.clone(),
            }),
        })
    }
}

pub fn options(workers: usize, minimum_health_percent: u32) -> CoordinatorOptions {
    CoordinatorOptions {
        desired_workers: workers,
        minimum_health_percent,
        shutdown_timeout: Duration::from_secs(5),
        disable_graceful: false,
        refork_base_delay: Duration::from_millis(100),
        refork_max_delay: Duration::from_secs(5),
    }
}

/// Exit callback that records the outcome instead of exiting.
pub fn exit_recorder() -> (ExitCallback, Arc<Mutex<Vec<ShutdownOutcome>>>) {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    let callback: ExitCallback = Box::new(move |outcome| sink.lock().unwrap().push(outcome));
    (callback, outcomes)
}

/// Server stand-in with scripted connection counts.
///
/// Each count query pops the next scripted value; the last one repeats.
pub struct FakeResource {
    counts: Mutex<VecDeque<usize>>,
    last: AtomicUsize,
    closes_when_asked: bool,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl FakeResource {
    /// A server that stops as soon as it is closed.
    pub fn new(counts: Vec<usize>) -> Arc<Self> {
        Self::build(counts, true)
    }

    /// A server that never finishes closing.
    pub fn stuck(counts: Vec<usize>) -> Arc<Self> {
        Self::build(counts, false)
    }

    fn build(counts: Vec<usize>, closes_when_asked: bool) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            last: AtomicUsize::new(counts.first().copied().unwrap_or(0)),
            counts: Mutex::new(counts.into()),
            closes_when_asked,
            close_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            closed_tx,
        })
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ServerResource for FakeResource {
    fn connection_count(&self) -> usize {
        match self.counts.lock().unwrap().pop_front() {
            Some(count) => {
                self.last.store(count, Ordering::SeqCst);
                count
            }
            None => self.last.load(Ordering::SeqCst),
        }
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closes_when_asked {
            self.closed.store(true, Ordering::SeqCst);
            self.closed_tx.send_replace(true);
        }
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.closed_tx.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }
}
