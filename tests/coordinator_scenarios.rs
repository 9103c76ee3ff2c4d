//! Coordinator behaviour driven through fake workers.

use std::time::Duration;

use graceful_cluster::cluster::{
    ClusterEvent, ClusterSignal, Coordinator, Rejection, RestartDecision, ShutdownOutcome, WorkerExit,
    WorkerState,
};
use graceful_cluster::ipc::WorkerMessage;

mod common;
use common::{exit_recorder, options, FakeSpawner, FIRST_PID};

fn online(pid: u32) -> ClusterEvent {
    ClusterEvent::Message {
        pid,
        message: WorkerMessage::Online { pid },
    }
}

fn confirm_restart(pid: u32) -> ClusterEvent {
    ClusterEvent::Message {
        pid,
        message: WorkerMessage::ConfirmRestart { pid },
    }
}

fn exited(pid: u32) -> ClusterEvent {
    ClusterEvent::Exited {
        pid,
        exit: WorkerExit::Code(0),
    }
}

fn pids(n: usize) -> Vec<u32> {
    (0..n as u32).map(|i| FIRST_PID + i).collect()
}

#[tokio::test]
async fn health_floor_caps_concurrent_restarts() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(10, 50), spawner.clone(), on_exit);
    coordinator.start_workers();
    for pid in pids(10) {
        coordinator.handle_event(online(pid));
    }

    for pid in pids(6) {
        coordinator.handle_event(confirm_restart(pid));
    }

    assert_eq!(log.restarts(), pids(5));
    assert_eq!(coordinator.state().closing_count(), 5);
    assert_eq!(coordinator.state().live_count(), 10);
    assert!(!coordinator.state().is_closing(FIRST_PID + 5));
}

#[tokio::test]
async fn repeated_request_is_not_double_counted() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(4, 50), spawner, on_exit);
    coordinator.start_workers();

    assert_eq!(coordinator.handle_restart_request(FIRST_PID), RestartDecision::Admitted);
    assert_eq!(
        coordinator.handle_restart_request(FIRST_PID),
        RestartDecision::Rejected(Rejection::AlreadyClosing)
    );
    assert_eq!(
        coordinator.handle_restart_request(9999),
        RestartDecision::Rejected(Rejection::UnknownWorker)
    );

    assert_eq!(log.restarts(), vec![FIRST_PID]);
    assert_eq!(coordinator.state().closing_count(), 1);
}

#[tokio::test]
async fn admitted_worker_is_replaced_after_exit() {
    let spawner = FakeSpawner::new();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(2, 50), spawner.clone(), on_exit);
    coordinator.start_workers();
    coordinator.handle_event(confirm_restart(FIRST_PID));

    coordinator.handle_event(ClusterEvent::Disconnected { pid: FIRST_PID });
    assert_eq!(
        coordinator.state().get(FIRST_PID).map(|w| w.state()),
        Some(WorkerState::Terminating)
    );

    coordinator.handle_event(exited(FIRST_PID));
    assert!(!coordinator.state().contains(FIRST_PID));
    assert_eq!(coordinator.state().closing_count(), 0);
    assert_eq!(coordinator.state().live_count(), 2);
    assert_eq!(spawner.forks(), 3);
}

#[tokio::test]
async fn crash_forks_exactly_one_replacement() {
    let spawner = FakeSpawner::new();
    let (on_exit, outcomes) = exit_recorder();
    let mut coordinator = Coordinator::new(options(3, 50), spawner.clone(), on_exit);
    coordinator.start_workers();
    for pid in pids(3) {
        coordinator.handle_event(online(pid));
    }

    coordinator.handle_event(ClusterEvent::Disconnected { pid: FIRST_PID + 1 });
    coordinator.handle_event(ClusterEvent::Exited {
        pid: FIRST_PID + 1,
        exit: WorkerExit::Signaled(9),
    });

    assert_eq!(spawner.forks(), 4);
    assert_eq!(coordinator.state().live_count(), 3);
    assert_eq!(coordinator.state().closing_count(), 0);
    assert!(outcomes.lock().unwrap().is_empty());

    // A duplicate exit notification must not fork again.
    coordinator.handle_event(exited(FIRST_PID + 1));
    assert_eq!(spawner.forks(), 4);
}

#[tokio::test]
async fn disabled_graceful_exits_immediately() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, outcomes) = exit_recorder();
    let mut opts = options(3, 50);
    opts.disable_graceful = true;
    let mut coordinator = Coordinator::new(opts, spawner, on_exit);
    coordinator.start_workers();

    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::Terminate));

    assert_eq!(*outcomes.lock().unwrap(), vec![ShutdownOutcome::Immediate]);
    assert!(log.terminations().is_empty());
    assert_eq!(coordinator.outcome(), Some(ShutdownOutcome::Immediate));
}

#[tokio::test]
async fn shutdown_waits_for_every_worker() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, outcomes) = exit_recorder();
    let mut coordinator = Coordinator::new(options(3, 50), spawner.clone(), on_exit);
    coordinator.start_workers();

    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::Interrupt));
    assert!(coordinator.is_shutting_down());
    assert_eq!(log.terminations(), pids(3));

    // A second signal does not restart the sequence.
    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::Terminate));
    assert_eq!(log.terminations().len(), 3);

    // Restart requests are refused while shutting down.
    assert!(matches!(
        coordinator.handle_restart_request(FIRST_PID),
        RestartDecision::Rejected(_)
    ));

    for pid in pids(3) {
        assert!(outcomes.lock().unwrap().is_empty());
        coordinator.handle_event(exited(pid));
    }

    assert_eq!(*outcomes.lock().unwrap(), vec![ShutdownOutcome::Drained]);
    assert_eq!(spawner.forks(), 3, "no re-fork during shutdown");
}

#[tokio::test(start_paused = true)]
async fn shutdown_timeout_exits_with_workers_alive() {
    let spawner = FakeSpawner::new();
    let (on_exit, outcomes) = exit_recorder();
    let coordinator = Coordinator::new(options(2, 50), spawner, on_exit);
    let events = coordinator.event_sender();

    let start = tokio::time::Instant::now();
    let run = tokio::spawn(coordinator.run());
    events.send(ClusterEvent::Signal(ClusterSignal::Terminate)).unwrap();

    assert_eq!(run.await.unwrap(), ShutdownOutcome::TimedOut);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(*outcomes.lock().unwrap(), vec![ShutdownOutcome::TimedOut]);
}

#[tokio::test(start_paused = true)]
async fn run_finishes_when_workers_drain() {
    let spawner = FakeSpawner::new();
    let (on_exit, _) = exit_recorder();
    let coordinator = Coordinator::new(options(2, 50), spawner, on_exit);
    let events = coordinator.event_sender();

    let start = tokio::time::Instant::now();
    let run = tokio::spawn(coordinator.run());
    events.send(ClusterEvent::Signal(ClusterSignal::Terminate)).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    for pid in pids(2) {
        events.send(exited(pid)).unwrap();
    }

    assert_eq!(run.await.unwrap(), ShutdownOutcome::Drained);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn rolling_restart_goes_one_at_a_time() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(3, 50), spawner, on_exit);
    coordinator.start_workers();
    for pid in pids(3) {
        coordinator.handle_event(online(pid));
    }

    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::RollingRestart));
    assert_eq!(log.restarts(), vec![FIRST_PID]);
    assert_eq!(coordinator.rolling_remaining(), 2);

    // A second SIGUSR2 while rolling does not queue the workers again.
    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::RollingRestart));
    assert_eq!(coordinator.rolling_remaining(), 2);

    // Each replacement must come online before the next worker goes.
    coordinator.handle_event(exited(FIRST_PID));
    assert_eq!(log.restarts(), vec![FIRST_PID]);
    coordinator.handle_event(online(FIRST_PID + 3));
    assert_eq!(log.restarts(), vec![FIRST_PID, FIRST_PID + 1]);

    coordinator.handle_event(exited(FIRST_PID + 1));
    assert_eq!(log.restarts(), vec![FIRST_PID, FIRST_PID + 1]);
    coordinator.handle_event(online(FIRST_PID + 4));
    assert_eq!(log.restarts(), vec![FIRST_PID, FIRST_PID + 1, FIRST_PID + 2]);
    assert_eq!(coordinator.rolling_remaining(), 0);

    // Replacements forked during the roll are not restarted themselves.
    coordinator.handle_event(exited(FIRST_PID + 2));
    coordinator.handle_event(online(FIRST_PID + 5));
    assert_eq!(log.restarts().len(), 3);
    assert_eq!(coordinator.state().live_count(), 3);
}

#[tokio::test]
async fn rolling_restart_keeps_a_serving_worker() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(2, 50), spawner, on_exit);
    coordinator.start_workers();
    for pid in pids(2) {
        coordinator.handle_event(online(pid));
    }

    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::RollingRestart));
    coordinator.handle_event(exited(FIRST_PID));

    let replacement = FIRST_PID + 2;
    assert_eq!(
        coordinator.state().get(replacement).map(|w| w.state()),
        Some(WorkerState::Starting)
    );
    assert_eq!(log.restarts(), vec![FIRST_PID]);
    assert!(!coordinator.state().is_closing(FIRST_PID + 1));

    coordinator.handle_event(online(replacement));
    assert_eq!(log.restarts(), vec![FIRST_PID, FIRST_PID + 1]);
}

#[tokio::test]
async fn rolling_restart_waits_for_starting_workers() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, _) = exit_recorder();
    let mut coordinator = Coordinator::new(options(2, 50), spawner, on_exit);
    coordinator.start_workers();
    coordinator.handle_event(online(FIRST_PID));

    coordinator.handle_event(ClusterEvent::Signal(ClusterSignal::RollingRestart));
    assert!(log.restarts().is_empty());
    assert_eq!(coordinator.rolling_remaining(), 2);

    coordinator.handle_event(online(FIRST_PID + 1));
    assert_eq!(log.restarts(), vec![FIRST_PID]);
}

#[tokio::test]
async fn panicking_handler_does_not_stop_the_loop() {
    let spawner = FakeSpawner::new();
    let log = spawner.log();
    let (on_exit, outcomes) = exit_recorder();
    let coordinator = Coordinator::new(options(2, 50), spawner.clone(), on_exit);
    let events = coordinator.event_sender();
    let run = tokio::spawn(coordinator.run());

    for pid in pids(2) {
        events.send(online(pid)).unwrap();
    }
    spawner.panic_next();
    events.send(exited(FIRST_PID)).unwrap();
    events.send(ClusterEvent::Signal(ClusterSignal::Terminate)).unwrap();
    events.send(exited(FIRST_PID + 1)).unwrap();

    assert_eq!(run.await.unwrap(), ShutdownOutcome::Drained);
    assert_eq!(*outcomes.lock().unwrap(), vec![ShutdownOutcome::Drained]);
    assert_eq!(log.terminations(), vec![FIRST_PID + 1]);
    assert_eq!(spawner.forks(), 2);
}

#[tokio::test(start_paused = true)]
async fn worker_dying_before_online_is_reforked_with_backoff() {
    let spawner = FakeSpawner::new();
    let (on_exit, _) = exit_recorder();
    let coordinator = Coordinator::new(options(2, 50), spawner.clone(), on_exit);
    let events = coordinator.event_sender();
    let run = tokio::spawn(coordinator.run());

    events
        .send(ClusterEvent::Exited {
            pid: FIRST_PID,
            exit: WorkerExit::Code(1),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(spawner.forks(), 2, "no immediate re-fork");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(spawner.forks(), 3);
    run.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_fork_is_retried_with_backoff() {
    let spawner = FakeSpawner::new();
    spawner.fail_next(2);
    let (on_exit, _) = exit_recorder();
    let coordinator = Coordinator::new(options(2, 50), spawner.clone(), on_exit);

    let run = tokio::spawn(coordinator.run());
    tokio::task::yield_now().await;
    assert_eq!(spawner.forks(), 0);

    // Attempt 1 retries after ~100ms, attempt 2 after ~200ms.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(spawner.forks(), 2);
    run.abort();
}
