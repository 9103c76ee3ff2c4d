//! Optional timers for `tokio::select!` loops.
//!
//! A disarmed timer never fires, so a branch can stay in the `select!`
//! regardless of whether its timer is running.

use std::future::Future;
use std::pin::Pin;

use tokio::time::{Interval, Sleep};

pub(crate) async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub(crate) async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn resolve<F: Future + Unpin>(future: &mut Option<F>) {
    match future {
        Some(future) => {
            future.await;
        }
        None => std::future::pending().await,
    }
}

/// An interval whose first tick is one full `period` away.
pub(crate) fn every(period: std::time::Duration) -> Interval {
    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
}
