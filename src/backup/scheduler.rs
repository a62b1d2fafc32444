//! Periodic backup timer.
//!
//! The interval lives in a `watch` channel. The loop sleeps for the
//! current interval and restarts the sleep whenever the interval changes,
//! so a stale deadline never fires after `set_period`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backup::coordinator::SnapshotCoordinator;

/// Shared, observable periodic interval. Zero means disabled.
#[derive(Debug)]
pub struct PeriodicSchedule {
    tx: watch::Sender<Duration>,
}

impl PeriodicSchedule {
    /// Create a schedule with an initial interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(interval);
        Self { tx }
    }

    /// Replace the interval, waking the loop.
    pub fn set(&self, interval: Duration) {
        self.tx.send_replace(interval);
    }

    /// Current interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.tx.borrow()
    }

    /// Receiver observing interval changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.tx.subscribe()
    }
}

/// Drive periodic saves until `cancel` fires.
pub async fn run_periodic_loop(coordinator: Arc<SnapshotCoordinator>, cancel: CancellationToken) {
    let mut schedule = coordinator.schedule().subscribe();
    info!("periodic backup loop started");

    loop {
        let interval = *schedule.borrow_and_update();
        let fire = async move {
            if interval.is_zero() {
                std::future::pending::<()>().await;
            } else {
                tokio::time::sleep(interval).await;
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            changed = schedule.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(interval = ?*schedule.borrow(), "periodic timer re-armed");
            }
            () = fire => coordinator.periodic_fire(&schedule).await,
        }
    }

    info!("periodic backup loop stopped");
}
