//! Snapshot coordinator.
//!
//! Every public operation takes `op_lock` for its whole duration, so at
//! most one snapshot-store operation runs at a time. The periodic loop
//! goes through the same lock. A stuck save handshake therefore blocks
//! every other operation until its deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backup::handshake::{wait_until_ready, HandshakeTiming};
use crate::backup::retention::select_for_pruning;
use crate::backup::scheduler::{run_periodic_loop, PeriodicSchedule};
use crate::backup::{CLEAN_MESSAGE, PERIODIC_MESSAGE, SAVE_HOLD, SAVE_RESUME};
use crate::config::BackupConfig;
use crate::console::Console;
use crate::duration::format_duration;
use crate::process::{OutputReceiver, ProcessHandle};
use crate::vcs::{SnapshotKind, SnapshotReference, VersionControlClient};
use crate::{AppError, Result};

/// Source of "now" for snapshot names and retention cutoffs.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Shortest non-zero periodic interval.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Result of a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The working tree was clean; no reference was created.
    Skipped,
    /// A new reference with this name was created.
    Created(String),
}

/// Serialises snapshot operations over the process and the store.
pub struct SnapshotCoordinator {
    process: Arc<dyn ProcessHandle>,
    vcs: Arc<dyn VersionControlClient>,
    console: Console,
    timing: HandshakeTiming,
    op_lock: Mutex<()>,
    schedule: PeriodicSchedule,
    clock: Clock,
}

impl std::fmt::Debug for SnapshotCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCoordinator")
            .field("timing", &self.timing)
            .field("interval", &self.schedule.interval())
            .finish_non_exhaustive()
    }
}

impl SnapshotCoordinator {
    /// Create a coordinator with the `[backup]` timing and initial interval.
    #[must_use]
    pub fn new(
        process: Arc<dyn ProcessHandle>,
        vcs: Arc<dyn VersionControlClient>,
        console: Console,
        config: &BackupConfig,
    ) -> Self {
        let coordinator = Self {
            process,
            vcs,
            console,
            timing: HandshakeTiming::from(config),
            op_lock: Mutex::new(()),
            schedule: PeriodicSchedule::new(config.interval()),
            clock: Arc::new(Utc::now),
        };
        coordinator.log_interval(config.interval());
        coordinator
    }

    /// Replace the clock (tests pin "now" to make names and cutoffs stable).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Override the handshake timing.
    #[must_use]
    pub fn with_timing(mut self, timing: HandshakeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Current periodic interval; zero when disabled.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.schedule.interval()
    }

    pub(crate) fn schedule(&self) -> &PeriodicSchedule {
        &self.schedule
    }

    /// Start the periodic backup loop. It runs until `cancel` fires.
    #[must_use]
    pub fn spawn_periodic(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            run_periodic_loop(Arc::clone(self), cancel).instrument(info_span!("periodic_backup")),
        )
    }

    /// Snapshot the workspace, pausing server writes first if it is running.
    ///
    /// # Errors
    ///
    /// - `AppError::Internal` if `message` is empty.
    /// - `AppError::Timeout` if the server does not confirm the save in time.
    /// - Store command failures.
    pub async fn save(&self, kind: SnapshotKind, message: &str) -> Result<SaveOutcome> {
        let _guard = self.op_lock.lock().await;
        self.save_locked(kind, message).await
    }

    async fn save_locked(&self, kind: SnapshotKind, message: &str) -> Result<SaveOutcome> {
        if message.trim().is_empty() {
            return Err(AppError::Internal(
                "snapshot message must not be empty".into(),
            ));
        }

        if !self.process.is_running() {
            return self.create_snapshot(kind, message).await;
        }

        let mut output = self.process.start_read_output()?;
        let result = self.quiesced_snapshot(kind, message, &mut output).await;
        self.process.end_read_output();
        result
    }

    async fn quiesced_snapshot(
        &self,
        kind: SnapshotKind,
        message: &str,
        output: &mut OutputReceiver,
    ) -> Result<SaveOutcome> {
        self.process.send_input(SAVE_HOLD).await?;

        let outcome = match wait_until_ready(self.process.as_ref(), output, self.timing).await {
            Ok(_manifest) => self.create_snapshot(kind, message).await,
            Err(err) => {
                self.console.log(format!("save aborted. {err}"));
                Err(err)
            }
        };

        if let Err(err) = self.process.send_input(SAVE_RESUME).await {
            warn!(%err, "save resume failed");
            self.console.log(format!(
                "unable to resume server writes, the server may remain paused. {err}"
            ));
        }

        outcome
    }

    async fn create_snapshot(&self, kind: SnapshotKind, message: &str) -> Result<SaveOutcome> {
        if self.vcs.is_working_tree_clean().await? {
            self.console.log("skipping snapshot. no dirty files");
            return Ok(SaveOutcome::Skipped);
        }

        let name = kind.reference_name((self.clock)());
        self.vcs
            .run_command(&["checkout", "--orphan", name.as_str()])
            .await?;
        self.vcs.run_command(&["add", "-A"]).await?;
        self.vcs
            .run_command(&["commit", "--allow-empty", "-m", message])
            .await?;

        info!(snapshot = %name, %kind, "snapshot created");
        self.console.log(format!("snapshot {name} created"));
        Ok(SaveOutcome::Created(name))
    }

    /// Check out a snapshot into the workspace.
    ///
    /// # Errors
    ///
    /// - `AppError::State` if the server is running or the tree is dirty.
    /// - `AppError::Validation` if `name` is empty or ambiguous.
    /// - Store command failures.
    pub async fn restore(&self, name: &str) -> Result<SnapshotReference> {
        let _guard = self.op_lock.lock().await;

        if self.process.is_running() {
            return Err(AppError::State(
                "cannot restore. server is running".into(),
            ));
        }
        if !self.vcs.is_working_tree_clean().await? {
            return Err(AppError::State(
                "cannot restore. workspace has unsaved changes, save or clean first".into(),
            ));
        }

        let target = self.resolve(name).await?;
        self.vcs.checkout(&target).await?;
        self.console
            .log(format!("successfully restored to {}", target.name));
        Ok(target)
    }

    async fn resolve(&self, name: &str) -> Result<SnapshotReference> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("snapshot name is required".into()));
        }

        let mut matches = self.vcs.list_references(&[name.to_owned()]).await?;
        match matches.len() {
            0 => {
                debug!(name, "no listed reference, passing name through");
                Ok(SnapshotReference::named(name))
            }
            1 => Ok(matches.remove(0)),
            n => Err(AppError::Validation(format!(
                "'{name}' matches {n} snapshots"
            ))),
        }
    }

    /// Print and return the references matching `filters` in store order.
    ///
    /// # Errors
    ///
    /// Store command failures.
    pub async fn list(&self, filters: &[String]) -> Result<Vec<SnapshotReference>> {
        let _guard = self.op_lock.lock().await;

        let refs = self.vcs.list_references(filters).await?;
        if refs.is_empty() {
            self.console.log("no snapshots found");
        }
        for r in &refs {
            self.console.println(r.to_string());
        }
        Ok(refs)
    }

    /// Discard uncommitted changes, keeping them as a `temp` snapshot.
    ///
    /// # Errors
    ///
    /// `AppError::State` if the server is running, or store failures.
    pub async fn clean(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        if self.process.is_running() {
            return Err(AppError::State("cannot clean. server is running".into()));
        }

        let head = self.vcs.current_head().await?;
        debug!(head = %head.name, "clean: captured head");
        self.save_locked(SnapshotKind::Temp, CLEAN_MESSAGE).await?;
        self.vcs.checkout(&head).await?;
        self.console.log("clean successful");
        Ok(())
    }

    /// Delete the references matching `filters`. Returns the references
    /// submitted for deletion (active ones are skipped).
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` if no filter is given or nothing matches.
    /// - `AppError::ProtectedResource` if the only match is active.
    /// - Store command failures.
    pub async fn delete(&self, filters: &[String]) -> Result<Vec<SnapshotReference>> {
        let _guard = self.op_lock.lock().await;

        if filters.is_empty() {
            return Err(AppError::Validation(
                "must specify at least one snapshot to delete".into(),
            ));
        }
        let refs = self.vcs.list_references(filters).await?;
        if refs.is_empty() {
            return Err(AppError::Validation(format!(
                "no snapshots match {}",
                filters.join(" ")
            )));
        }
        self.vcs.delete_references(&refs).await
    }

    /// Thin out old periodic snapshots. Returns the references submitted
    /// for deletion.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` for out-of-range durations.
    /// - `AppError::ProtectedResource` if the only candidate is active.
    /// - Store command failures.
    pub async fn prune(
        &self,
        cutoff_age: Duration,
        retain_interval: Duration,
    ) -> Result<Vec<SnapshotReference>> {
        let _guard = self.op_lock.lock().await;

        let refs = self
            .vcs
            .list_references(&[SnapshotKind::Periodic.filter()])
            .await?;
        let candidates = select_for_pruning(&refs, (self.clock)(), cutoff_age, retain_interval)?;
        info!(
            total = refs.len(),
            candidates = candidates.len(),
            cutoff = %format_duration(cutoff_age),
            retain = %format_duration(retain_interval),
            "prune selection"
        );

        if candidates.is_empty() {
            self.console.log("nothing to prune");
            return Ok(Vec::new());
        }
        self.vcs.delete_references(&candidates).await
    }

    /// Run `work` while holding the operation lock. Snapshot operations
    /// started meanwhile, including a periodic fire, wait for it.
    pub async fn exclusive<F: Future>(&self, work: F) -> F::Output {
        let _guard = self.op_lock.lock().await;
        work.await
    }

    /// Change the periodic interval; zero disables periodic saves.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` for a non-zero interval under one second.
    pub async fn set_period(&self, interval: Duration) -> Result<()> {
        if !interval.is_zero() && interval < MIN_INTERVAL {
            return Err(AppError::Validation(format!(
                "backup interval must be 0 or at least {}, got {}",
                format_duration(MIN_INTERVAL),
                format_duration(interval)
            )));
        }

        let _guard = self.op_lock.lock().await;
        self.schedule.set(interval);
        self.log_interval(interval);
        Ok(())
    }

    fn log_interval(&self, interval: Duration) {
        if interval.is_zero() {
            self.console.log("periodic backup disabled");
        } else {
            self.console
                .log(format!("backup interval set to {}", format_duration(interval)));
        }
    }

    /// One timer fire. Discarded if the interval changed while waiting for
    /// the lock.
    pub(crate) async fn periodic_fire(&self, schedule: &watch::Receiver<Duration>) {
        let _guard = self.op_lock.lock().await;

        if schedule.has_changed().unwrap_or(true) {
            debug!("interval changed before the periodic save could run, skipping");
            return;
        }

        match self.save_locked(SnapshotKind::Periodic, PERIODIC_MESSAGE).await {
            Ok(outcome) => debug!(?outcome, "periodic backup finished"),
            Err(err) => {
                warn!(%err, "periodic backup failed");
                self.console.log(format!("periodic backup failed. {err}"));
            }
        }
    }
}
