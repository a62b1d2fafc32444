//! Quiesce handshake with a running server.
//!
//! After `save hold` has been sent the server finishes its pending writes
//! and, in response to `save query`, eventually prints [`READY_MARKER`]
//! followed by a manifest line listing the files to copy. The manifest is
//! read but not used: the whole workspace is snapshotted.

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::debug;

use crate::backup::{READY_MARKER, SAVE_QUERY};
use crate::config::BackupConfig;
use crate::process::{OutputReceiver, ProcessHandle};
use crate::{AppError, Result};

/// Deadlines and pauses used while waiting for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTiming {
    /// Overall deadline, measured from the moment `save hold` was sent.
    pub timeout: Duration,
    /// Pause before the first poll.
    pub hold_grace: Duration,
    /// Pause between `save query` polls.
    pub poll_interval: Duration,
}

impl From<&BackupConfig> for HandshakeTiming {
    fn from(config: &BackupConfig) -> Self {
        Self {
            timeout: config.save_timeout(),
            hold_grace: config.hold_grace(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Poll the server until it reports that files are ready to copy.
///
/// Returns the manifest line that follows the marker, or `None` when the
/// server printed none before the deadline.
///
/// # Errors
///
/// - `AppError::Timeout` if the marker does not appear before the deadline.
/// - `AppError::State` if the output subscription closes (server exited).
/// - Errors from sending `save query`.
pub async fn wait_until_ready(
    process: &dyn ProcessHandle,
    output: &mut OutputReceiver,
    timing: HandshakeTiming,
) -> Result<Option<String>> {
    let deadline = Instant::now() + timing.timeout;
    tokio::time::sleep(timing.hold_grace).await;

    loop {
        match output.try_recv() {
            Ok(line) if line.contains(READY_MARKER) => {
                debug!("server reported files ready");
                let remaining = deadline.saturating_duration_since(Instant::now());
                let manifest = tokio::time::timeout(remaining, output.recv())
                    .await
                    .ok()
                    .flatten();
                debug!(?manifest, "save manifest");
                return Ok(manifest);
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(AppError::Timeout(format!(
                        "server did not confirm the save within {:?}",
                        timing.timeout
                    )));
                }
                process.send_input(SAVE_QUERY).await?;
                tokio::time::sleep(timing.poll_interval.min(deadline - now)).await;
            }
            Err(TryRecvError::Disconnected) => {
                return Err(AppError::State(
                    "server output closed during save handshake".into(),
                ));
            }
        }
    }
}
