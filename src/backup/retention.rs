//! Retention selection for periodic snapshots.
//!
//! References are walked oldest first. Anything newer than the cutoff is
//! kept. Older references are thinned so that consecutive kept references
//! are more than `retain_interval` apart; the rest become deletion
//! candidates. The spacing reference point starts at the oldest snapshot,
//! which is itself a candidate unless it is inside the recent window.

use std::time::Duration;

use chrono::{DateTime, Duration as TimeDelta, Utc};

use crate::vcs::SnapshotReference;
use crate::{AppError, Result};

/// Pick the references to delete. Input order does not matter; the result
/// is ordered oldest first.
///
/// # Errors
///
/// Returns `AppError::Validation` if either duration is too large to
/// subtract from `now`.
pub fn select_for_pruning(
    refs: &[SnapshotReference],
    now: DateTime<Utc>,
    cutoff_age: Duration,
    retain_interval: Duration,
) -> Result<Vec<SnapshotReference>> {
    let cutoff = TimeDelta::from_std(cutoff_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| AppError::Validation(format!("cutoff age {cutoff_age:?} is out of range")))?;
    let spacing = TimeDelta::from_std(retain_interval).map_err(|_| {
        AppError::Validation(format!("retain interval {retain_interval:?} is out of range"))
    })?;

    let mut sorted: Vec<&SnapshotReference> = refs.iter().collect();
    sorted.sort_by_key(|r| r.created_at);

    let Some(oldest) = sorted.first() else {
        return Ok(Vec::new());
    };
    let mut last_kept = oldest.created_at;
    let mut candidates = Vec::new();

    for r in sorted {
        if r.created_at > cutoff || r.created_at - last_kept > spacing {
            last_kept = r.created_at;
        } else {
            candidates.push(r.clone());
        }
    }

    Ok(candidates)
}
