//! Snapshot store abstraction.
//!
//! Snapshots live as branches of a version-control repository rooted at the
//! world directory. The coordinator only talks to the store through
//! [`VersionControlClient`], so tests can swap in an in-memory double and
//! the production [`git::GitClient`] stays a thin command adapter.

pub mod git;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use futures_util::future::BoxFuture;

use crate::{AppError, Result};

/// Root of every snapshot reference name.
pub const SNAPSHOT_NAMESPACE: &str = "saves";

/// Timestamp layout embedded in snapshot names.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Why a snapshot was taken. Encoded in the reference name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Requested by the operator.
    Manual,
    /// Taken by the backup timer.
    Periodic,
    /// Safety copy taken before discarding changes.
    Temp,
}

impl SnapshotKind {
    /// Lower-case kind label used in names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Periodic => "periodic",
            Self::Temp => "temp",
        }
    }

    /// Name prefix shared by all snapshots of this kind, e.g. `saves/periodic/`.
    #[must_use]
    pub fn prefix(self) -> String {
        format!("{SNAPSHOT_NAMESPACE}/{}/", self.as_str())
    }

    /// Branch filter selecting every snapshot of this kind.
    #[must_use]
    pub fn filter(self) -> String {
        format!("{}*", self.prefix())
    }

    /// Reference name for a snapshot taken at `at` (local time).
    #[must_use]
    pub fn reference_name(self, at: DateTime<Utc>) -> String {
        format!(
            "{}{}",
            self.prefix(),
            at.with_timezone(&Local).format(SNAPSHOT_TIMESTAMP_FORMAT)
        )
    }
}

impl Display for SnapshotKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "periodic" => Ok(Self::Periodic),
            "temp" => Ok(Self::Temp),
            other => Err(AppError::Validation(format!(
                "unknown snapshot kind '{other}'"
            ))),
        }
    }
}

/// A named, immutable point in the store's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReference {
    /// Hierarchical reference name, e.g. `saves/periodic/20210102-010000`.
    pub name: String,
    /// Whether this reference is currently checked out.
    pub is_active: bool,
    /// Short content hash.
    pub content_id: String,
    /// Snapshot message.
    pub subject: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Human-readable age as reported by the store.
    pub created_at_relative: String,
}

impl SnapshotReference {
    /// Reference known only by name (e.g. an operator-typed commit id).
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: false,
            content_id: String::new(),
            subject: String::new(),
            created_at: DateTime::<Utc>::default(),
            created_at_relative: String::new(),
        }
    }

    /// Kind recorded in the name, if the name follows the snapshot scheme.
    #[must_use]
    pub fn kind(&self) -> Option<SnapshotKind> {
        let rest = self.name.strip_prefix(SNAPSHOT_NAMESPACE)?.strip_prefix('/')?;
        let (kind, _) = rest.split_once('/')?;
        kind.parse().ok()
    }
}

impl Display for SnapshotReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let marker = if self.is_active { "*" } else { " " };
        write!(
            f,
            "{marker} {} {} {} ({})",
            self.name, self.content_id, self.subject, self.created_at_relative
        )
    }
}

/// Narrow command interface to the version-control backend.
pub trait VersionControlClient: Send + Sync {
    /// Run a raw backend command in the workspace and return its output.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ExternalCommand`] on spawn failure or non-zero
    /// exit, [`AppError::Timeout`] if the command exceeds its deadline.
    fn run_command<'a>(&'a self, args: &'a [&'a str]) -> BoxFuture<'a, Result<String>>;

    /// Whether the working tree has no uncommitted or untracked changes.
    ///
    /// # Errors
    ///
    /// Propagates backend command failures.
    fn is_working_tree_clean(&self) -> BoxFuture<'_, Result<bool>>;

    /// References matching `filters` (all references when empty), in
    /// backend order.
    ///
    /// # Errors
    ///
    /// Propagates backend command failures and unparseable listings.
    fn list_references<'a>(
        &'a self,
        filters: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<SnapshotReference>>>;

    /// The reference currently checked out.
    ///
    /// # Errors
    ///
    /// Propagates backend command failures.
    fn current_head(&self) -> BoxFuture<'_, Result<SnapshotReference>>;

    /// Check out `reference` into the working tree.
    ///
    /// # Errors
    ///
    /// Propagates backend command failures.
    fn checkout<'a>(&'a self, reference: &'a SnapshotReference) -> BoxFuture<'a, Result<()>>;

    /// Delete references, honouring the active-reference guard
    /// ([`deletable_references`]). Returns the references submitted for
    /// deletion; in dry-run mode nothing is removed but the same list is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProtectedResource`] when the only target is
    /// active, [`AppError::Validation`] when `refs` is empty, or backend
    /// command failures.
    fn delete_references<'a>(
        &'a self,
        refs: &'a [SnapshotReference],
    ) -> BoxFuture<'a, Result<Vec<SnapshotReference>>>;
}

/// Apply the active-reference guard to a deletion batch.
///
/// Returns the references that may be deleted and the names of active
/// references that were skipped.
///
/// # Errors
///
/// - `AppError::Validation` if `refs` is empty.
/// - `AppError::ProtectedResource` if the batch is a single active reference.
pub fn deletable_references(
    refs: &[SnapshotReference],
) -> Result<(Vec<&SnapshotReference>, Vec<&str>)> {
    match refs {
        [] => Err(AppError::Validation(
            "must specify at least one snapshot to delete".into(),
        )),
        [only] if only.is_active => Err(AppError::ProtectedResource(format!(
            "active snapshot {} cannot be deleted",
            only.name
        ))),
        _ => {
            let (active, deletable): (Vec<&SnapshotReference>, Vec<&SnapshotReference>) =
                refs.iter().partition(|r| r.is_active);
            Ok((deletable, active.iter().map(|r| r.name.as_str()).collect()))
        }
    }
}
