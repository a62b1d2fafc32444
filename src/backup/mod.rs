//! Snapshot coordination.
//!
//! [`SnapshotCoordinator`] serialises every snapshot-store operation behind
//! one lock, runs the quiesce handshake with a live server before taking a
//! snapshot, and drives periodic saves from a background task.
//!
//! Submodules:
//! - `coordinator`: the operations (save, restore, list, clean, delete,
//!   prune, set period).
//! - `handshake`: `save hold` / `save query` polling until the server
//!   reports its files are ready to copy.
//! - `retention`: pure selection of periodic snapshots to prune.
//! - `scheduler`: the periodic timer loop and its interval channel.

pub mod coordinator;
pub mod handshake;
pub mod retention;
pub mod scheduler;

pub use coordinator::{SaveOutcome, SnapshotCoordinator};
pub use retention::select_for_pruning;
pub use scheduler::PeriodicSchedule;

/// Pauses world writes on the server.
pub const SAVE_HOLD: &str = "save hold";

/// Asks the server whether the paused save is ready to copy.
pub const SAVE_QUERY: &str = "save query";

/// Resumes world writes on the server.
pub const SAVE_RESUME: &str = "save resume";

/// Output fragment the server prints once files are safe to copy.
pub const READY_MARKER: &str = "Data saved. Files are now ready to be copied";

/// Message recorded on timer-driven snapshots.
pub const PERIODIC_MESSAGE: &str = "Automatic periodic backup";

/// Message recorded on the safety snapshot taken by `clean`.
pub const CLEAN_MESSAGE: &str = "Saving for cleaning";
