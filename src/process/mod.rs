//! Game server process supervision.
//!
//! The server is an opaque child process driven through its stdio:
//! commands are written to stdin as lines, and every stdout/stderr line is
//! echoed to the console. One consumer at a time may additionally tap the
//! output through a bounded subscription channel.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `reader`: per-stream read task feeding lines to the supervisor.
//! - `supervisor`: [`ProcessSupervisor`], the production [`ProcessHandle`].

pub mod codec;
pub mod reader;
pub mod supervisor;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

pub use supervisor::ProcessSupervisor;

use crate::Result;

/// Receiving end of an output subscription. The channel closes when the
/// subscription ends or the server exits.
pub type OutputReceiver = mpsc::Receiver<String>;

/// Which of the server's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output; the only stream kept in history.
    Primary,
    /// Standard error.
    Secondary,
}

/// A retained line of primary server output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Full, untruncated line text.
    pub line: String,
    /// When the supervisor read the line.
    pub at: DateTime<Local>,
}

/// Run state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No process has been launched yet.
    NotStarted,
    /// The OS process exists and has not reported termination.
    Running,
    /// The last launched process has terminated.
    Exited,
}

/// Launch parameters for the server process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Resolved executable path.
    pub executable: PathBuf,
    /// Directory the process starts in.
    pub working_dir: PathBuf,
}

/// Narrow interface to the server process used by the snapshot
/// coordinator and the shell commands.
pub trait ProcessHandle: Send + Sync {
    /// Launch the process and start its output readers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::State`](crate::AppError::State) if already running,
    /// or [`AppError::ExternalCommand`](crate::AppError::ExternalCommand) if
    /// the spawn fails.
    fn start<'a>(&'a self, launch: &'a LaunchSpec) -> BoxFuture<'a, Result<()>>;

    /// Write one line (plus the platform terminator) to the process's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::State`](crate::AppError::State) if the process is
    /// not running, or [`AppError::Io`](crate::AppError::Io) if the write fails.
    fn send_input<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Open the single output subscription.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::State`](crate::AppError::State) if another
    /// subscription is active.
    fn start_read_output(&self) -> Result<OutputReceiver>;

    /// Close the current subscription, releasing a consumer blocked on it.
    /// A no-op when nothing is subscribed.
    fn end_read_output(&self);

    /// Whether the OS process exists and has not terminated.
    fn is_running(&self) -> bool;

    /// Terminate the process. Succeeds without effect when not running.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Timeout`](crate::AppError::Timeout) if the process
    /// does not report exit after being killed.
    fn kill(&self) -> BoxFuture<'_, Result<()>>;
}
