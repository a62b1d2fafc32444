//! Interactive operator shell.
//!
//! Lines are read from an async reader (stdin in production), expanded
//! through the alias table and dispatched to a [`CommandHandler`]. Errors
//! are reported on the console and never end the session; only `exit`,
//! end of input or cancellation do.

pub mod handlers;
pub mod registry;

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use handlers::builtin_registry;
pub use registry::{CommandHandler, CommandRegistry, Flow};

use crate::backup::SnapshotCoordinator;
use crate::config::ServerConfig;
use crate::console::Console;
use crate::process::{LaunchSpec, ProcessHandle};
use crate::vcs::VersionControlClient;
use crate::Result;

/// Prompt printed before each input line.
pub const PROMPT: &str = "> ";

/// Everything a command handler may touch.
pub struct ShellContext {
    /// Supervised server.
    pub process: Arc<dyn ProcessHandle>,
    /// Snapshot store.
    pub vcs: Arc<dyn VersionControlClient>,
    /// Snapshot operations.
    pub coordinator: Arc<SnapshotCoordinator>,
    /// Operator console.
    pub console: Console,
    /// How `start` launches the server.
    pub launch: LaunchSpec,
    /// Startup marker settings.
    pub server: ServerConfig,
}

impl std::fmt::Debug for ShellContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellContext")
            .field("launch", &self.launch)
            .finish_non_exhaustive()
    }
}

/// Read and dispatch commands until `exit`, end of input, or `cancel`.
///
/// # Errors
///
/// Returns `AppError::Io` if reading the input fails.
pub async fn run_shell<R>(
    registry: &CommandRegistry,
    ctx: &ShellContext,
    input: R,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        ctx.console.print(PROMPT);
        let next = tokio::select! {
            () = cancel.cancelled() => {
                info!("shell cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = next else {
            info!("shell input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if registry.dispatch(ctx, &line).await == Flow::Exit {
            break;
        }
    }
    Ok(())
}
