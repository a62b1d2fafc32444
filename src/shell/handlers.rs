//! Built-in shell commands.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::info;

use crate::backup::{SaveOutcome, SnapshotCoordinator};
use crate::duration::{format_duration, parse_duration};
use crate::process::OutputReceiver;
use crate::shell::registry::{CommandHandler, CommandRegistry, Flow};
use crate::shell::ShellContext;
use crate::vcs::SnapshotKind;
use crate::{AppError, Result};

/// Message used by `backup save` without arguments.
pub const DEFAULT_SAVE_MESSAGE: &str = "Manual save";

const HELP_TEXT: &str = "\
commands:
  start                        start the server and wait until it is up
  stop                         stop the server
  status                       show server, workspace and backup state
  server LINE...         (@)   send a line to the server console
  shell PROGRAM ARGS...  ($)   run a program and show its output
  backup save [MESSAGE...]     (bs)  snapshot the workspace
  backup restore NAME          (br)  check out a snapshot
  backup list [FILTER...]      (bl)  list snapshots
  backup period INTERVAL       (bp)  set the periodic interval, 0 disables
  backup delete FILTER...      (bd)  delete snapshots
  backup prune CUTOFF RETAIN   (bpr) thin periodic snapshots older than CUTOFF
  backup clean                 (wc)  discard unsaved changes, keeping a temp snapshot
  help                   (h)   show this text
  exit                   (e q quit) stop the server and leave";

/// Registry with every built-in command and alias.
#[must_use]
pub fn builtin_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register("backup", Arc::new(BackupCommand));
    registry.register("start", Arc::new(StartCommand));
    registry.register("stop", Arc::new(StopCommand));
    registry.register("status", Arc::new(StatusCommand));
    registry.register("server", Arc::new(ServerCommand));
    registry.register("shell", Arc::new(ShellCommand));
    registry.register("help", Arc::new(HelpCommand));
    registry.register("exit", Arc::new(ExitCommand));

    for (alias, expansion) in [
        ("bs", "backup save"),
        ("br", "backup restore"),
        ("bl", "backup list"),
        ("bp", "backup period"),
        ("bd", "backup delete"),
        ("bpr", "backup prune"),
        ("wc", "backup clean"),
        ("h", "help"),
        ("e", "exit"),
        ("q", "exit"),
        ("quit", "exit"),
        ("s", "status"),
        ("$", "shell"),
        ("@", "server"),
    ] {
        registry.alias(alias, expansion);
    }
    registry
}

struct BackupCommand;

impl CommandHandler for BackupCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            let coordinator: &SnapshotCoordinator = &ctx.coordinator;
            let Some((sub, rest)) = args.split_first() else {
                return Err(AppError::Validation(
                    "usage: backup save|restore|list|period|delete|prune|clean".into(),
                ));
            };

            match sub.as_str() {
                "save" => {
                    let message = if rest.is_empty() {
                        DEFAULT_SAVE_MESSAGE.to_owned()
                    } else {
                        rest.join(" ")
                    };
                    if let SaveOutcome::Created(name) =
                        coordinator.save(SnapshotKind::Manual, &message).await?
                    {
                        info!(snapshot = %name, "manual backup created");
                    }
                }
                "restore" => {
                    let [name] = rest else {
                        return Err(AppError::Validation("usage: backup restore NAME".into()));
                    };
                    coordinator.restore(name).await?;
                }
                "list" => {
                    coordinator.list(rest).await?;
                }
                "period" => {
                    let [interval] = rest else {
                        return Err(AppError::Validation(
                            "usage: backup period INTERVAL".into(),
                        ));
                    };
                    coordinator.set_period(parse_duration(interval)?).await?;
                }
                "delete" => {
                    coordinator.delete(rest).await?;
                }
                "prune" => {
                    let [cutoff, retain] = rest else {
                        return Err(AppError::Validation(
                            "usage: backup prune CUTOFF RETAIN".into(),
                        ));
                    };
                    coordinator
                        .prune(parse_duration(cutoff)?, parse_duration(retain)?)
                        .await?;
                }
                "clean" => coordinator.clean().await?,
                other => {
                    return Err(AppError::Validation(format!(
                        "unknown backup command '{other}'"
                    )));
                }
            }
            Ok(Flow::Continue)
        })
    }
}

struct StartCommand;

impl CommandHandler for StartCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, _args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            // Snapshot operations queue behind startup instead of failing on
            // the busy output subscription.
            ctx.coordinator
                .exclusive(async {
                    let mut output = ctx.process.start_read_output()?;
                    let result = async {
                        ctx.process.start(&ctx.launch).await?;
                        wait_for_startup(
                            &mut output,
                            &ctx.server.startup_marker,
                            ctx.server.startup_marker_count,
                            ctx.server.startup_timeout(),
                        )
                        .await
                    }
                    .await;
                    ctx.process.end_read_output();
                    result
                })
                .await?;

            ctx.console.log("server started");
            Ok(Flow::Continue)
        })
    }
}

/// Read server output until `marker` has been seen `count` times.
///
/// # Errors
///
/// - `AppError::Timeout` if `timeout` elapses first.
/// - `AppError::State` if the output ends first (the server exited).
pub async fn wait_for_startup(
    output: &mut OutputReceiver,
    marker: &str,
    count: usize,
    timeout: Duration,
) -> Result<()> {
    let watch = async {
        let mut seen = 0;
        while let Some(line) = output.recv().await {
            if line.contains(marker) {
                seen += 1;
                if seen >= count {
                    return Ok(());
                }
            }
        }
        Err(AppError::State(
            "server output ended before startup completed".into(),
        ))
    };

    tokio::time::timeout(timeout, watch).await.map_err(|_| {
        AppError::Timeout(format!(
            "server did not finish starting within {}",
            format_duration(timeout)
        ))
    })?
}

struct StopCommand;

impl CommandHandler for StopCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, _args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            if ctx.process.is_running() {
                ctx.process.kill().await?;
            } else {
                ctx.console.log("server is not running");
            }
            Ok(Flow::Continue)
        })
    }
}

struct StatusCommand;

impl CommandHandler for StatusCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, _args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            let server = if ctx.process.is_running() {
                "running"
            } else {
                "not running"
            };
            let workspace = if ctx.vcs.is_working_tree_clean().await? {
                "clean"
            } else {
                "dirty"
            };
            let interval = ctx.coordinator.interval();
            let backup = if interval.is_zero() {
                "disabled".to_owned()
            } else {
                format!("every {}", format_duration(interval))
            };
            ctx.console.log(format!(
                "server is {server}, workspace is {workspace}, periodic backup {backup}"
            ));
            Ok(Flow::Continue)
        })
    }
}

struct ServerCommand;

impl CommandHandler for ServerCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            if args.is_empty() {
                return Err(AppError::Validation("usage: server LINE...".into()));
            }
            ctx.process.send_input(&args.join(" ")).await?;
            Ok(Flow::Continue)
        })
    }
}

struct ShellCommand;

impl CommandHandler for ShellCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            let Some((program, rest)) = args.split_first() else {
                return Err(AppError::Validation("usage: shell PROGRAM ARGS...".into()));
            };

            let output = Command::new(program)
                .args(rest)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| AppError::ExternalCommand(format!("{program}: {err}")))?;

            for line in String::from_utf8_lossy(&output.stdout)
                .lines()
                .chain(String::from_utf8_lossy(&output.stderr).lines())
            {
                ctx.console.println(line);
            }

            if output.status.success() {
                Ok(Flow::Continue)
            } else {
                Err(AppError::ExternalCommand(format!(
                    "{program} exited with {}",
                    output.status
                )))
            }
        })
    }
}

struct HelpCommand;

impl CommandHandler for HelpCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, _args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            ctx.console.println(HELP_TEXT);
            Ok(Flow::Continue)
        })
    }
}

struct ExitCommand;

impl CommandHandler for ExitCommand {
    fn run<'a>(&'a self, ctx: &'a ShellContext, _args: &'a [String]) -> BoxFuture<'a, Result<Flow>> {
        Box::pin(async move {
            ctx.process.kill().await?;
            Ok(Flow::Exit)
        })
    }
}
