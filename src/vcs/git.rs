//! Git-backed [`VersionControlClient`].
//!
//! Every operation shells out to the `git` executable inside the world
//! workspace. Output is captured (stdout followed by stderr) and never
//! printed directly; callers decide what reaches the console.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::GitConfig;
use crate::console::Console;
use crate::vcs::{deletable_references, SnapshotReference, VersionControlClient};
use crate::{AppError, Result};

/// Field separator for `git branch --format` (ASCII unit separator).
const FIELD_SEPARATOR: char = '\u{1f}';

/// `git branch` format producing one record per reference:
/// name, short id, subject, ISO-8601 date, relative date, HEAD marker.
const BRANCH_FORMAT: &str = "--format=%(refname:short)%1f%(objectname:short)%1f%(contents:subject)%1f%(committerdate:iso-strict)%1f%(committerdate:relative)%1f%(HEAD)";

/// Git command adapter rooted at a workspace directory.
#[derive(Debug, Clone)]
pub struct GitClient {
    executable: PathBuf,
    workspace: PathBuf,
    command_timeout: Duration,
    dry_run: bool,
    console: Console,
}

impl GitClient {
    /// Create a client for `workspace`.
    #[must_use]
    pub fn new(
        executable: PathBuf,
        workspace: PathBuf,
        command_timeout: Duration,
        dry_run: bool,
        console: Console,
    ) -> Self {
        info!(git = %executable.display(), root = %workspace.display(), dry_run, "git client ready");
        Self {
            executable,
            workspace,
            command_timeout,
            dry_run,
            console,
        }
    }

    /// Create a client from the `[git]` configuration section.
    #[must_use]
    pub fn from_config(config: &GitConfig, workspace: PathBuf, console: Console) -> Self {
        Self::new(
            config.executable.clone(),
            workspace,
            config.command_timeout(),
            config.dry_run,
            console,
        )
    }

    /// Workspace the client operates in.
    #[must_use]
    pub fn workspace(&self) -> &std::path::Path {
        &self.workspace
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let rendered = args.join(" ");
        debug!(args = %rendered, "running git");

        let mut cmd = Command::new(&self.executable);
        cmd.args(args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::ExternalCommand(format!(
                "failed to run {} {rendered}: {err}",
                self.executable.display()
            ))
        })?;

        let output = tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "git {rendered} did not finish within {:?}",
                    self.command_timeout
                ))
            })?
            .map_err(|err| AppError::ExternalCommand(format!("git {rendered}: {err}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            debug!(args = %rendered, status = %output.status, output = %combined, "git command failed");
            Err(AppError::ExternalCommand(format!(
                "git {rendered} exited with {}: {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |c| format!("code {c}")),
                combined.trim()
            )))
        }
    }

    async fn list(&self, filters: &[String]) -> Result<Vec<SnapshotReference>> {
        let mut args = vec!["branch", "--list", BRANCH_FORMAT];
        args.extend(filters.iter().map(String::as_str));
        let out = self.run(&args).await?;
        parse_branch_listing(&out)
    }

    async fn head(&self) -> Result<SnapshotReference> {
        match self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await {
            Ok(out) => {
                let name = out.trim().to_owned();
                let listed = self.list(std::slice::from_ref(&name)).await?;
                Ok(listed
                    .into_iter()
                    .find(|r| r.name == name)
                    .unwrap_or_else(|| SnapshotReference {
                        is_active: true,
                        ..SnapshotReference::named(name)
                    }))
            }
            Err(AppError::ExternalCommand(_)) => {
                let id = self.run(&["rev-parse", "--short", "HEAD"]).await?;
                let id = id.trim().to_owned();
                Ok(SnapshotReference {
                    is_active: true,
                    content_id: id.clone(),
                    ..SnapshotReference::named(id)
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, refs: &[SnapshotReference]) -> Result<Vec<SnapshotReference>> {
        let (deletable, skipped) = deletable_references(refs)?;
        for name in skipped {
            self.console
                .log(format!("active snapshot '{name}' cannot be deleted, skipping"));
        }
        let deletable: Vec<SnapshotReference> = deletable.into_iter().cloned().collect();
        if deletable.is_empty() {
            return Ok(deletable);
        }

        let listing: Vec<String> = deletable.iter().map(ToString::to_string).collect();
        self.console.log(format!(
            "deleting the following snapshots:\n{}",
            listing.join("\n")
        ));

        if self.dry_run {
            self.console
                .log("*** dry run only. deletion not performed ***");
            return Ok(deletable);
        }

        let mut args = vec!["branch", "-D"];
        args.extend(deletable.iter().map(|r| r.name.as_str()));
        self.run(&args).await.map_err(|err| {
            self.console.log(format!("snapshot deletion failed. {err}"));
            err
        })?;
        Ok(deletable)
    }
}

impl VersionControlClient for GitClient {
    fn run_command<'a>(&'a self, args: &'a [&'a str]) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.run(args))
    }

    fn is_working_tree_clean(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let out = self.run(&["status", "--porcelain"]).await?;
            debug!(status = %out, "git status");
            Ok(out.trim().is_empty())
        })
    }

    fn list_references<'a>(
        &'a self,
        filters: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<SnapshotReference>>> {
        Box::pin(self.list(filters))
    }

    fn current_head(&self) -> BoxFuture<'_, Result<SnapshotReference>> {
        Box::pin(self.head())
    }

    fn checkout<'a>(&'a self, reference: &'a SnapshotReference) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.run(&["checkout", reference.name.as_str()]).await?;
            Ok(())
        })
    }

    fn delete_references<'a>(
        &'a self,
        refs: &'a [SnapshotReference],
    ) -> BoxFuture<'a, Result<Vec<SnapshotReference>>> {
        Box::pin(self.delete(refs))
    }
}

/// Parse the output of `git branch --list` run with [`BRANCH_FORMAT`].
///
/// # Errors
///
/// Returns `AppError::ExternalCommand` if a record has the wrong number of
/// fields or an unparseable date.
pub fn parse_branch_listing(out: &str) -> Result<Vec<SnapshotReference>> {
    out.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_branch_record)
        .collect()
}

fn parse_branch_record(line: &str) -> Result<SnapshotReference> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    let [name, content_id, subject, date, relative, head] = fields.as_slice() else {
        return Err(AppError::ExternalCommand(format!(
            "unexpected branch listing record: {line:?}"
        )));
    };

    let created_at = DateTime::parse_from_rfc3339(date)
        .map_err(|err| {
            AppError::ExternalCommand(format!("invalid commit date {date:?} from git: {err}"))
        })?
        .with_timezone(&Utc);

    Ok(SnapshotReference {
        name: (*name).to_owned(),
        is_active: *head == "*",
        content_id: (*content_id).to_owned(),
        subject: (*subject).to_owned(),
        created_at,
        created_at_relative: (*relative).to_owned(),
    })
}
