//! Global configuration parsing, validation, and executable resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::duration::format_duration;
use crate::{AppError, Result};

/// Settings for the supervised game server process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    /// Server executable; relative names are resolved against the current
    /// directory and then `PATH`.
    pub executable: PathBuf,
    /// Working directory for the server; defaults to the executable's directory.
    pub working_dir: Option<PathBuf>,
    /// Console truncation limit for a single output line (characters).
    pub output_line_limit: usize,
    /// Number of primary-stream output lines retained in memory.
    pub history_limit: usize,
    /// Queue depth of the output subscription channel.
    pub subscriber_capacity: usize,
    /// Longest time an output line waits for a slow subscriber before being dropped.
    pub subscriber_send_timeout_ms: u64,
    /// Time allowed for the server to report that it finished starting.
    pub startup_timeout_seconds: u64,
    /// Output text that signals startup progress.
    pub startup_marker: String,
    /// Number of marker occurrences that mean the server is fully up.
    pub startup_marker_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(default_server_executable()),
            working_dir: None,
            output_line_limit: 100,
            history_limit: 1000,
            subscriber_capacity: 64,
            subscriber_send_timeout_ms: 100,
            startup_timeout_seconds: 120,
            startup_marker: "IPv6 supported, port:".into(),
            startup_marker_count: 2,
        }
    }
}

impl ServerConfig {
    /// Subscriber delivery timeout as a [`Duration`].
    #[must_use]
    pub fn subscriber_send_timeout(&self) -> Duration {
        Duration::from_millis(self.subscriber_send_timeout_ms)
    }

    /// Startup wait as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }
}

fn default_server_executable() -> &'static str {
    if cfg!(windows) {
        "bedrock_server.exe"
    } else {
        "bedrock_server"
    }
}

/// Settings for the git snapshot store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct GitConfig {
    /// Git executable name or path.
    pub executable: PathBuf,
    /// Repository root holding the world files; defaults to the server working directory.
    pub workspace: Option<PathBuf>,
    /// Upper bound for a single git invocation.
    pub command_timeout_seconds: u64,
    /// Log deletions instead of performing them.
    pub dry_run: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("git"),
            workspace: None,
            command_timeout_seconds: 30,
            dry_run: false,
        }
    }
}

impl GitConfig {
    /// Per-command timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

/// Snapshot scheduling and handshake timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct BackupConfig {
    /// Periodic backup interval; 0 disables periodic saves.
    pub interval_seconds: u64,
    /// Deadline for the server to acknowledge `save hold`.
    pub save_timeout_seconds: u64,
    /// Pause between `save hold` and the first poll.
    pub hold_grace_ms: u64,
    /// Pause between `save query` polls.
    pub poll_interval_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 1800,
            save_timeout_seconds: 30,
            hold_grace_ms: 250,
            poll_interval_ms: 500,
        }
    }
}

impl BackupConfig {
    /// Periodic interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Set the periodic interval from a parsed duration.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` for a non-zero interval under one second or
    /// one with a fractional second.
    pub fn set_interval(&mut self, interval: Duration) -> Result<()> {
        if !interval.is_zero() && interval < Duration::from_secs(1) {
            return Err(AppError::Validation(format!(
                "backup interval must be 0 or at least 1s, got {}",
                format_duration(interval)
            )));
        }
        if interval.subsec_nanos() != 0 {
            return Err(AppError::Validation(format!(
                "backup interval must be a whole number of seconds, got {}",
                format_duration(interval)
            )));
        }
        self.interval_seconds = interval.as_secs();
        Ok(())
    }

    /// Handshake deadline as a [`Duration`].
    #[must_use]
    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_seconds)
    }

    /// Grace period after `save hold` as a [`Duration`].
    #[must_use]
    pub fn hold_grace(&self) -> Duration {
        Duration::from_millis(self.hold_grace_ms)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Global configuration parsed from `warden.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Server process settings.
    pub server: ServerConfig,
    /// Git store settings.
    pub git: GitConfig,
    /// Backup timing settings.
    pub backup: BackupConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric bounds that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.server.output_line_limit == 0 {
            return Err(AppError::Config(
                "server.output_line_limit must be greater than zero".into(),
            ));
        }
        if self.server.subscriber_capacity == 0 {
            return Err(AppError::Config(
                "server.subscriber_capacity must be greater than zero".into(),
            ));
        }
        if self.server.startup_marker_count == 0 {
            return Err(AppError::Config(
                "server.startup_marker_count must be greater than zero".into(),
            ));
        }
        if self.backup.save_timeout_seconds == 0 {
            return Err(AppError::Config(
                "backup.save_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.backup.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "backup.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.git.command_timeout_seconds == 0 {
            return Err(AppError::Config(
                "git.command_timeout_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Directory the server runs in: the configured working directory, else
    /// the directory holding the executable.
    #[must_use]
    pub fn server_working_dir(&self, resolved_executable: &Path) -> PathBuf {
        self.server.working_dir.clone().unwrap_or_else(|| {
            resolved_executable
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        })
    }

    /// Repository root for snapshots: `[git].workspace`, else the server directory.
    #[must_use]
    pub fn git_workspace(&self, server_dir: &Path) -> PathBuf {
        self.git
            .workspace
            .clone()
            .unwrap_or_else(|| server_dir.to_path_buf())
    }
}

/// Resolve an executable the way the operator expects: absolute paths as
/// given, then the current directory, then every `PATH` entry.
///
/// # Errors
///
/// Returns `AppError::Config` if no matching file exists.
pub fn resolve_executable(name: &Path) -> Result<PathBuf> {
    if name.is_absolute() {
        return if name.is_file() {
            Ok(name.to_path_buf())
        } else {
            Err(AppError::Config(format!(
                "executable {} not found",
                name.display()
            )))
        };
    }

    let local = env::current_dir()
        .map_err(|err| AppError::Config(format!("cannot read current directory: {err}")))?
        .join(name);
    if local.is_file() {
        return Ok(local);
    }

    if name.components().count() == 1 {
        if let Some(paths) = env::var_os("PATH") {
            for dir in env::split_paths(&paths) {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }

    Err(AppError::Config(format!(
        "executable {} not found in current directory or PATH",
        name.display()
    )))
}
