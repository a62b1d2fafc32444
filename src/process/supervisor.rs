//! Production [`ProcessHandle`] backed by `tokio::process`.
//!
//! Spawns the server with:
//! - piped stdin/stdout/stderr, one reader task per output stream;
//! - `kill_on_drop(true)` so the server never outlives the supervisor;
//! - an exit monitor task that waits for termination (or a kill request),
//!   drains the readers, closes any subscription, logs the exit status and
//!   only then marks the supervisor as exited.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::console::{line_ending, Console};
use crate::process::reader::{run_output_reader, HubSettings, OutputHub};
use crate::process::{
    LaunchSpec, OutputLine, OutputReceiver, OutputStream, ProcessHandle, ProcessState,
};
use crate::{AppError, Result};

/// How long `kill` waits for the exit monitor to confirm termination.
const KILL_WAIT: Duration = Duration::from_secs(10);

/// How long the exit monitor waits for readers to flush after exit.
const READER_DRAIN: Duration = Duration::from_secs(2);

enum Lifecycle {
    NotStarted,
    Running(RunningProcess),
    Exited,
}

struct RunningProcess {
    pid: Option<u32>,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    kill_switch: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// Owns the game server child process.
pub struct ProcessSupervisor {
    console: Console,
    hub: Arc<OutputHub>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor with no attached process.
    #[must_use]
    pub fn new(console: Console, settings: HubSettings) -> Self {
        Self {
            hub: Arc::new(OutputHub::new(console.clone(), settings)),
            console,
            lifecycle: Arc::new(Mutex::new(Lifecycle::NotStarted)),
        }
    }

    /// Create a supervisor using the `[server]` configuration section.
    #[must_use]
    pub fn from_config(console: Console, config: &ServerConfig) -> Self {
        Self::new(
            console,
            HubSettings {
                line_limit: config.output_line_limit,
                history_limit: config.history_limit,
                subscriber_capacity: config.subscriber_capacity,
                send_timeout: config.subscriber_send_timeout(),
            },
        )
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        match *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
            Lifecycle::NotStarted => ProcessState::NotStarted,
            Lifecycle::Running(_) => ProcessState::Running,
            Lifecycle::Exited => ProcessState::Exited,
        }
    }

    /// OS process id of the running server, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &*self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
            Lifecycle::Running(running) => running.pid,
            _ => None,
        }
    }

    /// Retained primary-stream output, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<OutputLine> {
        self.hub.history()
    }

    fn spawn_process(&self, launch: &LaunchSpec) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*lifecycle, Lifecycle::Running(_)) {
            return Err(AppError::State("server is already running".into()));
        }

        let mut cmd = Command::new(&launch.executable);
        cmd.current_dir(&launch.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::ExternalCommand(format!(
                "unable to start server {}: {err}",
                launch.executable.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Io("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io("failed to capture server stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io("failed to capture server stderr".into()))?;

        let pid = child.id();
        let readers = [
            tokio::spawn(
                run_output_reader(OutputStream::Primary, stdout, Arc::clone(&self.hub))
                    .instrument(info_span!("server_stdout", pid)),
            ),
            tokio::spawn(
                run_output_reader(OutputStream::Secondary, stderr, Arc::clone(&self.hub))
                    .instrument(info_span!("server_stderr", pid)),
            ),
        ];

        let kill_switch = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(false);

        tokio::spawn(
            monitor_exit(ExitMonitor {
                child,
                readers,
                kill_switch: kill_switch.clone(),
                exit_tx,
                lifecycle: Arc::clone(&self.lifecycle),
                hub: Arc::clone(&self.hub),
                console: self.console.clone(),
            })
            .instrument(info_span!("server_exit_monitor", pid)),
        );

        *lifecycle = Lifecycle::Running(RunningProcess {
            pid,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            kill_switch,
            exited: exit_rx,
        });

        info!(
            pid = pid.unwrap_or(0),
            executable = %launch.executable.display(),
            working_dir = %launch.working_dir.display(),
            "server process spawned"
        );
        Ok(())
    }

    fn running_stdin(&self) -> Option<Arc<tokio::sync::Mutex<ChildStdin>>> {
        match &*self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
            Lifecycle::Running(running) => Some(Arc::clone(&running.stdin)),
            _ => None,
        }
    }
}

impl ProcessHandle for ProcessSupervisor {
    fn start<'a>(&'a self, launch: &'a LaunchSpec) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.spawn_process(launch) })
    }

    fn send_input<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let stdin = self.running_stdin().ok_or_else(|| {
                AppError::State("server not running. cannot send input".into())
            })?;

            self.console.log(format!(">{line}"));
            let payload = format!("{line}{}", line_ending());
            let mut stdin = stdin.lock().await;
            stdin.write_all(payload.as_bytes()).await.map_err(|err| {
                warn!(%err, "write to server stdin failed");
                AppError::Io(format!("unable to write to server: {err}"))
            })?;
            stdin
                .flush()
                .await
                .map_err(|err| AppError::Io(format!("unable to flush server input: {err}")))
        })
    }

    fn start_read_output(&self) -> Result<OutputReceiver> {
        self.hub.subscribe()
    }

    fn end_read_output(&self) {
        self.hub.unsubscribe();
    }

    fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    fn kill(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let handles = match &*self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) {
                Lifecycle::Running(running) => {
                    Some((running.kill_switch.clone(), running.exited.clone()))
                }
                _ => None,
            };
            let Some((kill_switch, mut exited)) = handles else {
                return Ok(());
            };

            info!("killing server");
            kill_switch.cancel();
            let confirmed = tokio::time::timeout(KILL_WAIT, exited.wait_for(|done| *done))
                .await
                .map(|waited| waited.is_ok());
            match confirmed {
                Ok(_) => Ok(()),
                Err(_elapsed) => Err(AppError::Timeout(format!(
                    "server did not exit within {KILL_WAIT:?} after kill"
                ))),
            }
        })
    }
}

struct ExitMonitor {
    child: Child,
    readers: [JoinHandle<()>; 2],
    kill_switch: CancellationToken,
    exit_tx: watch::Sender<bool>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    hub: Arc<OutputHub>,
    console: Console,
}

/// Wait for the server to terminate, then tear the session down in order:
/// drain readers, close the subscription, log the status, mark exited.
async fn monitor_exit(monitor: ExitMonitor) {
    let ExitMonitor {
        mut child,
        readers,
        kill_switch,
        exit_tx,
        lifecycle,
        hub,
        console,
    } = monitor;

    let status = tokio::select! {
        result = child.wait() => result,
        () = kill_switch.cancelled() => {
            if let Err(err) = child.start_kill() {
                warn!(%err, "failed to signal server process");
            }
            child.wait().await
        }
    };

    for reader in readers {
        if tokio::time::timeout(READER_DRAIN, reader).await.is_err() {
            warn!("output reader still busy after server exit");
        }
    }

    hub.unsubscribe();

    match status {
        Ok(status) if status.success() => console.log("server exited with success"),
        Ok(status) => console.log(format!("server exited with failure. {status}")),
        Err(err) => console.log(format!("server exited with failure. {err}")),
    }

    *lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Lifecycle::Exited;
    exit_tx.send_replace(true);
    info!("server exit processed");
}
