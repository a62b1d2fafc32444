#![forbid(unsafe_code)]

//! `bedrock-warden`: game server supervisor binary.
//!
//! Loads configuration, resolves the server executable, wires the process
//! supervisor, the git snapshot store and the snapshot coordinator, starts
//! the periodic backup loop and hands stdin to the operator shell.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bedrock_warden::backup::SnapshotCoordinator;
use bedrock_warden::config::{resolve_executable, GlobalConfig};
use bedrock_warden::console::Console;
use bedrock_warden::duration::parse_duration;
use bedrock_warden::process::{LaunchSpec, ProcessHandle, ProcessSupervisor};
use bedrock_warden::shell::{builtin_registry, run_shell, ShellContext};
use bedrock_warden::vcs::git::GitClient;
use bedrock_warden::vcs::VersionControlClient;
use bedrock_warden::{AppError, Result};

const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "bedrock-warden", about = "Game server supervisor with git-backed world snapshots", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Diagnostic log format on stderr (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override `[server].executable`.
    #[arg(long)]
    server_exe: Option<PathBuf>,

    /// Override `[git].workspace`.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Override `[backup].interval_seconds`, e.g. `30m`; `0` disables.
    #[arg(long)]
    backup_interval: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("bedrock-warden bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    // A pending stdin read holds a blocking thread that never finishes.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    let console = Console::stdout();

    let executable = resolve_executable(&config.server.executable)?;
    let working_dir = config.server_working_dir(&executable);
    let workspace = config.git_workspace(&working_dir);
    info!(
        executable = %executable.display(),
        working_dir = %working_dir.display(),
        workspace = %workspace.display(),
        "configuration loaded"
    );

    let process: Arc<dyn ProcessHandle> =
        Arc::new(ProcessSupervisor::from_config(console.clone(), &config.server));
    let vcs: Arc<dyn VersionControlClient> = Arc::new(GitClient::from_config(
        &config.git,
        workspace,
        console.clone(),
    ));
    let coordinator = Arc::new(SnapshotCoordinator::new(
        Arc::clone(&process),
        Arc::clone(&vcs),
        console.clone(),
        &config.backup,
    ));

    let ct = CancellationToken::new();
    let periodic_handle = coordinator.spawn_periodic(ct.clone());

    let ctx = ShellContext {
        process: Arc::clone(&process),
        vcs,
        coordinator,
        console,
        launch: LaunchSpec {
            executable,
            working_dir,
        },
        server: config.server.clone(),
    };
    let registry = builtin_registry();

    let shell_ct = ct.clone();
    tokio::select! {
        result = run_shell(&registry, &ctx, BufReader::new(tokio::io::stdin()), shell_ct) => {
            if let Err(err) = result {
                error!(%err, "shell input failed");
            }
        }
        () = shutdown_signal() => info!("shutdown signal received"),
    }
    ct.cancel();

    if let Err(err) = process.kill().await {
        warn!(%err, "server did not stop cleanly");
    }
    if let Err(err) = periodic_handle.await {
        error!(%err, "periodic backup task panicked");
    }
    info!("bedrock-warden shut down");
    Ok(())
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };

    if let Some(exe) = &args.server_exe {
        config.server.executable.clone_from(exe);
    }
    if let Some(ws) = &args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.git.workspace = Some(canonical);
    }
    if let Some(interval) = &args.backup_interval {
        config.backup.set_interval(parse_duration(interval)?)?;
    }

    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    error!(%err, "ctrl-c signal handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
