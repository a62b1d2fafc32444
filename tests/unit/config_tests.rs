//! Configuration defaults, parsing and validation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bedrock_warden::config::resolve_executable;
use bedrock_warden::{AppError, GlobalConfig};

#[test]
fn empty_document_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").unwrap();

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.server.output_line_limit, 100);
    assert_eq!(config.server.startup_marker, "IPv6 supported, port:");
    assert_eq!(config.server.startup_marker_count, 2);
    assert_eq!(config.git.executable, PathBuf::from("git"));
    assert!(!config.git.dry_run);
    assert_eq!(config.backup.interval(), Duration::from_secs(1800));
    assert_eq!(config.backup.save_timeout(), Duration::from_secs(30));
    assert_eq!(config.backup.hold_grace(), Duration::from_millis(250));
    assert_eq!(config.backup.poll_interval(), Duration::from_millis(500));
}

#[test]
fn sections_override_individual_fields() {
    let config = GlobalConfig::from_toml_str(
        r#"
[server]
executable = "/opt/bedrock/bedrock_server"
history_limit = 50

[git]
dry_run = true
command_timeout_seconds = 5

[backup]
interval_seconds = 0
"#,
    )
    .unwrap();

    assert_eq!(config.server.executable, PathBuf::from("/opt/bedrock/bedrock_server"));
    assert_eq!(config.server.history_limit, 50);
    assert_eq!(config.server.output_line_limit, 100);
    assert!(config.git.dry_run);
    assert_eq!(config.git.command_timeout(), Duration::from_secs(5));
    assert_eq!(config.backup.interval(), Duration::ZERO);
}

#[test]
fn zero_limits_are_rejected() {
    for raw in [
        "[server]\noutput_line_limit = 0",
        "[server]\nsubscriber_capacity = 0",
        "[backup]\nsave_timeout_seconds = 0",
        "[backup]\npoll_interval_ms = 0",
        "[git]\ncommand_timeout_seconds = 0",
    ] {
        assert!(
            matches!(GlobalConfig::from_toml_str(raw), Err(AppError::Config(_))),
            "{raw} should fail validation"
        );
    }
}

#[test]
fn malformed_toml_is_a_config_error() {
    assert!(matches!(
        GlobalConfig::from_toml_str("[backup]\ninterval_seconds = \"soon\""),
        Err(AppError::Config(_))
    ));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[backup]\ninterval_seconds = 600").unwrap();

    let config = GlobalConfig::load_from_path(file.path()).unwrap();
    assert_eq!(config.backup.interval_seconds, 600);

    assert!(matches!(
        GlobalConfig::load_from_path("/definitely/not/here.toml"),
        Err(AppError::Config(_))
    ));
}

#[test]
fn directories_default_to_the_executable_location() {
    let config = GlobalConfig::default();
    let exe = Path::new("/srv/bedrock/bedrock_server");

    let server_dir = config.server_working_dir(exe);
    assert_eq!(server_dir, PathBuf::from("/srv/bedrock"));
    assert_eq!(config.git_workspace(&server_dir), PathBuf::from("/srv/bedrock"));

    let mut explicit = GlobalConfig::default();
    explicit.server.working_dir = Some(PathBuf::from("/srv/run"));
    explicit.git.workspace = Some(PathBuf::from("/srv/worlds"));
    let server_dir = explicit.server_working_dir(exe);
    assert_eq!(server_dir, PathBuf::from("/srv/run"));
    assert_eq!(explicit.git_workspace(&server_dir), PathBuf::from("/srv/worlds"));
}

#[test]
fn resolves_absolute_paths_and_rejects_missing_ones() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert_eq!(resolve_executable(file.path()).unwrap(), file.path());

    assert!(matches!(
        resolve_executable(Path::new("/definitely/not/bedrock_server")),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        resolve_executable(Path::new("no-such-warden-binary-xyz")),
        Err(AppError::Config(_))
    ));
}

#[test]
fn interval_override_rejects_sub_second_values() {
    let mut backup = bedrock_warden::config::BackupConfig::default();

    let err = backup.set_interval(Duration::from_millis(500)).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    assert!(err.to_string().contains("at least 1s"));
    assert!(matches!(
        backup.set_interval(Duration::from_millis(1900)),
        Err(AppError::Validation(_))
    ));
    assert_eq!(backup.interval_seconds, 1800, "rejected values leave the interval alone");
}

#[test]
fn interval_override_accepts_zero_and_whole_seconds() {
    let mut backup = bedrock_warden::config::BackupConfig::default();

    backup
        .set_interval(bedrock_warden::duration::parse_duration("1h30m").unwrap())
        .unwrap();
    assert_eq!(backup.interval_seconds, 5400);

    backup.set_interval(Duration::ZERO).unwrap();
    assert_eq!(backup.interval(), Duration::ZERO);
}
