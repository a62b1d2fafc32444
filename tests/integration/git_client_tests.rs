//! `GitClient` against a throwaway repository. Skipped when `git` is not
//! installed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bedrock_warden::backup::{SaveOutcome, SnapshotCoordinator};
use bedrock_warden::config::{resolve_executable, BackupConfig};
use bedrock_warden::console::{CapturedOutput, Console};
use bedrock_warden::process::ProcessHandle;
use bedrock_warden::vcs::git::GitClient;
use bedrock_warden::vcs::{SnapshotKind, SnapshotReference, VersionControlClient};
use bedrock_warden::AppError;

use super::test_helpers::{CommandLog, FakeProcess};

async fn init_repo(root: &Path, dry_run: bool) -> Option<(Arc<GitClient>, CapturedOutput)> {
    let git = resolve_executable(Path::new("git")).ok()?;
    let (console, out) = Console::capture();
    let client = GitClient::new(
        git,
        root.to_path_buf(),
        Duration::from_secs(30),
        dry_run,
        console,
    );
    client.run_command(&["init", "--quiet"]).await.unwrap();
    client
        .run_command(&["config", "user.email", "warden@example.com"])
        .await
        .unwrap();
    client
        .run_command(&["config", "user.name", "Warden Test"])
        .await
        .unwrap();
    client
        .run_command(&["config", "commit.gpgsign", "false"])
        .await
        .unwrap();
    Some((Arc::new(client), out))
}

fn coordinator_over(vcs: &Arc<GitClient>) -> SnapshotCoordinator {
    let (console, _out) = Console::capture();
    let process: Arc<dyn ProcessHandle> = Arc::new(FakeProcess::new(CommandLog::default()));
    SnapshotCoordinator::new(
        process,
        Arc::clone(vcs) as Arc<dyn VersionControlClient>,
        console,
        &BackupConfig {
            interval_seconds: 0,
            ..BackupConfig::default()
        },
    )
}

#[tokio::test]
async fn save_list_and_clean_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let Some((git, _out)) = init_repo(dir.path(), false).await else {
        eprintln!("git not available, skipping");
        return;
    };
    let coordinator = coordinator_over(&git);
    let level = dir.path().join("level.dat");
    std::fs::write(&level, "spawn").unwrap();

    assert!(!git.is_working_tree_clean().await.unwrap());
    let SaveOutcome::Created(name) = coordinator
        .save(SnapshotKind::Manual, "first world")
        .await
        .unwrap()
    else {
        panic!("expected a snapshot");
    };
    assert!(git.is_working_tree_clean().await.unwrap());

    let refs = coordinator.list(&[]).await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, name);
    assert_eq!(refs[0].subject, "first world");
    assert!(refs[0].is_active);

    assert_eq!(
        coordinator.save(SnapshotKind::Manual, "again").await.unwrap(),
        SaveOutcome::Skipped
    );

    std::fs::write(&level, "griefed").unwrap();
    std::fs::write(dir.path().join("junk.txt"), "junk").unwrap();
    coordinator.clean().await.unwrap();

    assert_eq!(std::fs::read_to_string(&level).unwrap(), "spawn");
    assert!(!dir.path().join("junk.txt").exists());
    assert_eq!(git.current_head().await.unwrap().name, name);
    let temps = git
        .list_references(&[SnapshotKind::Temp.filter()])
        .await
        .unwrap();
    assert_eq!(temps.len(), 1);
    assert_eq!(temps[0].subject, "Saving for cleaning");
}

#[tokio::test]
async fn active_branch_is_protected_from_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let Some((git, out)) = init_repo(dir.path(), false).await else {
        eprintln!("git not available, skipping");
        return;
    };
    std::fs::write(dir.path().join("level.dat"), "spawn").unwrap();
    git.run_command(&["checkout", "--orphan", "saves/manual/one"])
        .await
        .unwrap();
    git.run_command(&["add", "-A"]).await.unwrap();
    git.run_command(&["commit", "--allow-empty", "-m", "one"])
        .await
        .unwrap();
    git.run_command(&["branch", "saves/manual/two"]).await.unwrap();

    let all = git.list_references(&[]).await.unwrap();
    assert_eq!(all.len(), 2);
    let active: Vec<SnapshotReference> = all.iter().filter(|r| r.is_active).cloned().collect();

    let err = git.delete_references(&active).await.unwrap_err();
    assert!(matches!(err, AppError::ProtectedResource(_)));

    let submitted = git.delete_references(&all).await.unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].name, "saves/manual/two");
    let left = git.list_references(&[]).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "saves/manual/one");
    assert!(out.contains("active snapshot 'saves/manual/one' cannot be deleted"));
}

#[tokio::test]
async fn dry_run_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let Some((git, out)) = init_repo(dir.path(), true).await else {
        eprintln!("git not available, skipping");
        return;
    };
    git.run_command(&["checkout", "--orphan", "saves/periodic/a"])
        .await
        .unwrap();
    git.run_command(&["commit", "--allow-empty", "-m", "a"])
        .await
        .unwrap();
    git.run_command(&["branch", "saves/periodic/b"]).await.unwrap();

    let b = git
        .list_references(&["saves/periodic/b".to_owned()])
        .await
        .unwrap();
    let submitted = git.delete_references(&b).await.unwrap();
    assert_eq!(submitted.len(), 1, "dry run reports what it would delete");

    assert_eq!(git.list_references(&[]).await.unwrap().len(), 2);
    assert!(out.contains("*** dry run only. deletion not performed ***"));
}

#[tokio::test]
async fn failing_command_reports_exit_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let Some((git, _out)) = init_repo(dir.path(), false).await else {
        eprintln!("git not available, skipping");
        return;
    };

    let err = git
        .run_command(&["checkout", "saves/manual/missing"])
        .await
        .unwrap_err();

    let AppError::ExternalCommand(msg) = err else {
        panic!("expected ExternalCommand, got {err:?}");
    };
    assert!(msg.contains("checkout saves/manual/missing"));
    assert!(msg.contains("code"));
}

#[tokio::test]
async fn coordinator_delete_reports_what_git_removed() {
    let dir = tempfile::tempdir().unwrap();
    let Some((git, out)) = init_repo(dir.path(), false).await else {
        eprintln!("git not available, skipping");
        return;
    };
    git.run_command(&["checkout", "--orphan", "saves/manual/keep"])
        .await
        .unwrap();
    git.run_command(&["commit", "--allow-empty", "-m", "keep"])
        .await
        .unwrap();
    git.run_command(&["branch", "saves/manual/old"]).await.unwrap();
    let coordinator = coordinator_over(&git);

    let deleted = coordinator
        .delete(&["saves/manual/*".to_owned()])
        .await
        .unwrap();

    let names: Vec<&str> = deleted.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["saves/manual/old"]);
    assert_eq!(out.contents().matches("cannot be deleted").count(), 1);
    assert_eq!(git.list_references(&[]).await.unwrap().len(), 1);
}
