use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use evolve_config::{DirtyTreePolicy, SnapshotsConfig};
use evolve_core::GitContext;
use evolve_governance::{GovernanceError, SnapshotManager, SnapshotOptions, SnapshotStatus};
use tempfile::tempdir;

fn options(workspace: &Path) -> SnapshotOptions {
    SnapshotOptions::from_config(workspace, &SnapshotsConfig::default())
}

#[test]
fn rollback_restores_snapshot_tree_and_records_restoration() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("guide.md"), "version one\n")?;
    commit_all(workspace, "docs: guide v1")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let snapshot = manager.create("before q1", Some("Pre-evolution baseline"))?;
    assert!(snapshot.id.starts_with("evolution-"));
    assert!(snapshot.id.ends_with("-before-q1"));
    assert_eq!(snapshot.status(), SnapshotStatus::Created);

    fs::write(workspace.join("guide.md"), "version two\n")?;
    commit_all(workspace, "docs: guide v2")?;

    let mut asked = false;
    let outcome = manager.rollback(&snapshot.id, false, |_| {
        asked = true;
        true
    })?;
    assert!(asked);
    assert_eq!(fs::read_to_string(workspace.join("guide.md"))?, "version one\n");
    assert_eq!(run_git(workspace, &["rev-parse", "HEAD^{tree}"])?, snapshot.tree);

    let marker = outcome.marker_commit.ok_or("marker commit")?;
    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, marker);
    assert_eq!(
        run_git(workspace, &["rev-parse", &format!("{marker}^")])?,
        snapshot.commit
    );
    let subject = run_git(workspace, &["log", "-1", "--format=%s", &marker])?;
    assert_eq!(
        subject,
        format!("rollback: restored from snapshot {}", snapshot.id)
    );

    let stored = manager.show(&snapshot.id)?;
    assert_eq!(stored.status(), SnapshotStatus::RestoredFrom);
    assert_eq!(stored.restorations.len(), 1);
    Ok(())
}

#[test]
fn duplicate_label_is_rejected() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "a\n")?;
    commit_all(workspace, "docs: a")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let first = manager.create("baseline", None)?;

    let err = manager
        .create("baseline", None)
        .err()
        .ok_or("duplicate label should fail")?;
    assert!(matches!(
        err,
        GovernanceError::DuplicateSnapshot { ref existing_id, .. } if *existing_id == first.id
    ));
    assert_eq!(manager.list()?.len(), 1);
    Ok(())
}

#[test]
fn dirty_tree_blocks_creation_unless_policy_warns() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "a\n")?;
    commit_all(workspace, "docs: a")?;
    fs::write(workspace.join("a.md"), "edited\n")?;
    fs::write(workspace.join("untracked.md"), "ignored by the dirty check\n")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let err = manager
        .create("blocked", None)
        .err()
        .ok_or("dirty tree should block")?;
    assert!(matches!(
        err,
        GovernanceError::DirtyWorkingState { ref paths } if paths == &vec!["a.md".to_owned()]
    ));
    assert!(manager.list()?.is_empty());

    let warn_options = SnapshotOptions {
        dirty_policy: DirtyTreePolicy::Warn,
        ..options(workspace)
    };
    let lenient = SnapshotManager::new(&context, warn_options);
    lenient.create("allowed", None)?;
    assert_eq!(lenient.list()?.len(), 1);
    Ok(())
}

#[test]
fn rollback_preconditions_fail_without_touching_the_tree() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "one\n")?;
    commit_all(workspace, "docs: one")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let snapshot = manager.create("one", None)?;
    fs::write(workspace.join("a.md"), "two\n")?;
    let head = commit_all(workspace, "docs: two")?;

    let err = manager
        .rollback("missing", true, |_| true)
        .err()
        .ok_or("unknown id")?;
    assert!(matches!(err, GovernanceError::SnapshotNotFound(_)));

    let err = manager
        .rollback(&snapshot.id, false, |_| false)
        .err()
        .ok_or("declined confirmation")?;
    assert!(matches!(err, GovernanceError::RollbackCancelled(_)));
    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, head);

    fs::write(workspace.join("a.md"), "uncommitted\n")?;
    let err = manager
        .rollback(&snapshot.id, true, |_| true)
        .err()
        .ok_or("dirty tree")?;
    assert!(matches!(err, GovernanceError::RollbackConflict { .. }));
    assert_eq!(fs::read_to_string(workspace.join("a.md"))?, "uncommitted\n");
    run_git(workspace, &["checkout", "--", "a.md"])?;

    run_git(workspace, &["tag", "-d", &snapshot.id])?;
    let err = manager
        .rollback(&snapshot.id, true, |_| true)
        .err()
        .ok_or("missing tag")?;
    assert!(matches!(err, GovernanceError::SnapshotReferenceMissing { .. }));
    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, head);
    Ok(())
}

#[test]
fn failed_marker_commit_leaves_head_and_metadata_alone() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "one\n")?;
    commit_all(workspace, "docs: one")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let snapshot = manager.create("baseline", None)?;
    fs::write(workspace.join("a.md"), "two\n")?;
    let head = commit_all(workspace, "docs: two")?;

    // An empty committer name makes every commit object write fail.
    run_git(workspace, &["config", "user.name", ""])?;
    let err = manager
        .rollback(&snapshot.id, true, |_| true)
        .err()
        .ok_or("rollback should fail without a committer identity")?;
    assert!(matches!(err, GovernanceError::Git(_)));

    assert_eq!(run_git(workspace, &["rev-parse", "HEAD"])?, head);
    assert_eq!(fs::read_to_string(workspace.join("a.md"))?, "two\n");
    let stored = manager.show(&snapshot.id)?;
    assert_eq!(stored.status(), SnapshotStatus::Created);
    assert!(stored.restorations.is_empty());
    Ok(())
}

#[test]
fn prune_keeps_newest_snapshots() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "a\n")?;
    commit_all(workspace, "docs: a")?;

    let context = GitContext::open(workspace)?;
    let manager = SnapshotManager::new(&context, options(workspace));
    let alpha = manager.create("alpha", None)?;
    let beta = manager.create("beta", None)?;
    let gamma = manager.create("gamma", None)?;

    let removed = manager.prune(1)?;
    assert_eq!(removed, vec![alpha.id.clone(), beta.id.clone()]);
    assert!(run_git(workspace, &["tag", "--list", &alpha.id])?.is_empty());

    let remaining = manager.list()?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, gamma.id);
    assert!(manager.prune(5)?.is_empty());
    Ok(())
}

fn run_git(workspace: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

fn init_git_repo(workspace: &Path) -> Result<(), Box<dyn Error>> {
    run_git(workspace, &["init"])?;
    run_git(workspace, &["config", "user.name", "Evolve Test"])?;
    run_git(workspace, &["config", "user.email", "evolve-test@example.com"])?;
    run_git(workspace, &["config", "commit.gpgsign", "false"])?;
    run_git(workspace, &["config", "tag.gpgsign", "false"])?;
    fs::write(workspace.join(".gitignore"), ".evolve/\n")?;
    Ok(())
}

fn commit_all(workspace: &Path, message: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;
    run_git(workspace, &["commit", "-m", message])?;
    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
