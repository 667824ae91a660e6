use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use evolve_core::{GitContext, GitError, TimeWindow};
use tempfile::tempdir;

const DAY: i64 = 24 * 60 * 60;
const BASE: i64 = 1_767_225_600; // 2026-01-01T00:00:00Z

#[test]
fn non_git_workspace_is_repository_unavailable() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let err = GitContext::open(temp.path())
        .err()
        .ok_or("expected open to fail")?;
    assert!(matches!(err, GitError::RepositoryUnavailable { .. }));
    Ok(())
}

#[test]
fn unborn_head_yields_empty_history() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    init_git_repo(temp.path())?;

    let context = GitContext::open(temp.path())?;
    assert!(context.head_commit_hash().is_none());
    assert!(context.collect_history(TimeWindow::all())?.is_empty());
    assert!(context.tracked_files()?.is_empty());
    Ok(())
}

#[test]
fn history_is_newest_first_with_numstat() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::create_dir_all(workspace.join("commands"))?;
    fs::write(workspace.join("commands/pb-start.md"), "one\ntwo\n")?;
    let first = commit_at(workspace, "docs: add start", BASE)?;

    fs::write(workspace.join("commands/pb-start.md"), "one\nthree\n")?;
    fs::write(workspace.join("logo.bin"), [0_u8, 159, 146, 150, 0, 1])?;
    let second = commit_at(workspace, "fix: null pointer in parser", BASE + DAY)?;

    let context = GitContext::open(workspace)?;
    let commits = context.collect_history(TimeWindow::all())?;

    let hashes: Vec<_> = commits.iter().map(|commit| commit.hash.as_str()).collect();
    assert_eq!(hashes, vec![second.as_str(), first.as_str()]);

    let latest = &commits[0];
    assert_eq!(latest.subject, "fix: null pointer in parser");
    assert_eq!(latest.author, "Evolve Test");
    assert_eq!(latest.timestamp, BASE + DAY);

    let start = latest
        .files
        .iter()
        .find(|file| file.path == "commands/pb-start.md")
        .ok_or("missing start change")?;
    assert_eq!((start.lines_added, start.lines_removed), (1, 1));

    let binary = latest
        .files
        .iter()
        .find(|file| file.path == "logo.bin")
        .ok_or("missing binary change")?;
    assert!(binary.binary);
    assert_eq!(binary.line_changes(), 0);

    assert_eq!(commits[1].files.len(), 1);
    assert_eq!(commits[1].files[0].lines_added, 2);
    Ok(())
}

#[test]
fn history_is_restartable_and_windows_nest() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    for (index, days) in [0_i64, 20, 40, 70, 100].into_iter().enumerate() {
        fs::write(workspace.join("notes.md"), format!("revision {index}\n"))?;
        commit_at(workspace, &format!("docs: revision {index}"), BASE + days * DAY)?;
    }

    let now = BASE + 100 * DAY;
    let context = GitContext::open(workspace)?;

    let narrow = context.history(TimeWindow::since("1 month ago", now)?);
    let first_pass: Vec<_> = narrow
        .iter()?
        .map(|commit| commit.map(|commit| commit.hash))
        .collect::<Result<_, _>>()?;
    let second_pass: Vec<_> = narrow
        .iter()?
        .map(|commit| commit.map(|commit| commit.hash))
        .collect::<Result<_, _>>()?;
    assert_eq!(first_pass, second_pass);
    assert_eq!(first_pass.len(), 2);

    let wide: BTreeSet<_> = context
        .collect_history(TimeWindow::since("3 months ago", now)?)?
        .into_iter()
        .map(|commit| commit.hash)
        .collect();
    assert_eq!(wide.len(), 4);
    assert!(first_pass.iter().all(|hash| wide.contains(hash)));

    let bounded = context.collect_history(TimeWindow::between(
        "2026-01-15",
        Some("2026-02-15"),
        now,
    )?)?;
    assert_eq!(bounded.len(), 2);
    Ok(())
}

#[test]
fn references_and_tree_reads() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("a.md"), "alpha\n")?;
    let first = commit_at(workspace, "add a", BASE)?;
    fs::write(workspace.join("b.md"), "beta\n")?;
    let second = commit_at(workspace, "add b", BASE + DAY)?;

    let context = GitContext::open(workspace)?;
    assert_eq!(context.resolve_commit("HEAD")?, second);
    assert!(matches!(
        context.resolve_commit("no-such-ref"),
        Err(GitError::ReferenceNotFound(reference)) if reference == "no-such-ref"
    ));

    assert_eq!(context.changed_paths(&first, &second)?, vec!["b.md"]);
    assert_eq!(context.file_at(&first, "b.md")?, None);
    assert_eq!(context.file_at(&second, "b.md")?.as_deref(), Some("beta\n"));
    assert_eq!(context.tracked_files()?, vec!["a.md", "b.md"]);

    assert!(!context.is_dirty()?);
    fs::write(workspace.join("untracked.md"), "ignored\n")?;
    assert!(!context.is_dirty()?);
    fs::write(workspace.join("a.md"), "changed\n")?;
    assert_eq!(context.dirty_paths()?, vec!["a.md"]);
    Ok(())
}

#[test]
fn merge_commits_carry_no_file_changes() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("base.md"), "base\n")?;
    commit_at(workspace, "docs: base", 1_700_000_000)?;
    let trunk = run_git(workspace, &["rev-parse", "--abbrev-ref", "HEAD"])?;

    run_git(workspace, &["checkout", "-b", "side"])?;
    fs::write(workspace.join("side.md"), "side\n")?;
    let side = commit_at(workspace, "docs: side", 1_700_000_100)?;
    run_git(workspace, &["checkout", &trunk])?;
    fs::write(workspace.join("main.md"), "main\n")?;
    commit_at(workspace, "docs: main", 1_700_000_200)?;
    run_git(workspace, &["merge", "--no-ff", "--no-edit", "side"])?;
    let merge = run_git(workspace, &["rev-parse", "HEAD"])?;

    let context = GitContext::open(workspace)?;
    assert!(context.file_changes(&merge)?.is_empty());
    let side_files: Vec<String> = context
        .file_changes(&side)?
        .into_iter()
        .map(|change| change.path)
        .collect();
    assert_eq!(side_files, vec!["side.md".to_owned()]);
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
    Ok(())
}

fn commit_at(workspace: &Path, message: &str, timestamp: i64) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;

    let date = format!("{timestamp} +0000");
    let output = Command::new("git")
        .args(["commit", "-m", message])
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git commit failed: {}", stderr.trim()).into());
    }

    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
