use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use evolve_config::SignalsConfig;
use evolve_core::{GitContext, TimeWindow};
use evolve_signals::{
    ADOPTION_FILE_NAME, PainTier, ReportTarget, ReportWriter, SUMMARY_FILE_NAME, SignalsAnalyzer,
    SignalsError,
};
use tempfile::tempdir;

const DAY: i64 = 24 * 60 * 60;
const BASE: i64 = 1_767_225_600; // 2026-01-01T00:00:00Z

#[test]
fn single_bugfix_commit_shows_up_in_all_three_reports() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("x.md"), "old line\n")?;
    commit_at(workspace, "docs: add x", BASE)?;
    fs::write(workspace.join("x.md"), "new line\n")?;
    commit_at(workspace, "fix: null pointer in parser", BASE + 10 * DAY)?;

    let context = GitContext::open(workspace)?;
    let config = SignalsConfig::default();
    let window = TimeWindow::between("2026-01-05", None, BASE + 20 * DAY)?;
    let report = SignalsAnalyzer::new(&context, &config).analyze(window)?;

    assert_eq!(report.metadata.commits_analyzed, 1);

    let adoption = report.adoption.file("x.md").ok_or("x.md adoption")?;
    assert_eq!((adoption.touches, adoption.authors), (1, 1));

    let churn = report.churn.file("x.md").ok_or("x.md churn")?;
    assert_eq!((churn.commits, churn.line_changes), (1, 2));

    let pain = report.pain.file("x.md").ok_or("x.md pain")?;
    assert_eq!(pain.bugfix_count, 1);
    assert_eq!(pain.pain_score, 1);
    assert_eq!(pain.tier, PainTier::Healthy);
    Ok(())
}

#[test]
fn untouched_tracked_commands_report_zero() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::create_dir_all(workspace.join("commands/core"))?;
    fs::write(workspace.join("commands/core/pb-idle.md"), "idle\n")?;
    commit_at(workspace, "docs: add idle command", BASE)?;
    fs::write(workspace.join("commands/core/pb-busy.md"), "busy\n")?;
    commit_at(workspace, "docs: add busy command", BASE + 30 * DAY)?;

    let context = GitContext::open(workspace)?;
    let config = SignalsConfig::default();
    let window = TimeWindow::since("7d", BASE + 31 * DAY)?;
    let report = SignalsAnalyzer::new(&context, &config).analyze(window)?;

    let idle = report.adoption.command("pb-idle").ok_or("pb-idle listed")?;
    assert_eq!(idle.touches, 0);
    assert_eq!(report.adoption.least_touched[0].command, "pb-idle");
    assert_eq!(report.adoption.most_touched[0].command, "pb-busy");

    let churn = report
        .churn
        .file("commands/core/pb-idle.md")
        .ok_or("idle churn")?;
    assert_eq!(churn.commits, 0);
    assert_eq!(churn.avg_change_per_commit, 0.0);

    let pain = report
        .pain
        .file("commands/core/pb-idle.md")
        .ok_or("idle pain")?;
    assert_eq!(pain.pain_score, 0);
    Ok(())
}

#[test]
fn narrower_window_never_reports_more_than_wider_window() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    for (index, days) in [0_i64, 15, 45, 80].into_iter().enumerate() {
        fs::write(workspace.join("guide.md"), format!("rev {index}\n"))?;
        commit_at(workspace, &format!("fix: revision {index}"), BASE + days * DAY)?;
    }

    let now = BASE + 90 * DAY;
    let context = GitContext::open(workspace)?;
    let config = SignalsConfig::default();
    let analyzer = SignalsAnalyzer::new(&context, &config);

    let narrow = analyzer.analyze(TimeWindow::since("2 months ago", now)?)?;
    let wide = analyzer.analyze(TimeWindow::since("all", now)?)?;

    assert_eq!(narrow.metadata.commits_analyzed, 2);
    assert_eq!(wide.metadata.commits_analyzed, 4);
    for file in &narrow.churn.files {
        let wider = wide.churn.file(&file.path).ok_or("file missing in wider window")?;
        assert!(file.commits <= wider.commits);
    }
    assert!(
        narrow.pain.file("guide.md").map(|file| file.pain_score)
            <= wide.pain.file("guide.md").map(|file| file.pain_score)
    );
    Ok(())
}

#[test]
fn excluded_paths_are_dropped_from_every_report() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;

    fs::write(workspace.join("Cargo.lock"), "lock\n")?;
    fs::write(workspace.join("notes.md"), "notes\n")?;
    commit_at(workspace, "hotfix: lockfile", BASE)?;

    let context = GitContext::open(workspace)?;
    let config = SignalsConfig {
        exclude_patterns: vec!["*.lock".to_owned()],
        ..SignalsConfig::default()
    };
    let report = SignalsAnalyzer::new(&context, &config).analyze(TimeWindow::all())?;

    assert!(report.churn.file("Cargo.lock").is_none());
    assert!(report.pain.file("Cargo.lock").is_none());
    assert_eq!(report.pain.file("notes.md").map(|file| file.hotfix_count), Some(1));
    Ok(())
}

#[test]
fn named_report_snapshot_is_never_silently_replaced() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_git_repo(workspace)?;
    fs::write(workspace.join("a.md"), "a\n")?;
    commit_at(workspace, "docs: a", BASE)?;

    let context = GitContext::open(workspace)?;
    let config = SignalsConfig::default();
    let report = SignalsAnalyzer::new(&context, &config).analyze(TimeWindow::all())?;

    let output = temp.path().join("signals-out");
    let writer = ReportWriter::new(&output);
    let target = ReportTarget::Snapshot {
        label: "2026-q1".to_owned(),
        overwrite: false,
    };

    let written = writer.write(&report, &target)?;
    assert!(written.directory.join(ADOPTION_FILE_NAME).exists());
    let original = fs::read_to_string(written.directory.join(SUMMARY_FILE_NAME))?;

    let err = writer
        .write(&report, &target)
        .err()
        .ok_or("second write should fail")?;
    assert!(matches!(err, SignalsError::SnapshotAlreadyExists { ref label, .. } if label == "2026-q1"));
    assert_eq!(
        fs::read_to_string(written.directory.join(SUMMARY_FILE_NAME))?,
        original
    );

    writer.write(&report, &ReportTarget::Latest)?;
    writer.write(&report, &ReportTarget::Latest)?;
    assert!(output.join("latest").join(SUMMARY_FILE_NAME).exists());
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
