use std::collections::BTreeMap;

use evolve_core::CommitRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChurn {
    pub path: String,
    pub commits: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub line_changes: u64,
    /// `line_changes / commits`, or 0 for a file without commits.
    pub avg_change_per_commit: f64,
    /// Commit frequency and line volume, each normalized to the busiest file.
    pub churn_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCommitCount {
    pub path: String,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLineChanges {
    pub path: String,
    pub line_changes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChurnReport {
    pub files: Vec<FileChurn>,
    pub high_churn: Vec<FileChurn>,
    pub files_by_commit_frequency: Vec<FileCommitCount>,
    pub files_by_line_changes: Vec<FileLineChanges>,
}

impl ChurnReport {
    pub fn file(&self, path: &str) -> Option<&FileChurn> {
        self.files.iter().find(|file| file.path == path)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChurnOptions<'a> {
    pub top_n: usize,
    pub known_files: &'a [String],
}

#[derive(Default)]
struct Totals {
    commits: u64,
    added: u64,
    removed: u64,
}

pub fn average_change_per_commit(line_changes: u64, commits: u64) -> f64 {
    if commits == 0 {
        return 0.0;
    }
    line_changes as f64 / commits as f64
}

pub fn extract_churn(commits: &[CommitRecord], options: &ChurnOptions<'_>) -> ChurnReport {
    let mut totals = BTreeMap::<String, Totals>::new();
    for path in options.known_files {
        totals.entry(path.clone()).or_default();
    }

    for commit in commits {
        for change in &commit.files {
            let entry = totals.entry(change.path.clone()).or_default();
            entry.commits += 1;
            entry.added = entry.added.saturating_add(change.lines_added);
            entry.removed = entry.removed.saturating_add(change.lines_removed);
        }
    }

    let max_commits = totals.values().map(|entry| entry.commits).max().unwrap_or(0);
    let max_lines = totals
        .values()
        .map(|entry| entry.added.saturating_add(entry.removed))
        .max()
        .unwrap_or(0);

    let files: Vec<FileChurn> = totals
        .into_iter()
        .map(|(path, entry)| {
            let line_changes = entry.added.saturating_add(entry.removed);
            FileChurn {
                path,
                commits: entry.commits,
                lines_added: entry.added,
                lines_removed: entry.removed,
                line_changes,
                avg_change_per_commit: average_change_per_commit(line_changes, entry.commits),
                churn_score: ratio(entry.commits, max_commits) + ratio(line_changes, max_lines),
            }
        })
        .collect();

    let mut high_churn: Vec<FileChurn> = files
        .iter()
        .filter(|file| file.commits > 0)
        .cloned()
        .collect();
    high_churn.sort_by(|left, right| {
        right
            .churn_score
            .total_cmp(&left.churn_score)
            .then_with(|| left.path.cmp(&right.path))
    });
    high_churn.truncate(options.top_n);

    let mut files_by_commit_frequency: Vec<FileCommitCount> = files
        .iter()
        .filter(|file| file.commits > 0)
        .map(|file| FileCommitCount {
            path: file.path.clone(),
            commits: file.commits,
        })
        .collect();
    files_by_commit_frequency.sort_by(|left, right| {
        right
            .commits
            .cmp(&left.commits)
            .then_with(|| left.path.cmp(&right.path))
    });
    files_by_commit_frequency.truncate(options.top_n);

    let mut files_by_line_changes: Vec<FileLineChanges> = files
        .iter()
        .filter(|file| file.commits > 0)
        .map(|file| FileLineChanges {
            path: file.path.clone(),
            line_changes: file.line_changes,
        })
        .collect();
    files_by_line_changes.sort_by(|left, right| {
        right
            .line_changes
            .cmp(&left.line_changes)
            .then_with(|| left.path.cmp(&right.path))
    });
    files_by_line_changes.truncate(options.top_n);

    ChurnReport {
        files,
        high_churn,
        files_by_commit_frequency,
        files_by_line_changes,
    }
}

fn ratio(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        value as f64 / max as f64
    }
}
