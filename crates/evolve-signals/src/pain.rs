use std::collections::BTreeMap;

use evolve_core::CommitRecord;
use serde::{Deserialize, Serialize};

use crate::classify::{PainClassifiers, PainKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainTier {
    Healthy,
    Moderate,
    High,
    Critical,
}

impl PainTier {
    pub fn from_score(score: u64) -> Self {
        match score {
            0..=2 => Self::Healthy,
            3..=5 => Self::Moderate,
            6..=8 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePain {
    pub path: String,
    pub revert_count: u64,
    pub bugfix_count: u64,
    pub hotfix_count: u64,
    pub pain_score: u64,
    pub tier: PainTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedCommit {
    pub hash: String,
    pub subject: String,
    pub author: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PainSummary {
    pub total_reverts: u64,
    pub total_bug_fixes: u64,
    pub total_hotfixes: u64,
    pub classified_commits: u64,
    pub unclassified_commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PainReport {
    pub files: Vec<FilePain>,
    pub top_pain: Vec<FilePain>,
    pub recent_reverts: Vec<ClassifiedCommit>,
    pub recent_bug_fixes: Vec<ClassifiedCommit>,
    pub recent_hotfixes: Vec<ClassifiedCommit>,
    pub summary: PainSummary,
}

impl PainReport {
    pub fn file(&self, path: &str) -> Option<&FilePain> {
        self.files.iter().find(|file| file.path == path)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PainOptions<'a> {
    pub top_n: usize,
    pub recent_limit: usize,
    pub known_files: &'a [String],
}

#[derive(Default)]
struct Counts {
    revert: u64,
    bugfix: u64,
    hotfix: u64,
}

pub fn extract_pain(
    commits: &[CommitRecord],
    classifiers: &PainClassifiers,
    options: &PainOptions<'_>,
) -> PainReport {
    let mut by_file = BTreeMap::<String, Counts>::new();
    for path in options.known_files {
        by_file.entry(path.clone()).or_default();
    }

    let mut summary = PainSummary::default();
    let mut recent = BTreeMap::<PainKind, Vec<&CommitRecord>>::new();

    for commit in commits {
        let classification = classifiers.classify(&commit.subject);

        for change in &commit.files {
            let counts = by_file.entry(change.path.clone()).or_default();
            counts.revert += u64::from(classification.revert);
            counts.bugfix += u64::from(classification.bugfix);
            counts.hotfix += u64::from(classification.hotfix);
        }

        if !classification.is_classified() {
            summary.unclassified_commits += 1;
            continue;
        }

        summary.classified_commits += 1;
        summary.total_reverts += u64::from(classification.revert);
        summary.total_bug_fixes += u64::from(classification.bugfix);
        summary.total_hotfixes += u64::from(classification.hotfix);

        for kind in PainKind::ALL {
            if classification.has(kind) {
                recent.entry(kind).or_default().push(commit);
            }
        }
    }

    let files: Vec<FilePain> = by_file
        .into_iter()
        .map(|(path, counts)| {
            let pain_score = counts.revert + counts.bugfix + counts.hotfix;
            FilePain {
                path,
                revert_count: counts.revert,
                bugfix_count: counts.bugfix,
                hotfix_count: counts.hotfix,
                pain_score,
                tier: PainTier::from_score(pain_score),
            }
        })
        .collect();

    let mut top_pain: Vec<FilePain> = files
        .iter()
        .filter(|file| file.pain_score > 0)
        .cloned()
        .collect();
    top_pain.sort_by(|left, right| {
        right
            .pain_score
            .cmp(&left.pain_score)
            .then_with(|| left.path.cmp(&right.path))
    });
    top_pain.truncate(options.top_n);

    let mut take_recent =
        |kind: PainKind| most_recent(recent.remove(&kind).unwrap_or_default(), options.recent_limit);

    PainReport {
        recent_reverts: take_recent(PainKind::Revert),
        recent_bug_fixes: take_recent(PainKind::Bugfix),
        recent_hotfixes: take_recent(PainKind::Hotfix),
        files,
        top_pain,
        summary,
    }
}

fn most_recent(mut commits: Vec<&CommitRecord>, limit: usize) -> Vec<ClassifiedCommit> {
    commits.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then_with(|| left.hash.cmp(&right.hash))
    });
    commits
        .into_iter()
        .take(limit)
        .map(|commit| ClassifiedCommit {
            hash: commit.hash.clone(),
            subject: commit.subject.clone(),
            author: commit.author.clone(),
            timestamp: commit.timestamp,
        })
        .collect()
}
