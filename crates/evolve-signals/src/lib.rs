use evolve_core::{ErrorClass, GitError, InvalidTimeWindow};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adoption;
mod analyzer;
mod churn;
mod classify;
mod pain;
mod report;

pub use adoption::{
    AdoptionOptions, AdoptionReport, CommandAdoption, FileAdoption, extract_adoption,
};
pub use analyzer::SignalsAnalyzer;
pub use churn::{
    ChurnOptions, ChurnReport, FileChurn, FileCommitCount, FileLineChanges,
    average_change_per_commit, extract_churn,
};
pub use classify::{
    Classification, KeywordClassifier, PainClassifiers, PainKind, SubjectClassifier,
};
pub use pain::{
    ClassifiedCommit, FilePain, PainOptions, PainReport, PainSummary, PainTier, extract_pain,
};
pub use report::{
    ADOPTION_FILE_NAME, CHURN_FILE_NAME, LATEST_DIR_NAME, PAIN_FILE_NAME, ReportTarget,
    ReportWriter, SUMMARY_FILE_NAME, WrittenReport, render_summary,
};

#[derive(Debug, Error)]
pub enum SignalsError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Window(#[from] InvalidTimeWindow),
    #[error("report snapshot '{label}' already exists at {path}; pass overwrite to replace it")]
    SnapshotAlreadyExists { label: String, path: String },
    #[error("invalid report label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignalsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Git(err) => err.class(),
            Self::Window(_) | Self::SnapshotAlreadyExists { .. } | Self::InvalidLabel { .. } => {
                ErrorClass::Input
            }
            Self::Io(_) | Self::Json(_) => ErrorClass::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub window: String,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub commits_analyzed: usize,
    pub head: Option<String>,
}

/// The three extractor outputs of one run, plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsReport {
    pub metadata: ReportMetadata,
    pub adoption: AdoptionReport,
    pub churn: ChurnReport,
    pub pain: PainReport,
}
