use evolve_core::{ErrorClass, GitError};
use thiserror::Error;

mod audit;
mod changelog;
mod diff;
mod lock;
mod snapshot;
mod triggers;
mod validate;

pub use audit::{
    AuditAnalysis, AuditEvent, AuditEventKind, AuditLog, ChainReport, ChangeRecord, CycleStatus,
    CycleTrigger, EvolutionCycle, FieldCount, FieldTransitions, ItemCount, TimelineEntry,
    TransitionCount,
};
pub use changelog::render_changelog;
pub use diff::{DiffReport, DiffReporter, FieldChange, ItemDiff};
pub use snapshot::{
    Restoration, RollbackOutcome, Snapshot, SnapshotManager, SnapshotOptions, SnapshotStatus,
};
pub use triggers::{
    EvolutionTrigger, StaleItem, TriggerInputs, TriggerSeverity, detect_triggers,
};
pub use validate::{
    FileValidation, IssueSeverity, ItemReview, ValidationIssue, ValidationReport,
    collect_item_reviews, validate_items,
};

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("working tree has uncommitted changes to tracked files: {}", .paths.join(", "))]
    DirtyWorkingState { paths: Vec<String> },
    #[error("snapshot label '{label}' is already used by {existing_id}")]
    DuplicateSnapshot { label: String, existing_id: String },
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("snapshot {id} has no git reference anymore (tag '{tag}' is missing)")]
    SnapshotReferenceMissing { id: String, tag: String },
    #[error("cannot roll back to {id}: uncommitted changes would be lost in {}", .paths.join(", "))]
    RollbackConflict { id: String, paths: Vec<String> },
    #[error("rollback to {0} was not confirmed")]
    RollbackCancelled(String),
    #[error("invalid snapshot label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },
    #[error("evolution cycle already exists: {0}")]
    DuplicateCycleId(String),
    #[error("evolution cycle not found: {0}")]
    CycleNotFound(String),
    #[error("evolution cycle {cycle_id} is {status}, expected in-progress")]
    CycleNotInProgress {
        cycle_id: String,
        status: CycleStatus,
    },
    #[error("evolution cycle {0} is already reverted")]
    CycleAlreadyReverted(String),
    #[error("invalid change for cycle {cycle_id}: {reason}")]
    InvalidChange { cycle_id: String, reason: String },
    #[error("audit log {path} is corrupt at line {line}: {reason}")]
    CorruptLog {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Git(err) => err.class(),
            Self::DuplicateSnapshot { .. }
            | Self::SnapshotNotFound(_)
            | Self::RollbackCancelled(_)
            | Self::InvalidLabel { .. }
            | Self::DuplicateCycleId(_)
            | Self::CycleNotFound(_)
            | Self::InvalidChange { .. } => ErrorClass::Input,
            Self::DirtyWorkingState { .. }
            | Self::SnapshotReferenceMissing { .. }
            | Self::RollbackConflict { .. }
            | Self::CycleNotInProgress { .. }
            | Self::CycleAlreadyReverted(_) => ErrorClass::StateConflict,
            Self::CorruptLog { .. } | Self::Io(_) | Self::Json(_) => ErrorClass::Internal,
        }
    }
}
