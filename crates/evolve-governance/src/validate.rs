use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use evolve_config::{TrackedItemsConfig, ValidateConfig};
use evolve_core::{
    FrontMatter, FrontMatterError, FrontMatterValue, normalize_path, parse_front_matter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::GovernanceError;

const LIST_FIELDS: [&str; 2] = ["related_commands", "tags"];
const REVIEW_FIELD: &str = "last_reviewed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: &'static str,
    pub field: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn error(code: &'static str, field: Option<&str>, message: String) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            field: field.map(str::to_owned),
            message,
        }
    }

    fn warning(code: &'static str, field: Option<&str>, message: String) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code,
            field: field.map(str::to_owned),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileValidation {
    pub item: String,
    pub path: String,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub files_checked: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Only files with at least one issue.
    pub files: Vec<FileValidation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors == 0
    }
}

/// Review date of one tracked item, as read from its front-matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReview {
    pub id: String,
    pub path: String,
    pub last_reviewed: Option<NaiveDate>,
}

struct TrackedFile {
    id: String,
    path: String,
    front_matter: Result<Option<FrontMatter>, FrontMatterError>,
}

fn tracked_files(
    root: &Path,
    tracked: &TrackedItemsConfig,
) -> Result<Vec<TrackedFile>, GovernanceError> {
    let items_root = root.join(tracked.root.trim_matches('/'));
    if !items_root.is_dir() {
        debug!(path = %items_root.display(), "tracked item root does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&items_root).sort_by_file_name() {
        let entry = entry.map_err(|err| GovernanceError::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = normalize_path(&relative.to_string_lossy());
        let Some(id) = tracked.item_id(&path) else {
            continue;
        };

        let content = fs::read_to_string(entry.path())?;
        files.push(TrackedFile {
            id,
            path,
            front_matter: parse_front_matter(&content),
        });
    }
    Ok(files)
}

fn parse_review_date(value: &FrontMatterValue) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.as_scalar()?.trim(), "%Y-%m-%d").ok()
}

/// Collects `last_reviewed` dates for every tracked item in the working tree.
pub fn collect_item_reviews(
    root: &Path,
    tracked: &TrackedItemsConfig,
) -> Result<Vec<ItemReview>, GovernanceError> {
    Ok(tracked_files(root, tracked)?
        .into_iter()
        .map(|file| ItemReview {
            last_reviewed: file
                .front_matter
                .as_ref()
                .ok()
                .and_then(Option::as_ref)
                .and_then(|fields| fields.get(REVIEW_FIELD))
                .and_then(parse_review_date),
            id: file.id,
            path: file.path,
        })
        .collect())
}

pub fn validate_items(
    root: &Path,
    tracked: &TrackedItemsConfig,
    rules: &ValidateConfig,
    today: NaiveDate,
) -> Result<ValidationReport, GovernanceError> {
    let files = tracked_files(root, tracked)?;
    let files_checked = files.len();

    let mut report = ValidationReport {
        files_checked,
        errors: 0,
        warnings: 0,
        files: Vec::new(),
    };

    for file in files {
        let issues = match &file.front_matter {
            Ok(Some(fields)) => check_fields(&file.id, fields, rules, today),
            Ok(None) => vec![ValidationIssue::error(
                "missing_front_matter",
                None,
                "no front-matter block found".to_owned(),
            )],
            Err(err) => vec![ValidationIssue::error(
                "invalid_front_matter",
                None,
                err.to_string(),
            )],
        };
        if issues.is_empty() {
            continue;
        }

        for issue in &issues {
            match issue.severity {
                IssueSeverity::Error => report.errors += 1,
                IssueSeverity::Warning => report.warnings += 1,
            }
        }
        report.files.push(FileValidation {
            item: file.id,
            path: file.path,
            issues,
        });
    }

    info!(
        files = report.files_checked,
        errors = report.errors,
        warnings = report.warnings,
        "validated tracked item metadata"
    );
    Ok(report)
}

fn check_fields(
    id: &str,
    fields: &FrontMatter,
    rules: &ValidateConfig,
    today: NaiveDate,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for required in &rules.required_fields {
        if !fields.contains_key(required) {
            issues.push(ValidationIssue::error(
                "missing_field",
                Some(required),
                format!("required field '{required}' is missing"),
            ));
        }
    }

    let name = fields.get("name").and_then(FrontMatterValue::as_scalar);
    if let Some(name) = name.filter(|name| *name != id) {
        issues.push(ValidationIssue::error(
            "name_mismatch",
            Some("name"),
            format!("name '{name}' does not match file name '{id}'"),
        ));
    }

    let allowed = [
        ("category", "invalid_category", &rules.categories),
        ("difficulty", "invalid_difficulty", &rules.difficulties),
        ("model_hint", "invalid_model_hint", &rules.model_hints),
    ];
    for (field, code, values) in allowed {
        let Some(value) = fields.get(field) else {
            continue;
        };
        let valid = value
            .as_scalar()
            .is_some_and(|value| values.iter().any(|allowed| allowed == value));
        if !valid && !values.is_empty() {
            issues.push(ValidationIssue::error(
                code,
                Some(field),
                format!("{field} '{value}' must be one of: {}", values.join(", ")),
            ));
        }
    }

    for field in LIST_FIELDS {
        let Some(value) = fields.get(field) else {
            continue;
        };
        let Some(items) = value.as_list() else {
            issues.push(ValidationIssue::error(
                "not_a_list",
                Some(field),
                format!("{field} must be a list"),
            ));
            continue;
        };

        let limit = if field == "tags" {
            rules.max_tags
        } else {
            rules.max_related
        };
        if items.len() > limit {
            issues.push(ValidationIssue::error(
                "too_many",
                Some(field),
                format!("{field} has {} entries, at most {limit} allowed", items.len()),
            ));
        }
        if field == "related_commands" && items.iter().any(|related| related == id) {
            issues.push(ValidationIssue::error(
                "circular",
                Some(field),
                format!("{id} lists itself in related_commands"),
            ));
        }
    }

    if let Some(value) = fields.get(REVIEW_FIELD) {
        match parse_review_date(value) {
            None => issues.push(ValidationIssue::error(
                "invalid_date",
                Some(REVIEW_FIELD),
                format!("last_reviewed '{value}' is not a YYYY-MM-DD date"),
            )),
            Some(reviewed) => {
                let age = (today - reviewed).num_days();
                if age > i64::from(rules.review_stale_days) {
                    issues.push(ValidationIssue::warning(
                        "stale_review",
                        Some(REVIEW_FIELD),
                        format!("last reviewed {age} days ago"),
                    ));
                }
            }
        }
    }

    issues
}
