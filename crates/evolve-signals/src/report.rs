use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use evolve_core::write_atomic;
use serde::Serialize;
use tracing::info;

use crate::{ReportMetadata, SignalsError, SignalsReport};

pub const LATEST_DIR_NAME: &str = "latest";
pub const ADOPTION_FILE_NAME: &str = "adoption-metrics.json";
pub const CHURN_FILE_NAME: &str = "churn-analysis.json";
pub const PAIN_FILE_NAME: &str = "pain-points-report.json";
pub const SUMMARY_FILE_NAME: &str = "signals-summary.md";

const SUMMARY_TOP: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    /// `<output_dir>/latest`, replaced on every run.
    Latest,
    /// `<output_dir>/<label>`, kept for historical comparison.
    Snapshot { label: String, overwrite: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReport {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct ReportFile<'a, T> {
    metadata: &'a ReportMetadata,
    #[serde(flatten)]
    report: &'a T,
}

/// Writes analysis results below one output directory handle.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn target_dir(&self, target: &ReportTarget) -> PathBuf {
        match target {
            ReportTarget::Latest => self.output_dir.join(LATEST_DIR_NAME),
            ReportTarget::Snapshot { label, .. } => self.output_dir.join(label),
        }
    }

    pub fn write(
        &self,
        report: &SignalsReport,
        target: &ReportTarget,
    ) -> Result<WrittenReport, SignalsError> {
        let rendered = render_files(report)?;
        let written = match target {
            ReportTarget::Latest => self.write_latest(&rendered)?,
            ReportTarget::Snapshot { label, overwrite } => {
                self.write_snapshot(label, *overwrite, &rendered)?
            }
        };

        info!(
            directory = %written.directory.display(),
            files = written.files.len(),
            "wrote signal reports"
        );
        Ok(written)
    }

    fn write_latest(&self, rendered: &[(&str, String)]) -> Result<WrittenReport, SignalsError> {
        let directory = self.output_dir.join(LATEST_DIR_NAME);
        fs::create_dir_all(&directory)?;

        let mut files = Vec::with_capacity(rendered.len());
        for (name, content) in rendered {
            let path = directory.join(name);
            write_atomic(&path, content.as_bytes())?;
            files.push(path);
        }

        Ok(WrittenReport { directory, files })
    }

    fn write_snapshot(
        &self,
        label: &str,
        overwrite: bool,
        rendered: &[(&str, String)],
    ) -> Result<WrittenReport, SignalsError> {
        validate_label(label)?;
        let directory = self.output_dir.join(label);
        if directory.exists() && !overwrite {
            return Err(SignalsError::SnapshotAlreadyExists {
                label: label.to_owned(),
                path: directory.display().to_string(),
            });
        }

        fs::create_dir_all(&self.output_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.output_dir)?;

        let mut files = Vec::with_capacity(rendered.len());
        for (name, content) in rendered {
            fs::write(staging.path().join(name), content)?;
            files.push(directory.join(name));
        }

        // The previous snapshot is parked until the new one is in place.
        let parked = tempfile::Builder::new()
            .prefix(".replaced-")
            .tempdir_in(&self.output_dir)?;
        let parked_path = parked.path().join(label);
        let replaced = directory.exists();
        if replaced {
            fs::rename(&directory, &parked_path)?;
        }

        if let Err(err) = fs::rename(staging.path(), &directory) {
            if replaced {
                fs::rename(&parked_path, &directory)?;
            }
            if directory.exists() && !overwrite {
                return Err(SignalsError::SnapshotAlreadyExists {
                    label: label.to_owned(),
                    path: directory.display().to_string(),
                });
            }
            return Err(err.into());
        }

        Ok(WrittenReport { directory, files })
    }
}

fn validate_label(label: &str) -> Result<(), SignalsError> {
    let reason = if label.trim().is_empty() {
        Some("label must not be empty")
    } else if label == LATEST_DIR_NAME {
        Some("'latest' is reserved for the rolling report")
    } else if label.starts_with('.') {
        Some("label must not start with '.'")
    } else if label.contains(['/', '\\']) || label.contains("..") {
        Some("label must be a single path component")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SignalsError::InvalidLabel {
            label: label.to_owned(),
            reason: reason.to_owned(),
        }),
        None => Ok(()),
    }
}

fn render_files(report: &SignalsReport) -> Result<Vec<(&'static str, String)>, SignalsError> {
    let metadata = &report.metadata;
    Ok(vec![
        (
            ADOPTION_FILE_NAME,
            to_json(&ReportFile {
                metadata,
                report: &report.adoption,
            })?,
        ),
        (
            CHURN_FILE_NAME,
            to_json(&ReportFile {
                metadata,
                report: &report.churn,
            })?,
        ),
        (
            PAIN_FILE_NAME,
            to_json(&ReportFile {
                metadata,
                report: &report.pain,
            })?,
        ),
        (SUMMARY_FILE_NAME, render_summary(report)),
    ])
}

fn to_json<T: Serialize>(value: &T) -> Result<String, SignalsError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

pub fn render_summary(report: &SignalsReport) -> String {
    SummaryMarkdown(report).to_string()
}

struct SummaryMarkdown<'a>(&'a SignalsReport);

impl fmt::Display for SummaryMarkdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let metadata = &report.metadata;

        writeln!(f, "# Git Signals Summary\n")?;
        writeln!(f, "- **Generated:** {}", metadata.generated_at)?;
        writeln!(f, "- **Window:** {}", metadata.window)?;
        writeln!(f, "- **Commits analyzed:** {}", metadata.commits_analyzed)?;
        writeln!(
            f,
            "- **HEAD:** {}",
            metadata.head.as_deref().unwrap_or("(no commits)")
        )?;

        writeln!(f, "\n## Adoption\n")?;
        if report.adoption.most_touched.is_empty() {
            writeln!(f, "No tracked commands were found.")?;
        } else {
            writeln!(f, "**Most active commands:**\n")?;
            for entry in report.adoption.most_touched.iter().take(SUMMARY_TOP) {
                writeln!(
                    f,
                    "- `{}`: {} touches by {} authors",
                    entry.command, entry.touches, entry.authors
                )?;
            }
            writeln!(f, "\n**Least active commands (candidates for review):**\n")?;
            for entry in report.adoption.least_touched.iter().take(SUMMARY_TOP) {
                writeln!(f, "- `{}`: {} touches", entry.command, entry.touches)?;
            }
        }

        writeln!(f, "\n## High-Churn Areas\n")?;
        if report.churn.high_churn.is_empty() {
            writeln!(f, "No file changes in this window.")?;
        }
        for file in report.churn.high_churn.iter().take(SUMMARY_TOP) {
            writeln!(
                f,
                "- `{}`: {} lines across {} commits (avg {:.1}, score {:.2})",
                file.path,
                file.line_changes,
                file.commits,
                file.avg_change_per_commit,
                file.churn_score
            )?;
        }

        let summary = &report.pain.summary;
        writeln!(f, "\n## Pain Point Signals\n")?;
        writeln!(f, "- Reverts: {}", summary.total_reverts)?;
        writeln!(f, "- Bug fixes: {}", summary.total_bug_fixes)?;
        writeln!(f, "- Hotfixes: {}", summary.total_hotfixes)?;

        if !report.pain.top_pain.is_empty() {
            writeln!(f, "\n**Top pain areas:**\n")?;
            for file in report.pain.top_pain.iter().take(SUMMARY_TOP) {
                writeln!(
                    f,
                    "- `{}`: pain score {} ({})",
                    file.path,
                    file.pain_score,
                    file.tier.as_str()
                )?;
            }
        }

        writeln!(f, "\n---\nSee the JSON reports next to this file for full data.")
    }
}
