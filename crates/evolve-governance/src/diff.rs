use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use evolve_config::TrackedItemsConfig;
use evolve_core::{FrontMatter, GitContext, parse_front_matter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::GovernanceError;
use crate::audit::ChangeRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub item: String,
    pub path: String,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub from: String,
    pub to: String,
    pub from_commit: String,
    pub to_commit: String,
    pub items: Vec<ItemDiff>,
}

impl DiffReport {
    pub fn total_changes(&self) -> usize {
        self.items.iter().map(|item| item.changes.len()).sum()
    }

    /// Flattens the diff into audit-log change records sharing one rationale.
    pub fn to_change_records(&self, rationale: &str) -> Vec<ChangeRecord> {
        self.items
            .iter()
            .flat_map(|item| {
                item.changes.iter().map(|change| ChangeRecord {
                    item: item.item.clone(),
                    field: change.field.clone(),
                    before: change.before.clone(),
                    after: change.after.clone(),
                    rationale: rationale.to_owned(),
                })
            })
            .collect()
    }

    pub fn render_markdown(&self, generated_at: &str) -> String {
        DiffMarkdown {
            report: self,
            generated_at,
        }
        .to_string()
    }
}

struct DiffMarkdown<'a> {
    report: &'a DiffReport,
    generated_at: &'a str,
}

impl fmt::Display for DiffMarkdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        f.write_str("# Evolution Diff Report\n\n")?;
        writeln!(f, "**Generated:** {}", self.generated_at)?;
        writeln!(
            f,
            "**Comparing:** `{}` ({}) -> `{}` ({})",
            report.from,
            short(&report.from_commit),
            report.to,
            short(&report.to_commit)
        )?;
        writeln!(f, "**Items changed:** {}", report.items.len())?;
        writeln!(f, "**Total changes:** {}\n", report.total_changes())?;

        if report.items.is_empty() {
            return f.write_str("No tracked item metadata changed.\n");
        }

        let mut by_field = BTreeMap::<&str, Vec<(&str, &FieldChange)>>::new();
        for item in &report.items {
            for change in &item.changes {
                by_field
                    .entry(change.field.as_str())
                    .or_default()
                    .push((item.item.as_str(), change));
            }
        }

        f.write_str("## Changes by Field\n\n")?;
        for (field, entries) in &by_field {
            writeln!(f, "### {field} ({} changes)\n", entries.len())?;
            for (item, change) in entries {
                writeln!(
                    f,
                    "- **{item}**: `{}` -> `{}`",
                    display(&change.before),
                    display(&change.after)
                )?;
            }
            writeln!(f)?;
        }

        f.write_str("## Detailed Changes\n\n")?;
        for item in &report.items {
            writeln!(f, "### {}\n", item.item)?;
            writeln!(f, "_{}_\n", item.path)?;
            for change in &item.changes {
                writeln!(f, "**{}:**", change.field)?;
                writeln!(f, "- Before: `{}`", display(&change.before))?;
                writeln!(f, "- After: `{}`\n", display(&change.after))?;
            }
        }
        Ok(())
    }
}

fn display(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(none)")
}

fn short(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

/// Compares tracked-item front-matter between two repository references.
///
/// Read-only: it never touches the working tree or the audit log.
pub struct DiffReporter<'repo> {
    git: &'repo GitContext,
    tracked: TrackedItemsConfig,
}

impl<'repo> DiffReporter<'repo> {
    pub fn new(git: &'repo GitContext, tracked: &TrackedItemsConfig) -> Self {
        Self {
            git,
            tracked: tracked.clone(),
        }
    }

    pub fn diff(&self, from: &str, to: &str) -> Result<DiffReport, GovernanceError> {
        let from_commit = self.git.resolve_commit(from)?;
        let to_commit = self.git.resolve_commit(to)?;

        let mut items = Vec::new();
        for path in self.git.changed_paths(&from_commit, &to_commit)? {
            let Some(stem) = self.tracked.item_id(&path) else {
                continue;
            };

            let before = self.front_matter_at(&from_commit, &path)?;
            let after = self.front_matter_at(&to_commit, &path)?;

            let changes = compare_fields(before.as_ref(), after.as_ref());
            if changes.is_empty() {
                debug!(path = %path, "tracked item changed outside front-matter");
                continue;
            }

            let item = after
                .as_ref()
                .or(before.as_ref())
                .and_then(|fields| fields.get("name"))
                .and_then(|value| value.as_scalar())
                .map(str::to_owned)
                .unwrap_or(stem);
            items.push(ItemDiff {
                item,
                path,
                changes,
            });
        }

        items.sort_by(|left, right| {
            left.item
                .cmp(&right.item)
                .then_with(|| left.path.cmp(&right.path))
        });

        info!(
            from = %from,
            to = %to,
            items = items.len(),
            "computed evolution diff"
        );
        Ok(DiffReport {
            from: from.to_owned(),
            to: to.to_owned(),
            from_commit,
            to_commit,
            items,
        })
    }

    /// Front-matter of `path` at `reference`. A file without a block, or with
    /// YAML that does not parse, counts as having no fields.
    fn front_matter_at(
        &self,
        reference: &str,
        path: &str,
    ) -> Result<Option<FrontMatter>, GovernanceError> {
        let Some(content) = self.git.file_at(reference, path)? else {
            return Ok(None);
        };
        let fields = match parse_front_matter(&content) {
            Ok(fields) => fields.unwrap_or_default(),
            Err(err) => {
                warn!(
                    path = %path,
                    reference = %reference,
                    error = %err,
                    "skipping unreadable front-matter"
                );
                FrontMatter::new()
            }
        };
        Ok(Some(fields))
    }
}

fn compare_fields(before: Option<&FrontMatter>, after: Option<&FrontMatter>) -> Vec<FieldChange> {
    let empty = FrontMatter::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);

    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let old = before.get(field).map(ToString::to_string);
            let new = after.get(field).map(ToString::to_string);
            (old != new).then(|| FieldChange {
                field: field.clone(),
                before: old,
                after: new,
            })
        })
        .collect()
}
