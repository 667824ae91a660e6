use std::fmt;

use crate::audit::{CycleStatus, EvolutionCycle};

/// Renders the human-readable changelog derived from the audit log, newest
/// cycle first. The output is a pure function of the cycles passed in.
pub fn render_changelog(cycles: &[EvolutionCycle]) -> String {
    Changelog(cycles).to_string()
}

struct Changelog<'a>(&'a [EvolutionCycle]);

impl fmt::Display for Changelog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("# Evolution Changelog\n\n")?;
        f.write_str("_Generated from the evolution audit log. Do not edit by hand._\n")?;

        if self.0.is_empty() {
            return f.write_str("\nNo evolution cycles recorded yet.\n");
        }

        for cycle in self.0.iter().rev() {
            write_cycle(f, cycle)?;
        }
        Ok(())
    }
}

fn write_cycle(f: &mut fmt::Formatter<'_>, cycle: &EvolutionCycle) -> fmt::Result {
    writeln!(f, "\n## {} ({})\n", cycle.id, cycle.status)?;
    writeln!(f, "- **Started:** {}", cycle.started_at)?;
    writeln!(f, "- **Trigger:** {}", cycle.trigger.as_str())?;
    if !cycle.capability_changes.is_empty() {
        writeln!(f, "- **Capability changes:** {}", cycle.capability_changes)?;
    }
    if let Some(snapshot) = &cycle.snapshot_id {
        writeln!(f, "- **Snapshot:** `{snapshot}`")?;
    }

    match cycle.status {
        CycleStatus::InProgress => {}
        CycleStatus::Completed => {
            if let Some(completed_at) = &cycle.completed_at {
                writeln!(f, "- **Completed:** {completed_at}")?;
            }
            if let Some(review) = &cycle.review_reference {
                writeln!(f, "- **Review:** {review}")?;
            }
        }
        CycleStatus::Reverted => {
            if let Some(reverted_at) = &cycle.reverted_at {
                writeln!(f, "- **Reverted:** {reverted_at}")?;
            }
            if let Some(reason) = &cycle.revert_reason {
                writeln!(f, "- **Revert reason:** {reason}")?;
            }
            if let Some(restored) = &cycle.restored_snapshot {
                writeln!(f, "- **Restored snapshot:** `{restored}`")?;
            }
        }
    }

    if cycle.changes.is_empty() {
        return f.write_str("\nNo changes recorded.\n");
    }

    writeln!(f, "\n### Changes ({})\n", cycle.changes.len())?;
    for change in &cycle.changes {
        write!(
            f,
            "- **{}** `{}`: `{}` -> `{}`",
            change.item,
            change.field,
            change.before.as_deref().unwrap_or("(none)"),
            change.after.as_deref().unwrap_or("(none)"),
        )?;
        if change.rationale.is_empty() {
            writeln!(f)?;
        } else {
            writeln!(f, " ({})", change.rationale)?;
        }
    }
    Ok(())
}
