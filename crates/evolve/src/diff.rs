use std::io::Write;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use evolve_core::write_atomic;
use evolve_governance::{CycleStatus, DiffReporter, GovernanceError};

use crate::cli::DiffArgs;
use crate::workspace::Workspace;

pub fn run_diff(workspace: &Workspace, args: &DiffArgs, out: &mut dyn Write) -> Result<()> {
    let git = workspace.git()?;
    let report =
        DiffReporter::new(&git, &workspace.config.signals.tracked).diff(&args.from, &args.to)?;

    let log = workspace.audit_log();
    if let Some(cycle) = &args.record {
        let target = log.cycle(cycle)?;
        if target.status != CycleStatus::InProgress {
            return Err(GovernanceError::CycleNotInProgress {
                cycle_id: target.id,
                status: target.status,
            }
            .into());
        }
    }

    if args.report {
        let path = workspace.resolve(&workspace.config.diff.report_path);
        let markdown =
            report.render_markdown(&Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        write_atomic(&path, markdown.as_bytes())
            .with_context(|| format!("failed to write diff report {}", path.display()))?;
        writeln!(out, "Diff report written to {}", path.display())?;
    }

    if let Some(cycle) = &args.record {
        let changes = report.to_change_records(&args.rationale);
        let count = changes.len();
        log.append_changes(cycle, changes)?;
        writeln!(out, "Recorded {count} changes in {cycle}")?;
    }

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(
        out,
        "{} items changed between {} and {} ({} changes)",
        report.items.len(),
        args.from,
        args.to,
        report.total_changes()
    )?;
    for item in &report.items {
        writeln!(out, "{}", item.item)?;
        for change in &item.changes {
            writeln!(
                out,
                "  {}: {} -> {}",
                change.field,
                change.before.as_deref().unwrap_or("(none)"),
                change.after.as_deref().unwrap_or("(none)")
            )?;
        }
    }
    Ok(())
}
