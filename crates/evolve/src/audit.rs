use std::io::Write;

use anyhow::Result;
use evolve_governance::{AuditAnalysis, ChangeRecord, EvolutionCycle};

use crate::cli::LogCommand;
use crate::workspace::Workspace;

pub fn run_log(workspace: &Workspace, command: &LogCommand, out: &mut dyn Write) -> Result<()> {
    let log = workspace.audit_log();

    match command {
        LogCommand::RecordCycle {
            id,
            trigger,
            capability_changes,
        } => {
            let cycle = log.record_cycle_start(id, *trigger, capability_changes)?;
            writeln!(out, "Started cycle {} ({})", cycle.id, cycle.trigger.as_str())?;
        }
        LogCommand::RecordChange {
            cycle,
            item,
            field,
            before,
            after,
            rationale,
        } => {
            let updated = log.append_change(
                cycle,
                ChangeRecord {
                    item: item.clone(),
                    field: field.clone(),
                    before: before.clone(),
                    after: after.clone(),
                    rationale: rationale.clone(),
                },
            )?;
            writeln!(
                out,
                "Recorded {item}.{field} in {} ({} changes)",
                updated.id,
                updated.changes.len()
            )?;
        }
        LogCommand::LinkSnapshot { cycle, snapshot_id } => {
            log.link_snapshot(cycle, snapshot_id)?;
            writeln!(out, "Linked {snapshot_id} to {cycle}")?;
        }
        LogCommand::Complete { id, pr } => {
            let cycle = log.complete(id, pr)?;
            writeln!(
                out,
                "Completed cycle {} with {} changes",
                cycle.id,
                cycle.changes.len()
            )?;
        }
        LogCommand::Revert {
            id,
            reason,
            snapshot,
        } => {
            let cycle = log.revert(id, reason, snapshot.as_deref())?;
            writeln!(out, "Reverted cycle {}", cycle.id)?;
        }
        LogCommand::Show(args) => {
            let cycles = log.cycles()?;
            if args.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&cycles)?)?;
            } else {
                print_cycles(&cycles, out)?;
            }
        }
        LogCommand::Analyze(args) => {
            let analysis = log.analyze()?;
            if args.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&analysis)?)?;
            } else {
                print_analysis(&analysis, out)?;
            }
        }
        LogCommand::Timeline { output } => {
            let path = output
                .clone()
                .unwrap_or_else(|| workspace.resolve(&workspace.config.audit.timeline_path));
            let timeline = log.export_timeline(&path)?;
            writeln!(
                out,
                "Exported {} cycles to {}",
                timeline.len(),
                path.display()
            )?;
        }
        LogCommand::Verify => {
            let report = log.verify()?;
            if report.valid {
                writeln!(out, "Audit chain intact ({} events)", report.events)?;
            } else {
                anyhow::bail!(
                    "audit chain broken at event {}: {}",
                    report.first_broken_seq.unwrap_or_default(),
                    report.reason.unwrap_or_default()
                );
            }
        }
        LogCommand::Changelog => match log.regenerate_changelog()? {
            Some(path) => writeln!(out, "Changelog written to {}", path.display())?,
            None => writeln!(out, "No changelog path configured")?,
        },
    }
    Ok(())
}

fn print_cycles(cycles: &[EvolutionCycle], out: &mut dyn Write) -> Result<()> {
    if cycles.is_empty() {
        writeln!(out, "No evolution cycles recorded.")?;
        return Ok(());
    }
    for cycle in cycles {
        writeln!(
            out,
            "{}  {}  {}  {} changes  started {}",
            cycle.id,
            cycle.status,
            cycle.trigger.as_str(),
            cycle.changes.len(),
            cycle.started_at
        )?;
    }
    Ok(())
}

fn print_analysis(analysis: &AuditAnalysis, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Cycles: {}", analysis.total_cycles)?;
    writeln!(
        out,
        "  in progress {}, completed {}, reverted {}",
        analysis.in_progress, analysis.completed, analysis.reverted
    )?;
    writeln!(
        out,
        "  completion rate {:.0}%, reversion rate {:.0}%",
        analysis.completion_rate * 100.0,
        analysis.reversion_rate * 100.0
    )?;
    writeln!(out, "Changes: {}", analysis.total_changes)?;
    for field in &analysis.field_changes {
        writeln!(out, "  {}: {}", field.field, field.count)?;
    }
    for transitions in &analysis.common_transitions {
        for transition in &transitions.transitions {
            writeln!(
                out,
                "  {}: {} -> {} ({}x)",
                transitions.field,
                transition.before.as_deref().unwrap_or("(none)"),
                transition.after.as_deref().unwrap_or("(none)"),
                transition.count
            )?;
        }
    }
    if !analysis.most_changed_items.is_empty() {
        writeln!(out, "Most changed items:")?;
        for item in &analysis.most_changed_items {
            writeln!(out, "  {}: {}", item.item, item.count)?;
        }
    }
    Ok(())
}
