use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use evolve_governance::{
    TriggerInputs, ValidationReport, collect_item_reviews, detect_triggers, validate_items,
};

use crate::workspace::Workspace;

/// Runs metadata validation. Returns the report so the caller can pick the exit code.
pub fn run_validate(
    workspace: &Workspace,
    json: bool,
    out: &mut dyn Write,
) -> Result<ValidationReport> {
    let config = &workspace.config;
    let report = validate_items(
        &workspace.root,
        &config.signals.tracked,
        &config.validate,
        Utc::now().date_naive(),
    )?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(report);
    }

    for file in &report.files {
        writeln!(out, "{} ({})", file.item, file.path)?;
        for issue in &file.issues {
            writeln!(
                out,
                "  [{}] {}: {}",
                issue.severity.as_str(),
                issue.code,
                issue.message
            )?;
        }
    }
    writeln!(
        out,
        "Checked {} files: {} errors, {} warnings",
        report.files_checked, report.errors, report.warnings
    )?;
    Ok(report)
}

pub fn run_triggers(workspace: &Workspace, json: bool, out: &mut dyn Write) -> Result<()> {
    let log = workspace.audit_log();
    let cycles = log.cycles()?;
    let reviews = collect_item_reviews(&workspace.root, &workspace.config.signals.tracked)?;
    let inputs = TriggerInputs {
        log_exists: log.exists(),
        cycles: &cycles,
        reviews: &reviews,
    };
    let triggers = detect_triggers(&inputs, &workspace.config.triggers, Utc::now());

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&triggers)?)?;
        return Ok(());
    }

    if triggers.is_empty() {
        writeln!(out, "No evolution triggers detected.")?;
        return Ok(());
    }
    for (index, trigger) in triggers.iter().enumerate() {
        writeln!(
            out,
            "{}. [{}] {}: {}",
            index + 1,
            trigger.severity.as_str().to_ascii_uppercase(),
            trigger.kind,
            trigger.message
        )?;
        if let Some(recommendation) = &trigger.recommendation {
            writeln!(out, "   -> {recommendation}")?;
        }
        for item in &trigger.stale_items {
            writeln!(
                out,
                "   - {}: last reviewed {} ({} days ago)",
                item.id, item.last_reviewed, item.days_stale
            )?;
        }
    }
    Ok(())
}
