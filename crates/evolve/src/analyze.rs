use std::io::Write;

use anyhow::Result;
use evolve_core::{TimeWindow, current_unix_timestamp};
use evolve_signals::{ReportTarget, ReportWriter, SignalsAnalyzer, render_summary};

use crate::cli::AnalyzeArgs;
use crate::workspace::Workspace;

pub fn run_analyze(workspace: &Workspace, args: &AnalyzeArgs, out: &mut dyn Write) -> Result<()> {
    let signals = &workspace.config.signals;
    let since = args.since.as_deref().unwrap_or(signals.since.as_str());
    let window = TimeWindow::between(since, args.until.as_deref(), current_unix_timestamp())?;

    let git = workspace.git()?;
    let report = SignalsAnalyzer::new(&git, signals).analyze(window)?;

    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| workspace.resolve(&signals.output_dir));
    let target = match &args.snapshot {
        Some(label) => ReportTarget::Snapshot {
            label: label.clone(),
            overwrite: args.overwrite,
        },
        None => ReportTarget::Latest,
    };
    let written = ReportWriter::new(output_dir).write(&report, &target)?;

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(out, "{}", render_summary(&report))?;
        writeln!(out, "\nReports written to {}", written.directory.display())?;
    }
    Ok(())
}
