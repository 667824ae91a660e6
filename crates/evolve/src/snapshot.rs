use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use evolve_governance::Snapshot;

use crate::cli::SnapshotCommand;
use crate::workspace::Workspace;

pub fn run_snapshot(
    workspace: &Workspace,
    command: &SnapshotCommand,
    out: &mut dyn Write,
) -> Result<()> {
    let git = workspace.git()?;
    let mut manager = workspace.snapshot_manager(&git);

    match command {
        SnapshotCommand::Create {
            label,
            message,
            dirty_policy,
        } => {
            if let Some(policy) = dirty_policy {
                manager = manager.with_dirty_policy(*policy);
            }
            let snapshot = manager.create(label, message.as_deref())?;
            writeln!(out, "Created snapshot {}", snapshot.id)?;
            writeln!(out, "  commit: {}", snapshot.commit)?;
        }
        SnapshotCommand::List(args) => {
            let snapshots = manager.list()?;
            if args.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&snapshots)?)?;
            } else if snapshots.is_empty() {
                writeln!(out, "No snapshots.")?;
            } else {
                for snapshot in &snapshots {
                    writeln!(
                        out,
                        "{}  {}  {}  {}  {}",
                        snapshot.id,
                        snapshot.short_commit(),
                        snapshot.created_at,
                        snapshot.status().as_str(),
                        snapshot.message
                    )?;
                }
            }
        }
        SnapshotCommand::Show { id, json } => {
            let snapshot = manager.show(id)?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?;
            } else {
                print_snapshot(&snapshot, out)?;
            }
        }
        SnapshotCommand::Rollback { id, force } => {
            let outcome = manager.rollback(id, *force, confirm_rollback)?;
            writeln!(out, "Restored snapshot {}", outcome.snapshot.id)?;
            if let Some(marker) = &outcome.marker_commit {
                writeln!(out, "  marker commit: {marker}")?;
            }
        }
        SnapshotCommand::Prune { keep } => {
            let keep = keep.unwrap_or(workspace.config.snapshots.keep);
            let removed = manager.prune(keep)?;
            if removed.is_empty() {
                writeln!(out, "Nothing to prune (keeping {keep}).")?;
            }
            for id in removed {
                writeln!(out, "Removed {id}")?;
            }
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "id:       {}", snapshot.id)?;
    writeln!(out, "label:    {}", snapshot.label)?;
    writeln!(out, "message:  {}", snapshot.message)?;
    writeln!(out, "commit:   {}", snapshot.commit)?;
    writeln!(out, "tree:     {}", snapshot.tree)?;
    writeln!(
        out,
        "branch:   {}",
        snapshot.branch.as_deref().unwrap_or("(detached)")
    )?;
    writeln!(out, "created:  {}", snapshot.created_at)?;
    writeln!(out, "status:   {}", snapshot.status().as_str())?;
    for restoration in &snapshot.restorations {
        writeln!(out, "restored: {}", restoration.restored_at)?;
    }
    Ok(())
}

/// Asks on stderr/stdin. Non-interactive stdin never confirms.
fn confirm_rollback(snapshot: &Snapshot) -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return false;
    }

    eprintln!(
        "Rolling back to {} ({}) discards every commit made after it.",
        snapshot.id,
        snapshot.short_commit()
    );
    eprint!("Type 'yes' to continue: ");
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if stdin.lock().read_line(&mut answer).is_err() {
        return false;
    }
    is_confirmation(&answer)
}

fn is_confirmation(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
