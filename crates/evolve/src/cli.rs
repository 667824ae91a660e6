use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use evolve_config::DirtyTreePolicy;
use evolve_governance::CycleTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Git-signal analytics and evolution governance for playbook repositories"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Repository workspace root"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Write a default .evolve/config.toml if none exists
    Init,
    /// Extract adoption, churn and pain signals from git history
    Analyze(AnalyzeArgs),
    /// Check tracked item metadata against the conventions
    Validate(JsonArgs),
    /// Report whether an evolution cycle is due
    Triggers(JsonArgs),
    /// Create, inspect and restore evolution snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
    /// Record and inspect evolution cycles
    #[command(subcommand)]
    Log(LogCommand),
    /// Compare tracked item metadata between two refs
    Diff(DiffArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct JsonArgs {
    #[arg(long, help = "Print machine-readable JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AnalyzeArgs {
    #[arg(
        long,
        help = "Window start: 'N units ago', Nd/Nw/Ny, YYYY-MM-DD, RFC 3339 or 'all'"
    )]
    pub since: Option<String>,

    #[arg(long, help = "Optional window end, same formats as --since")]
    pub until: Option<String>,

    #[arg(long, help = "Report output directory (defaults to [signals].output_dir)")]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "LABEL", help = "Write a named report snapshot instead of latest")]
    pub snapshot: Option<String>,

    #[arg(long, requires = "snapshot", help = "Replace an existing named report snapshot")]
    pub overwrite: bool,

    #[arg(long, help = "Print the full report as JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SnapshotCommand {
    /// Tag the current commit as a snapshot
    Create {
        label: String,
        #[arg(long, help = "Snapshot description")]
        message: Option<String>,
        #[arg(
            long,
            value_parser = parse_dirty_policy,
            help = "Override [snapshots].dirty_policy (block or warn)"
        )]
        dirty_policy: Option<DirtyTreePolicy>,
    },
    /// List snapshots, newest first
    List(JsonArgs),
    /// Show one snapshot by id or label
    Show {
        id: String,
        #[arg(long, help = "Print machine-readable JSON")]
        json: bool,
    },
    /// Reset the repository to a snapshot
    Rollback {
        id: String,
        #[arg(long, help = "Skip the confirmation prompt")]
        force: bool,
    },
    /// Delete the oldest snapshots beyond --keep
    Prune {
        #[arg(long, help = "Snapshots to keep (defaults to [snapshots].keep)")]
        keep: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum LogCommand {
    /// Start a new evolution cycle
    RecordCycle {
        id: String,
        #[arg(long, value_parser = parse_cycle_trigger)]
        trigger: CycleTrigger,
        #[arg(long, default_value = "")]
        capability_changes: String,
    },
    /// Record one attribute change in an in-progress cycle
    RecordChange {
        cycle: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        field: String,
        #[arg(long)]
        before: Option<String>,
        #[arg(long)]
        after: Option<String>,
        #[arg(long, default_value = "")]
        rationale: String,
    },
    /// Attach a snapshot id to an in-progress cycle
    LinkSnapshot { cycle: String, snapshot_id: String },
    /// Mark a cycle completed
    Complete {
        id: String,
        #[arg(long, help = "Review or pull request reference")]
        pr: String,
    },
    /// Mark a cycle reverted
    Revert {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, help = "Snapshot that was restored")]
        snapshot: Option<String>,
    },
    /// List cycles
    Show(JsonArgs),
    /// Aggregate statistics over all cycles
    Analyze(JsonArgs),
    /// Export the cycle timeline as JSON
    Timeline {
        #[arg(long, help = "Output file (defaults to [audit].timeline_path)")]
        output: Option<PathBuf>,
    },
    /// Check the event hash chain
    Verify,
    /// Regenerate the markdown changelog
    Changelog,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DiffArgs {
    pub from: String,
    pub to: String,

    #[arg(long, help = "Write the markdown report to [diff].report_path")]
    pub report: bool,

    #[arg(long, value_name = "CYCLE", help = "Append the changes to an in-progress cycle")]
    pub record: Option<String>,

    #[arg(long, default_value = "", requires = "record")]
    pub rationale: String,

    #[arg(long, help = "Print machine-readable JSON")]
    pub json: bool,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_cycle_trigger(value: &str) -> Result<CycleTrigger, String> {
    value.parse()
}

fn parse_dirty_policy(value: &str) -> Result<DirtyTreePolicy, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_parses_window_and_snapshot() {
        let cli = Cli::try_parse_from([
            "evolve",
            "analyze",
            "--since",
            "3 months ago",
            "--until",
            "2026-06-30",
            "--snapshot",
            "2026-q2",
            "--overwrite",
        ])
        .expect("analyze should parse");

        assert_eq!(cli.workspace, PathBuf::from("."));
        assert_eq!(cli.log_format, LogFormat::Human);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.since.as_deref(), Some("3 months ago"));
                assert_eq!(args.until.as_deref(), Some("2026-06-30"));
                assert_eq!(args.snapshot.as_deref(), Some("2026-q2"));
                assert!(args.overwrite);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn overwrite_requires_snapshot_label() {
        assert!(Cli::try_parse_from(["evolve", "analyze", "--overwrite"]).is_err());
    }

    #[test]
    fn snapshot_create_accepts_dirty_policy_override() {
        let cli = Cli::try_parse_from([
            "evolve",
            "snapshot",
            "create",
            "pre-q1",
            "--dirty-policy",
            "warn",
        ])
        .expect("snapshot create should parse");
        match cli.command {
            Commands::Snapshot(SnapshotCommand::Create { dirty_policy, .. }) => {
                assert_eq!(dirty_policy, Some(DirtyTreePolicy::Warn));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let err = Cli::try_parse_from([
            "evolve",
            "snapshot",
            "create",
            "pre-q1",
            "--dirty-policy",
            "ignore",
        ])
        .expect_err("unknown policy should fail");
        assert!(err.to_string().contains("invalid dirty policy"));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "evolve",
            "snapshot",
            "list",
            "--workspace",
            "/tmp/repo",
            "--log-format",
            "json",
            "--verbose",
        ])
        .expect("snapshot list should parse");

        assert_eq!(cli.workspace, PathBuf::from("/tmp/repo"));
        assert_eq!(cli.log_format.as_str(), "json");
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Commands::Snapshot(SnapshotCommand::List(JsonArgs { json: false }))
        );
    }

    #[test]
    fn record_cycle_accepts_kebab_trigger() {
        let cli = Cli::try_parse_from([
            "evolve",
            "log",
            "record-cycle",
            "2026-Q1",
            "--trigger",
            "capability-change",
            "--capability-changes",
            "new model tier",
        ])
        .expect("record-cycle should parse");

        match cli.command {
            Commands::Log(LogCommand::RecordCycle {
                id,
                trigger,
                capability_changes,
            }) => {
                assert_eq!(id, "2026-Q1");
                assert_eq!(trigger, CycleTrigger::CapabilityChange);
                assert_eq!(capability_changes, "new model tier");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_trigger_is_rejected() {
        let err = Cli::try_parse_from([
            "evolve",
            "log",
            "record-cycle",
            "2026-Q1",
            "--trigger",
            "monthly",
        ])
        .expect_err("monthly is not a trigger");
        assert!(err.to_string().contains("invalid trigger"));
    }

    #[test]
    fn diff_record_takes_rationale() {
        let cli = Cli::try_parse_from([
            "evolve",
            "diff",
            "evolution-20260101-000000-base",
            "HEAD",
            "--record",
            "2026-Q1",
            "--rationale",
            "routing update",
        ])
        .expect("diff should parse");

        match cli.command {
            Commands::Diff(args) => {
                assert_eq!(args.to, "HEAD");
                assert_eq!(args.record.as_deref(), Some("2026-Q1"));
                assert_eq!(args.rationale, "routing update");
                assert!(!args.report);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rollback_force_flag() {
        let cli = Cli::try_parse_from(["evolve", "snapshot", "rollback", "baseline", "--force"])
            .expect("rollback should parse");
        assert_eq!(
            cli.command,
            Commands::Snapshot(SnapshotCommand::Rollback {
                id: "baseline".to_owned(),
                force: true,
            })
        );
    }
}
