mod analyze;
mod audit;
mod cli;
mod diff;
mod health;
mod logging;
mod snapshot;
mod workspace;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use evolve_config::{ConfigError, ensure_workspace_config};
use evolve_core::{ErrorClass, GitError, InvalidTimeWindow};
use evolve_governance::GovernanceError;
use evolve_signals::SignalsError;
use tracing::error;

use crate::cli::{Cli, Commands, parse_cli};
use crate::workspace::Workspace;

fn main() -> ExitCode {
    let cli = parse_cli();
    logging::init_logging(cli.log_format, cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let code = match run(cli, &mut out) {
        Ok(code) => code,
        Err(err) => {
            let class = error_class(&err);
            error!(class = class.as_str(), "{err:#}");
            eprintln!("evolve: {err:#}");
            class.exit_code()
        }
    };
    let _ = out.flush();
    ExitCode::from(code as u8)
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<i32> {
    if cli.command == Commands::Init {
        let root = cli.workspace.canonicalize().with_context(|| {
            format!("failed to resolve workspace path {}", cli.workspace.display())
        })?;
        ensure_workspace_config(&root).context("failed to create workspace config")?;
        writeln!(
            out,
            "Config ready at {}",
            evolve_config::config_path(&root).display()
        )?;
        return Ok(0);
    }

    let workspace = Workspace::load(&cli.workspace)?;
    match &cli.command {
        Commands::Init => {}
        Commands::Analyze(args) => analyze::run_analyze(&workspace, args, out)?,
        Commands::Validate(args) => {
            let report = health::run_validate(&workspace, args.json, out)?;
            if !report.is_valid() {
                return Ok(ErrorClass::Input.exit_code());
            }
        }
        Commands::Triggers(args) => health::run_triggers(&workspace, args.json, out)?,
        Commands::Snapshot(command) => snapshot::run_snapshot(&workspace, command, out)?,
        Commands::Log(command) => audit::run_log(&workspace, command, out)?,
        Commands::Diff(args) => diff::run_diff(&workspace, args, out)?,
    }
    Ok(0)
}

/// Class of the first typed error in the chain; anything unrecognized is internal.
fn error_class(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<GovernanceError>() {
            return err.class();
        }
        if let Some(err) = cause.downcast_ref::<SignalsError>() {
            return err.class();
        }
        if let Some(err) = cause.downcast_ref::<GitError>() {
            return err.class();
        }
        if cause.downcast_ref::<InvalidTimeWindow>().is_some() {
            return ErrorClass::Input;
        }
        if let Some(err) = cause.downcast_ref::<ConfigError>() {
            return match err {
                ConfigError::Io(_) => ErrorClass::Internal,
                ConfigError::TomlParse(_) | ConfigError::TomlSerialize(_) => ErrorClass::Input,
            };
        }
    }
    ErrorClass::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_class_sees_through_context() {
        let err = anyhow::Error::new(GovernanceError::SnapshotNotFound("x".to_owned()))
            .context("snapshot show failed");
        assert_eq!(error_class(&err), ErrorClass::Input);

        let err = anyhow::Error::new(GovernanceError::CycleAlreadyReverted("q1".to_owned()));
        assert_eq!(error_class(&err).exit_code(), 3);

        let err = anyhow::anyhow!("unexpected");
        assert_eq!(error_class(&err).exit_code(), 1);
    }

    #[test]
    fn wrapped_git_error_keeps_its_class() {
        let err = anyhow::Error::new(SignalsError::Git(GitError::ReferenceNotFound(
            "v9".to_owned(),
        )));
        assert_eq!(error_class(&err), ErrorClass::Input);
    }
}
