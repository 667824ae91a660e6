use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use evolve_config::{EvolveConfig, load_workspace_config, validate_config};
use evolve_core::GitContext;
use evolve_governance::{AuditLog, SnapshotManager, SnapshotOptions};
use tracing::warn;

/// Resolved workspace root plus its loaded configuration.
pub struct Workspace {
    pub root: PathBuf,
    pub config: EvolveConfig,
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self> {
        let root = path
            .canonicalize()
            .with_context(|| format!("failed to resolve workspace path {}", path.display()))?;
        let config = load_workspace_config(&root).with_context(|| {
            format!(
                "failed to load workspace config at {}",
                evolve_config::config_path(&root).display()
            )
        })?;

        for warning in validate_config(&config) {
            warn!(code = warning.code, "config warning: {}", warning.message);
        }

        Ok(Self { root, config })
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn git(&self) -> Result<GitContext> {
        Ok(GitContext::open(&self.root)?)
    }

    pub fn audit_log(&self) -> AuditLog {
        AuditLog::open(self.resolve(&self.config.audit.log_path))
            .with_changelog(self.resolve(&self.config.audit.changelog_path))
    }

    pub fn snapshot_manager<'a>(&self, git: &'a GitContext) -> SnapshotManager<'a> {
        SnapshotManager::new(
            git,
            SnapshotOptions::from_config(&self.root, &self.config.snapshots),
        )
    }
}
