use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use evolve_config::{DirtyTreePolicy, SnapshotsConfig};
use evolve_core::{GitContext, write_atomic};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::GovernanceError;
use crate::lock::FileLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotStatus {
    Created,
    RestoredFrom,
}

impl SnapshotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::RestoredFrom => "restored-from",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restoration {
    pub restored_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub label: String,
    pub message: String,
    pub commit: String,
    pub tree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub restorations: Vec<Restoration>,
}

impl Snapshot {
    pub fn status(&self) -> SnapshotStatus {
        if self.restorations.is_empty() {
            SnapshotStatus::Created
        } else {
            SnapshotStatus::RestoredFrom
        }
    }

    pub fn short_commit(&self) -> &str {
        &self.commit[..self.commit.len().min(8)]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SnapshotStore {
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub metadata_path: PathBuf,
    pub tag_prefix: String,
    pub dirty_policy: DirtyTreePolicy,
    pub rollback_marker_commit: bool,
}

impl SnapshotOptions {
    pub fn from_config(workspace_root: &Path, config: &SnapshotsConfig) -> Self {
        Self {
            metadata_path: workspace_root.join(&config.metadata_path),
            tag_prefix: config.tag_prefix.clone(),
            dirty_policy: config.dirty_policy,
            rollback_marker_commit: config.rollback_marker_commit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub snapshot: Snapshot,
    pub marker_commit: Option<String>,
}

/// Owns the snapshot tag namespace and the snapshot metadata file.
pub struct SnapshotManager<'a> {
    git: &'a GitContext,
    options: SnapshotOptions,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(git: &'a GitContext, options: SnapshotOptions) -> Self {
        Self { git, options }
    }

    pub fn with_dirty_policy(mut self, policy: DirtyTreePolicy) -> Self {
        self.options.dirty_policy = policy;
        self
    }

    pub fn create(&self, label: &str, message: Option<&str>) -> Result<Snapshot, GovernanceError> {
        let label = label.trim();
        let slug = slugify(label);
        if slug.is_empty() {
            return Err(GovernanceError::InvalidLabel {
                label: label.to_owned(),
                reason: "label needs at least one letter or digit".to_owned(),
            });
        }

        let _lock = FileLock::acquire(&self.options.metadata_path)?;
        let mut store = self.load()?;
        if let Some(existing) = store.snapshots.iter().find(|snapshot| snapshot.label == label) {
            return Err(GovernanceError::DuplicateSnapshot {
                label: label.to_owned(),
                existing_id: existing.id.clone(),
            });
        }

        let dirty = self.git.dirty_paths()?;
        if !dirty.is_empty() {
            match self.options.dirty_policy {
                DirtyTreePolicy::Block => {
                    return Err(GovernanceError::DirtyWorkingState { paths: dirty });
                }
                DirtyTreePolicy::Warn => {
                    warn!(
                        label = %label,
                        dirty_files = dirty.len(),
                        "creating snapshot with uncommitted changes; they are not part of it"
                    );
                }
            }
        }

        let commit = self.git.resolve_commit("HEAD")?;
        let tree = self.git.tree_hash(&commit)?;
        let now = Utc::now();
        let id = format!(
            "{}{}-{}",
            self.options.tag_prefix,
            now.format("%Y%m%d-%H%M%S"),
            slug
        );
        if self.git.tag_exists(&id)? {
            return Err(GovernanceError::DuplicateSnapshot {
                label: label.to_owned(),
                existing_id: id,
            });
        }

        let message = message
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(label)
            .to_owned();
        let snapshot = Snapshot {
            id: id.clone(),
            label: label.to_owned(),
            message: message.clone(),
            commit: commit.clone(),
            tree,
            branch: self.git.current_branch(),
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            restorations: Vec::new(),
        };

        self.git
            .create_annotated_tag(&id, &format!("Evolution snapshot: {message}"), &commit)?;
        store.snapshots.push(snapshot.clone());
        if let Err(err) = self.save(&store) {
            if let Err(cleanup) = self.git.delete_tag(&id) {
                warn!(snapshot_id = %id, error = %cleanup, "failed to remove tag after metadata write failed");
            }
            return Err(err);
        }

        info!(
            snapshot_id = %id,
            commit = %snapshot.short_commit(),
            dirty_policy = self.options.dirty_policy.as_str(),
            "created snapshot"
        );
        Ok(snapshot)
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Result<Vec<Snapshot>, GovernanceError> {
        let mut snapshots = self.load()?.snapshots;
        snapshots.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(snapshots)
    }

    /// Looks a snapshot up by id, falling back to its label.
    pub fn show(&self, id: &str) -> Result<Snapshot, GovernanceError> {
        let store = self.load()?;
        find(&store, id)
            .cloned()
            .ok_or_else(|| GovernanceError::SnapshotNotFound(id.to_owned()))
    }

    /// Restores HEAD and the working tree to a snapshot.
    ///
    /// Without `force`, `confirm` is asked once every precondition holds; a
    /// `false` answer cancels without touching the repository.
    pub fn rollback<F>(
        &self,
        id: &str,
        force: bool,
        confirm: F,
    ) -> Result<RollbackOutcome, GovernanceError>
    where
        F: FnOnce(&Snapshot) -> bool,
    {
        let _lock = FileLock::acquire(&self.options.metadata_path)?;
        let mut store = self.load()?;
        let index = store
            .snapshots
            .iter()
            .position(|snapshot| snapshot.id == id || snapshot.label == id)
            .ok_or_else(|| GovernanceError::SnapshotNotFound(id.to_owned()))?;
        let snapshot = store.snapshots[index].clone();

        if !self.git.tag_exists(&snapshot.id)? {
            return Err(GovernanceError::SnapshotReferenceMissing {
                id: snapshot.id.clone(),
                tag: snapshot.id.clone(),
            });
        }
        let target = self.git.resolve_commit(&format!("refs/tags/{}", snapshot.id))?;
        if target != snapshot.commit {
            warn!(
                snapshot_id = %snapshot.id,
                recorded = %snapshot.commit,
                tagged = %target,
                "snapshot tag moved since creation; restoring the tagged commit"
            );
        }

        let dirty = self.git.dirty_paths()?;
        if !dirty.is_empty() {
            return Err(GovernanceError::RollbackConflict {
                id: snapshot.id.clone(),
                paths: dirty,
            });
        }

        if !force && !confirm(&snapshot) {
            return Err(GovernanceError::RollbackCancelled(snapshot.id.clone()));
        }

        // Marker first: nothing in the work tree moves until it exists.
        let marker_commit = if self.options.rollback_marker_commit {
            let tree = self.git.tree_hash(&target)?;
            Some(self.git.commit_tree(
                &tree,
                &target,
                &format!(
                    "rollback: restored from snapshot {}\n\nOriginal message: {}",
                    snapshot.id, snapshot.message
                ),
            )?)
        } else {
            None
        };

        let previous_head = self.git.head_commit_hash();
        self.git.reset_hard(marker_commit.as_deref().unwrap_or(&target))?;

        store.snapshots[index].restorations.push(Restoration {
            restored_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            previous_head: previous_head.clone(),
            marker_commit: marker_commit.clone(),
        });
        if let Err(err) = self.save(&store) {
            if let Some(previous) = &previous_head
                && let Err(reset_err) = self.git.reset_hard(previous)
            {
                warn!(
                    snapshot_id = %snapshot.id,
                    error = %reset_err,
                    "failed to restore HEAD after rollback metadata write failed"
                );
            }
            return Err(err);
        }

        info!(snapshot_id = %snapshot.id, commit = %target, "rolled back to snapshot");
        Ok(RollbackOutcome {
            snapshot: store.snapshots[index].clone(),
            marker_commit,
        })
    }

    /// Deletes the oldest snapshots (tag and metadata) beyond the newest `keep`.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>, GovernanceError> {
        let _lock = FileLock::acquire(&self.options.metadata_path)?;
        let mut store = self.load()?;
        if store.snapshots.len() <= keep {
            return Ok(Vec::new());
        }

        store.snapshots.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        let remove_count = store.snapshots.len() - keep;
        let removed: Vec<Snapshot> = store.snapshots.drain(..remove_count).collect();

        for snapshot in &removed {
            if self.git.tag_exists(&snapshot.id)? {
                self.git.delete_tag(&snapshot.id)?;
            }
        }
        self.save(&store)?;

        let ids: Vec<String> = removed.into_iter().map(|snapshot| snapshot.id).collect();
        info!(removed = ids.len(), kept = store.snapshots.len(), "pruned snapshots");
        Ok(ids)
    }

    fn load(&self) -> Result<SnapshotStore, GovernanceError> {
        let path = &self.options.metadata_path;
        if !path.exists() {
            return Ok(SnapshotStore::default());
        }

        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(SnapshotStore::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, store: &SnapshotStore) -> Result<(), GovernanceError> {
        let mut json = serde_json::to_string_pretty(store)?;
        json.push('\n');
        write_atomic(&self.options.metadata_path, json.as_bytes())?;
        Ok(())
    }
}

fn find<'s>(store: &'s SnapshotStore, id: &str) -> Option<&'s Snapshot> {
    store
        .snapshots
        .iter()
        .find(|snapshot| snapshot.id == id)
        .or_else(|| store.snapshots.iter().find(|snapshot| snapshot.label == id))
}

fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_owned()
}
