use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use evolve_core::{content_hash, write_atomic};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::GovernanceError;
use crate::changelog::render_changelog;
use crate::lock::FileLock;

const GENESIS_HASH: &str = "genesis";
const TOP_TRANSITIONS: usize = 3;
const TOP_ITEMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleTrigger {
    Quarterly,
    Emergency,
    CapabilityChange,
    UserFeedback,
    VersionUpgrade,
    Manual,
}

impl CycleTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Emergency => "emergency",
            Self::CapabilityChange => "capability-change",
            Self::UserFeedback => "user-feedback",
            Self::VersionUpgrade => "version-upgrade",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for CycleTrigger {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().replace('_', "-").as_str() {
            "quarterly" => Ok(Self::Quarterly),
            "emergency" => Ok(Self::Emergency),
            "capability-change" => Ok(Self::CapabilityChange),
            "user-feedback" => Ok(Self::UserFeedback),
            "version-upgrade" => Ok(Self::VersionUpgrade),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "invalid trigger '{other}', expected one of: quarterly, emergency, capability-change, user-feedback, version-upgrade, manual"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStatus {
    InProgress,
    Completed,
    Reverted,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Reverted => "reverted",
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute change of one tracked item. `None` means the value was
/// absent on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub item: String,
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEventKind {
    CycleStarted {
        trigger: CycleTrigger,
        capability_changes: String,
    },
    ChangeAppended {
        change: ChangeRecord,
    },
    SnapshotLinked {
        snapshot_id: String,
    },
    Completed {
        review_reference: String,
    },
    Reverted {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restored_snapshot: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub seq: u64,
    pub timestamp: String,
    pub cycle_id: String,
    pub event: AuditEventKind,
    pub prev_hash: String,
    pub hash: String,
}

#[derive(Serialize)]
struct HashedFields<'a> {
    seq: u64,
    timestamp: &'a str,
    cycle_id: &'a str,
    event: &'a AuditEventKind,
    prev_hash: &'a str,
}

impl AuditEvent {
    fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_string(&HashedFields {
            seq: self.seq,
            timestamp: &self.timestamp,
            cycle_id: &self.cycle_id,
            event: &self.event,
            prev_hash: &self.prev_hash,
        })?;
        Ok(content_hash(&canonical))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionCycle {
    pub id: String,
    pub started_at: String,
    pub trigger: CycleTrigger,
    pub capability_changes: String,
    pub status: CycleStatus,
    pub changes: Vec<ChangeRecord>,
    pub snapshot_id: Option<String>,
    pub review_reference: Option<String>,
    pub completed_at: Option<String>,
    pub reverted_at: Option<String>,
    pub revert_reason: Option<String>,
    pub restored_snapshot: Option<String>,
}

/// Applies one event to the derived cycle list, enforcing the status rules.
fn apply(
    cycles: &mut Vec<EvolutionCycle>,
    index: &mut HashMap<String, usize>,
    event: &AuditEvent,
) -> Result<(), GovernanceError> {
    let cycle_id = event.cycle_id.as_str();

    if let AuditEventKind::CycleStarted {
        trigger,
        capability_changes,
    } = &event.event
    {
        if index.contains_key(cycle_id) {
            return Err(GovernanceError::DuplicateCycleId(cycle_id.to_owned()));
        }
        index.insert(cycle_id.to_owned(), cycles.len());
        cycles.push(EvolutionCycle {
            id: cycle_id.to_owned(),
            started_at: event.timestamp.clone(),
            trigger: *trigger,
            capability_changes: capability_changes.clone(),
            status: CycleStatus::InProgress,
            changes: Vec::new(),
            snapshot_id: None,
            review_reference: None,
            completed_at: None,
            reverted_at: None,
            revert_reason: None,
            restored_snapshot: None,
        });
        return Ok(());
    }

    let position = *index
        .get(cycle_id)
        .ok_or_else(|| GovernanceError::CycleNotFound(cycle_id.to_owned()))?;
    let cycle = &mut cycles[position];
    let require_in_progress = |cycle: &EvolutionCycle| {
        if cycle.status == CycleStatus::InProgress {
            Ok(())
        } else {
            Err(GovernanceError::CycleNotInProgress {
                cycle_id: cycle.id.clone(),
                status: cycle.status,
            })
        }
    };

    match &event.event {
        AuditEventKind::CycleStarted { .. } => {}
        AuditEventKind::ChangeAppended { change } => {
            require_in_progress(cycle)?;
            cycle.changes.push(change.clone());
        }
        AuditEventKind::SnapshotLinked { snapshot_id } => {
            require_in_progress(cycle)?;
            cycle.snapshot_id = Some(snapshot_id.clone());
        }
        AuditEventKind::Completed { review_reference } => {
            require_in_progress(cycle)?;
            cycle.status = CycleStatus::Completed;
            cycle.review_reference = Some(review_reference.clone());
            cycle.completed_at = Some(event.timestamp.clone());
        }
        AuditEventKind::Reverted {
            reason,
            restored_snapshot,
        } => {
            if cycle.status == CycleStatus::Reverted {
                return Err(GovernanceError::CycleAlreadyReverted(cycle.id.clone()));
            }
            cycle.status = CycleStatus::Reverted;
            cycle.revert_reason = Some(reason.clone());
            cycle.reverted_at = Some(event.timestamp.clone());
            cycle.restored_snapshot = restored_snapshot.clone();
        }
    }

    Ok(())
}

fn fold(events: &[AuditEvent]) -> Result<Vec<EvolutionCycle>, GovernanceError> {
    let mut cycles = Vec::new();
    let mut index = HashMap::new();
    for event in events {
        apply(&mut cycles, &mut index, event)?;
    }
    Ok(cycles)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCount {
    pub field: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCount {
    pub before: Option<String>,
    pub after: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTransitions {
    pub field: String,
    pub transitions: Vec<TransitionCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCount {
    pub item: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditAnalysis {
    pub total_cycles: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub reverted: usize,
    pub completion_rate: f64,
    pub reversion_rate: f64,
    pub total_changes: usize,
    pub field_changes: Vec<FieldCount>,
    pub common_transitions: Vec<FieldTransitions>,
    pub cycles_by_trigger: BTreeMap<String, usize>,
    pub most_changed_items: Vec<ItemCount>,
}

impl AuditAnalysis {
    pub fn from_cycles(cycles: &[EvolutionCycle]) -> Self {
        let total_cycles = cycles.len();
        let count_status = |status: CycleStatus| {
            cycles
                .iter()
                .filter(|cycle| cycle.status == status)
                .count()
        };
        let completed = count_status(CycleStatus::Completed);
        let reverted = count_status(CycleStatus::Reverted);
        let rate = |count: usize| {
            if total_cycles == 0 {
                0.0
            } else {
                count as f64 / total_cycles as f64
            }
        };

        let mut fields = BTreeMap::<&str, usize>::new();
        let mut transitions =
            BTreeMap::<&str, BTreeMap<(Option<&str>, Option<&str>), usize>>::new();
        let mut items = BTreeMap::<&str, usize>::new();
        let mut cycles_by_trigger = BTreeMap::new();
        let mut total_changes = 0;

        for cycle in cycles {
            *cycles_by_trigger
                .entry(cycle.trigger.as_str().to_owned())
                .or_insert(0) += 1;
            for change in &cycle.changes {
                total_changes += 1;
                *fields.entry(change.field.as_str()).or_insert(0) += 1;
                *items.entry(change.item.as_str()).or_insert(0) += 1;
                *transitions
                    .entry(change.field.as_str())
                    .or_default()
                    .entry((change.before.as_deref(), change.after.as_deref()))
                    .or_insert(0) += 1;
            }
        }

        let mut field_changes: Vec<FieldCount> = fields
            .into_iter()
            .map(|(field, count)| FieldCount {
                field: field.to_owned(),
                count,
            })
            .collect();
        field_changes.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.field.cmp(&right.field))
        });

        let common_transitions = field_changes
            .iter()
            .map(|entry| {
                let mut top: Vec<TransitionCount> = transitions
                    .get(entry.field.as_str())
                    .into_iter()
                    .flatten()
                    .map(|((before, after), count)| TransitionCount {
                        before: before.map(str::to_owned),
                        after: after.map(str::to_owned),
                        count: *count,
                    })
                    .collect();
                top.sort_by(|left, right| right.count.cmp(&left.count));
                top.truncate(TOP_TRANSITIONS);
                FieldTransitions {
                    field: entry.field.clone(),
                    transitions: top,
                }
            })
            .collect();

        let mut most_changed_items: Vec<ItemCount> = items
            .into_iter()
            .map(|(item, count)| ItemCount {
                item: item.to_owned(),
                count,
            })
            .collect();
        most_changed_items.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.item.cmp(&right.item))
        });
        most_changed_items.truncate(TOP_ITEMS);

        Self {
            total_cycles,
            in_progress: count_status(CycleStatus::InProgress),
            completed,
            reverted,
            completion_rate: rate(completed),
            reversion_rate: rate(reverted),
            total_changes,
            field_changes,
            common_transitions,
            cycles_by_trigger,
            most_changed_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub cycle: String,
    pub started_at: String,
    pub changes: usize,
    pub status: CycleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub events: usize,
    pub valid: bool,
    pub first_broken_seq: Option<u64>,
    pub reason: Option<String>,
}

/// Append-only evolution audit log stored as hash-chained JSON Lines.
///
/// Cycles are never stored directly; they are folded from the event stream on
/// every read. Mutations hold an exclusive lock for the whole
/// read-validate-append sequence, so two writers racing on the same cycle are
/// serialized and the second one validates against the first one's result.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    changelog_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            changelog_path: None,
        }
    }

    pub fn with_changelog(mut self, path: impl Into<PathBuf>) -> Self {
        self.changelog_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn record_cycle_start(
        &self,
        cycle_id: &str,
        trigger: CycleTrigger,
        capability_changes: &str,
    ) -> Result<EvolutionCycle, GovernanceError> {
        let cycle_id = cycle_id.trim();
        if cycle_id.is_empty() {
            return Err(GovernanceError::InvalidChange {
                cycle_id: cycle_id.to_owned(),
                reason: "cycle id must not be empty".to_owned(),
            });
        }

        let cycle = self.mutate(
            cycle_id,
            vec![AuditEventKind::CycleStarted {
                trigger,
                capability_changes: capability_changes.trim().to_owned(),
            }],
        )?;
        info!(cycle_id = %cycle_id, trigger = trigger.as_str(), "recorded evolution cycle start");
        Ok(cycle)
    }

    pub fn append_change(
        &self,
        cycle_id: &str,
        change: ChangeRecord,
    ) -> Result<EvolutionCycle, GovernanceError> {
        self.append_changes(cycle_id, vec![change])
    }

    /// Appends several changes atomically: either all are recorded or none.
    pub fn append_changes(
        &self,
        cycle_id: &str,
        changes: Vec<ChangeRecord>,
    ) -> Result<EvolutionCycle, GovernanceError> {
        for change in &changes {
            if change.item.trim().is_empty() || change.field.trim().is_empty() {
                return Err(GovernanceError::InvalidChange {
                    cycle_id: cycle_id.to_owned(),
                    reason: "item and field must not be empty".to_owned(),
                });
            }
        }

        let count = changes.len();
        let events = changes
            .into_iter()
            .map(|change| AuditEventKind::ChangeAppended { change })
            .collect();
        let cycle = self.mutate(cycle_id, events)?;
        info!(cycle_id = %cycle_id, changes = count, "appended evolution changes");
        Ok(cycle)
    }

    pub fn link_snapshot(
        &self,
        cycle_id: &str,
        snapshot_id: &str,
    ) -> Result<EvolutionCycle, GovernanceError> {
        let cycle = self.mutate(
            cycle_id,
            vec![AuditEventKind::SnapshotLinked {
                snapshot_id: snapshot_id.trim().to_owned(),
            }],
        )?;
        info!(cycle_id = %cycle_id, snapshot_id = %snapshot_id, "linked snapshot to cycle");
        Ok(cycle)
    }

    pub fn complete(
        &self,
        cycle_id: &str,
        review_reference: &str,
    ) -> Result<EvolutionCycle, GovernanceError> {
        let cycle = self.mutate(
            cycle_id,
            vec![AuditEventKind::Completed {
                review_reference: review_reference.trim().to_owned(),
            }],
        )?;
        info!(cycle_id = %cycle_id, "completed evolution cycle");
        Ok(cycle)
    }

    pub fn revert(
        &self,
        cycle_id: &str,
        reason: &str,
        restored_snapshot: Option<&str>,
    ) -> Result<EvolutionCycle, GovernanceError> {
        let cycle = self.mutate(
            cycle_id,
            vec![AuditEventKind::Reverted {
                reason: reason.trim().to_owned(),
                restored_snapshot: restored_snapshot.map(|value| value.trim().to_owned()),
            }],
        )?;
        warn!(cycle_id = %cycle_id, reason = %reason, "reverted evolution cycle");
        Ok(cycle)
    }

    /// All cycles in the order they were started.
    pub fn cycles(&self) -> Result<Vec<EvolutionCycle>, GovernanceError> {
        fold(&self.history()?)
    }

    pub fn cycle(&self, cycle_id: &str) -> Result<EvolutionCycle, GovernanceError> {
        self.cycles()?
            .into_iter()
            .find(|cycle| cycle.id == cycle_id)
            .ok_or_else(|| GovernanceError::CycleNotFound(cycle_id.to_owned()))
    }

    pub fn history(&self) -> Result<Vec<AuditEvent>, GovernanceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for (line_index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent =
                serde_json::from_str(line).map_err(|err| GovernanceError::CorruptLog {
                    path: self.path.display().to_string(),
                    line: line_index + 1,
                    reason: err.to_string(),
                })?;
            events.push(event);
        }
        Ok(events)
    }

    pub fn analyze(&self) -> Result<AuditAnalysis, GovernanceError> {
        Ok(AuditAnalysis::from_cycles(&self.cycles()?))
    }

    pub fn timeline(&self) -> Result<Vec<TimelineEntry>, GovernanceError> {
        Ok(self
            .cycles()?
            .into_iter()
            .map(|cycle| TimelineEntry {
                changes: cycle.changes.len(),
                cycle: cycle.id,
                started_at: cycle.started_at,
                status: cycle.status,
            })
            .collect())
    }

    pub fn export_timeline(&self, output: &Path) -> Result<Vec<TimelineEntry>, GovernanceError> {
        let timeline = self.timeline()?;
        let mut json = serde_json::to_string_pretty(&timeline)?;
        json.push('\n');
        write_atomic(output, json.as_bytes())?;
        Ok(timeline)
    }

    /// Walks the hash chain and reports the first event that does not link up.
    pub fn verify(&self) -> Result<ChainReport, GovernanceError> {
        let events = self.history()?;
        let mut previous = GENESIS_HASH.to_owned();

        for (position, event) in events.iter().enumerate() {
            let expected_seq = position as u64 + 1;
            let problem = if event.seq != expected_seq {
                Some(format!("expected sequence {expected_seq}, found {}", event.seq))
            } else if event.prev_hash != previous {
                Some("previous hash does not match the preceding event".to_owned())
            } else if event.compute_hash()? != event.hash {
                Some("event content does not match its hash".to_owned())
            } else {
                None
            };

            if let Some(reason) = problem {
                return Ok(ChainReport {
                    events: events.len(),
                    valid: false,
                    first_broken_seq: Some(event.seq),
                    reason: Some(reason),
                });
            }
            previous = event.hash.clone();
        }

        Ok(ChainReport {
            events: events.len(),
            valid: true,
            first_broken_seq: None,
            reason: None,
        })
    }

    pub fn regenerate_changelog(&self) -> Result<Option<PathBuf>, GovernanceError> {
        let Some(path) = self.changelog_path.as_ref() else {
            return Ok(None);
        };

        let markdown = render_changelog(&self.cycles()?);
        write_atomic(path, markdown.as_bytes())?;
        Ok(Some(path.clone()))
    }

    fn mutate(
        &self,
        cycle_id: &str,
        kinds: Vec<AuditEventKind>,
    ) -> Result<EvolutionCycle, GovernanceError> {
        let _lock = FileLock::acquire(&self.path)?;

        let events = self.history()?;
        let mut cycles = Vec::new();
        let mut index = HashMap::new();
        for event in &events {
            apply(&mut cycles, &mut index, event).map_err(|err| GovernanceError::CorruptLog {
                path: self.path.display().to_string(),
                line: event.seq as usize,
                reason: err.to_string(),
            })?;
        }

        if kinds.is_empty() {
            // Nothing to append, but the target still has to accept changes.
            let position = index
                .get(cycle_id)
                .copied()
                .ok_or_else(|| GovernanceError::CycleNotFound(cycle_id.to_owned()))?;
            let cycle = cycles.swap_remove(position);
            if cycle.status != CycleStatus::InProgress {
                return Err(GovernanceError::CycleNotInProgress {
                    cycle_id: cycle.id,
                    status: cycle.status,
                });
            }
            return Ok(cycle);
        }

        let mut seq = events.last().map(|event| event.seq).unwrap_or(0);
        let mut prev_hash = events
            .last()
            .map(|event| event.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_owned());
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut pending = String::new();
        for kind in kinds {
            seq += 1;
            let mut event = AuditEvent {
                seq,
                timestamp: timestamp.clone(),
                cycle_id: cycle_id.to_owned(),
                event: kind,
                prev_hash: prev_hash.clone(),
                hash: String::new(),
            };
            event.hash = event.compute_hash()?;
            apply(&mut cycles, &mut index, &event)?;

            pending.push_str(&serde_json::to_string(&event)?);
            pending.push('\n');
            prev_hash = event.hash;
        }

        self.append_lines(pending.as_bytes())?;

        if let Err(err) = self.regenerate_changelog() {
            warn!(error = %err, "audit log updated but changelog regeneration failed");
        }

        let position = index
            .get(cycle_id)
            .copied()
            .ok_or_else(|| GovernanceError::CycleNotFound(cycle_id.to_owned()))?;
        Ok(cycles.swap_remove(position))
    }

    fn append_lines(&self, bytes: &[u8]) -> Result<(), GovernanceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let original_len = file.metadata()?.len();

        let written = file.write_all(bytes).and_then(|()| file.sync_all());
        if let Err(err) = written {
            if let Err(truncate_err) = file.set_len(original_len) {
                warn!(error = %truncate_err, "failed to truncate partial audit append");
            }
            return Err(err.into());
        }
        Ok(())
    }
}
