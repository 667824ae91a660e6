use chrono::{DateTime, Duration, Utc};
use evolve_config::TriggersConfig;
use serde::Serialize;

use crate::audit::EvolutionCycle;
use crate::validate::ItemReview;

const MAX_LISTED_STALE_ITEMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSeverity {
    Info,
    Medium,
    High,
}

impl TriggerSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleItem {
    pub id: String,
    pub last_reviewed: String,
    pub days_stale: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionTrigger {
    pub kind: &'static str,
    pub severity: TriggerSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_last: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stale_items: Vec<StaleItem>,
}

pub struct TriggerInputs<'a> {
    pub log_exists: bool,
    pub cycles: &'a [EvolutionCycle],
    pub reviews: &'a [ItemReview],
}

/// Checks whether an evolution cycle is due. Pure: it only reads its inputs.
pub fn detect_triggers(
    inputs: &TriggerInputs<'_>,
    config: &TriggersConfig,
    now: DateTime<Utc>,
) -> Vec<EvolutionTrigger> {
    let mut triggers = Vec::new();
    triggers.extend(calendar_trigger(inputs, config, now));
    triggers.extend(staleness_trigger(inputs.reviews, config, now));
    triggers
}

fn calendar_trigger(
    inputs: &TriggerInputs<'_>,
    config: &TriggersConfig,
    now: DateTime<Utc>,
) -> Option<EvolutionTrigger> {
    if !inputs.log_exists {
        return Some(EvolutionTrigger {
            kind: "first_evolution",
            severity: TriggerSeverity::Info,
            message: "No evolution cycles recorded yet. This is the first!".to_owned(),
            recommendation: None,
            days_since_last: None,
            stale_items: Vec::new(),
        });
    }

    let Some(last) = inputs.cycles.last() else {
        return Some(EvolutionTrigger {
            kind: "no_history",
            severity: TriggerSeverity::Info,
            message: "Evolution log is empty.".to_owned(),
            recommendation: None,
            days_since_last: None,
            stale_items: Vec::new(),
        });
    };

    let started = DateTime::parse_from_rfc3339(&last.started_at).ok()?;
    let days_since = (now - started.with_timezone(&Utc)).num_days();
    if days_since < i64::from(config.cycle_interval_days) {
        return None;
    }

    Some(EvolutionTrigger {
        kind: "calendar_trigger",
        severity: TriggerSeverity::High,
        message: format!(
            "It's been {days_since} days since last evolution (threshold: {} days)",
            config.cycle_interval_days
        ),
        recommendation: Some(format!("Schedule evolution now (last was {})", last.id)),
        days_since_last: Some(days_since),
        stale_items: Vec::new(),
    })
}

fn staleness_trigger(
    reviews: &[ItemReview],
    config: &TriggersConfig,
    now: DateTime<Utc>,
) -> Option<EvolutionTrigger> {
    let today = now.date_naive();
    let cutoff = today - Duration::days(i64::from(config.review_stale_days));

    let mut stale: Vec<StaleItem> = reviews
        .iter()
        .filter_map(|review| {
            let reviewed = review.last_reviewed?;
            (reviewed <= cutoff).then(|| StaleItem {
                id: review.id.clone(),
                last_reviewed: reviewed.format("%Y-%m-%d").to_string(),
                days_stale: (today - reviewed).num_days(),
            })
        })
        .collect();

    let threshold = reviews.len() as f64 * config.stale_ratio;
    if stale.is_empty() || (stale.len() as f64) <= threshold {
        return None;
    }

    let count = stale.len();
    stale.sort_by(|left, right| {
        right
            .days_stale
            .cmp(&left.days_stale)
            .then_with(|| left.id.cmp(&right.id))
    });
    stale.truncate(MAX_LISTED_STALE_ITEMS);

    Some(EvolutionTrigger {
        kind: "staleness_trigger",
        severity: TriggerSeverity::Medium,
        message: format!(
            "{count} items have stale reviews (>{} days old)",
            config.review_stale_days
        ),
        recommendation: Some(format!("Evolution cycle would update {count} items")),
        days_since_last: None,
        stale_items: stale,
    })
}
