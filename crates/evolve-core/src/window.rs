use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;
const SECONDS_PER_MONTH: i64 = 30 * SECONDS_PER_DAY;
const SECONDS_PER_YEAR: i64 = 365 * SECONDS_PER_DAY;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time window '{input}': {reason}")]
pub struct InvalidTimeWindow {
    pub input: String,
    pub reason: String,
}

impl InvalidTimeWindow {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Inclusive bounds in unix seconds. `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub label: String,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
            label: "all".to_owned(),
        }
    }

    pub fn since(input: &str, now: i64) -> Result<Self, InvalidTimeWindow> {
        Self::between(input, None, now)
    }

    pub fn between(
        since: &str,
        until: Option<&str>,
        now: i64,
    ) -> Result<Self, InvalidTimeWindow> {
        let start = parse_boundary(since, now)?;
        let end = match until {
            Some(raw) => parse_boundary(raw, now)?,
            None => None,
        };

        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(InvalidTimeWindow::new(
                since,
                "window start is after its end",
            ));
        }

        let label = match until {
            Some(raw) => format!("{} .. {}", since.trim(), raw.trim()),
            None => since.trim().to_owned(),
        };

        Ok(Self {
            since: start,
            until: end,
            label,
        })
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        !self.is_before_start(timestamp) && !self.is_after_end(timestamp)
    }

    pub fn is_before_start(&self, timestamp: i64) -> bool {
        self.since.is_some_and(|since| timestamp < since)
    }

    pub fn is_after_end(&self, timestamp: i64) -> bool {
        self.until.is_some_and(|until| timestamp > until)
    }
}

/// Parses one window boundary into unix seconds.
///
/// Accepted forms: `3 months ago`, `90d`, `2026-01-01`, RFC 3339 timestamps,
/// `now`, and `all` (no bound).
pub fn parse_boundary(input: &str, now: i64) -> Result<Option<i64>, InvalidTimeWindow> {
    let trimmed = input.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(InvalidTimeWindow::new(input, "window must not be empty"));
    }

    match trimmed.as_str() {
        "all" | "forever" => return Ok(None),
        "now" => return Ok(Some(now)),
        _ => {}
    }

    if let Some(relative) = trimmed.strip_suffix(" ago") {
        let seconds = parse_relative(relative).map_err(|reason| InvalidTimeWindow::new(input, reason))?;
        return Ok(Some(now.saturating_sub(seconds)));
    }

    if let Some(seconds) = parse_compact(&trimmed) {
        return Ok(Some(now.saturating_sub(seconds)));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d") {
        let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
            return Err(InvalidTimeWindow::new(input, "date has no midnight"));
        };
        return Ok(Some(midnight.and_utc().timestamp()));
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(Some(timestamp.timestamp()));
    }

    Err(InvalidTimeWindow::new(
        input,
        "expected '<n> <unit> ago', '<n><d|h|m|s|w|y>', YYYY-MM-DD, RFC 3339, or 'all'",
    ))
}

fn parse_relative(relative: &str) -> Result<i64, String> {
    let mut parts = relative.split_whitespace();
    let amount = parts
        .next()
        .ok_or_else(|| "missing amount".to_owned())?;
    let unit = parts.next().ok_or_else(|| "missing unit".to_owned())?;
    if parts.next().is_some() {
        return Err("unexpected trailing words".to_owned());
    }

    let amount = amount
        .parse::<i64>()
        .map_err(|_| format!("invalid amount '{amount}'"))?;
    if amount < 0 {
        return Err("amount must not be negative".to_owned());
    }

    let unit_seconds = match unit.trim_end_matches('s') {
        "second" | "sec" => 1,
        "minute" | "min" => SECONDS_PER_MINUTE,
        "hour" => SECONDS_PER_HOUR,
        "day" => SECONDS_PER_DAY,
        "week" => SECONDS_PER_WEEK,
        "month" => SECONDS_PER_MONTH,
        "year" => SECONDS_PER_YEAR,
        other => return Err(format!("unknown unit '{other}'")),
    };

    Ok(amount.saturating_mul(unit_seconds))
}

fn parse_compact(value: &str) -> Option<i64> {
    if value.len() < 2 {
        return None;
    }

    let unit = value.chars().last()?;
    let amount = value[..value.len() - unit.len_utf8()].parse::<i64>().ok()?;
    if amount < 0 {
        return None;
    }

    let unit_seconds = match unit {
        's' => 1,
        'm' => SECONDS_PER_MINUTE,
        'h' => SECONDS_PER_HOUR,
        'd' => SECONDS_PER_DAY,
        'w' => SECONDS_PER_WEEK,
        'y' => SECONDS_PER_YEAR,
        _ => return None,
    };

    Some(amount.saturating_mul(unit_seconds))
}
