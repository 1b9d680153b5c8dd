//! Busy intervals: time a machine is already committed to.
//!
//! Storage hands intervals back as raw text ([`StoredInterval`]). Legacy rows
//! with unusable timestamps are skipped with a warning instead of failing the
//! whole run.

use crate::operation::ScheduledOperation;
use crate::window::Timestamp;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Half-open `[start, end)` occupation of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub machine_id: String,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl BusyInterval {
    pub fn new(machine_id: impl Into<String>, start: Timestamp, end: Timestamp) -> Self {
        Self {
            machine_id: machine_id.into(),
            start,
            end,
            plan_id: None,
            operation_id: None,
        }
    }

    /// The same interval with surrounding whitespace stripped from the
    /// machine id, matching how operations name their machine.
    pub fn trimmed(mut self) -> Self {
        let machine_id = self.machine_id.trim();
        if machine_id.len() != self.machine_id.len() {
            self.machine_id = machine_id.to_string();
        }
        self
    }

    pub fn is_well_formed(&self) -> bool {
        !self.machine_id.trim().is_empty() && self.end > self.start
    }

    #[inline]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }

    #[inline]
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start < end && start < self.end
    }
}

impl From<&ScheduledOperation> for BusyInterval {
    fn from(scheduled: &ScheduledOperation) -> Self {
        Self {
            machine_id: scheduled.machine_id().to_string(),
            start: scheduled.assigned_start,
            end: scheduled.assigned_end,
            plan_id: Some(scheduled.plan_id().to_string()),
            operation_id: Some(scheduled.id().to_string()),
        }
    }
}

/// A busy interval as a row-oriented store returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInterval {
    pub machine_id: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub operation_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalParseError {
    #[error("missing machine id")]
    MissingMachine,
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
    #[error("interval ends at {end} which is not after its start {start}")]
    Empty { start: String, end: String },
}

impl StoredInterval {
    pub fn parse(&self) -> Result<BusyInterval, IntervalParseError> {
        let machine_id = self.machine_id.trim();
        if machine_id.is_empty() {
            return Err(IntervalParseError::MissingMachine);
        }
        let start = parse_rfc3339(&self.start)?;
        let end = parse_rfc3339(&self.end)?;
        if end <= start {
            return Err(IntervalParseError::Empty {
                start: self.start.clone(),
                end: self.end.clone(),
            });
        }
        Ok(BusyInterval {
            machine_id: machine_id.to_string(),
            start,
            end,
            plan_id: non_empty(&self.plan_id),
            operation_id: non_empty(&self.operation_id),
        })
    }
}

impl From<&BusyInterval> for StoredInterval {
    fn from(interval: &BusyInterval) -> Self {
        Self {
            machine_id: interval.machine_id.clone(),
            start: interval.start.to_rfc3339(),
            end: interval.end.to_rfc3339(),
            plan_id: interval.plan_id.clone().unwrap_or_default(),
            operation_id: interval.operation_id.clone().unwrap_or_default(),
        }
    }
}

/// Parse every stored record, dropping the ones that cannot be used.
///
/// Returns the usable intervals and the number of skipped records.
pub fn parse_stored_intervals(records: &[StoredInterval]) -> (Vec<BusyInterval>, usize) {
    let mut intervals = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for (idx, record) in records.iter().enumerate() {
        match record.parse() {
            Ok(interval) => intervals.push(interval),
            Err(err) => {
                skipped += 1;
                warn!(
                    record = idx,
                    machine_id = %record.machine_id,
                    error = %err,
                    "skipping malformed busy interval"
                );
            }
        }
    }
    (intervals, skipped)
}

fn parse_rfc3339(input: &str) -> Result<Timestamp, IntervalParseError> {
    DateTime::parse_from_rfc3339(input.trim())
        .map_err(|_| IntervalParseError::Timestamp(input.to_string()))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
