use crate::window::{Timestamp, WorkWindow, duration_to_hours, hours_to_duration};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One unit of manufacturing work inside a production plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub plan_id: String,
    /// Process order within the plan. Ties keep input order.
    pub sequence: i32,
    pub machine_id: String,
    /// Setup + run + cleanup, already summed by whoever built the operation.
    pub duration_hours: f64,
    /// Earliest start the caller asks for. Never scheduled earlier than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_start: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Operation {
    pub fn new(
        id: impl Into<String>,
        plan_id: impl Into<String>,
        sequence: i32,
        machine_id: impl Into<String>,
        duration_hours: f64,
    ) -> Self {
        Self {
            id: id.into(),
            plan_id: plan_id.into(),
            sequence,
            machine_id: machine_id.into(),
            duration_hours,
            declared_start: None,
            name: None,
        }
    }

    /// Build an operation from its setup, run and cleanup times.
    pub fn from_components(
        id: impl Into<String>,
        plan_id: impl Into<String>,
        sequence: i32,
        machine_id: impl Into<String>,
        setup_hours: f64,
        run_hours: f64,
        cleanup_hours: f64,
    ) -> Self {
        Self::new(
            id,
            plan_id,
            sequence,
            machine_id,
            setup_hours + run_hours + cleanup_hours,
        )
    }

    pub fn with_declared_start(mut self, start: Timestamp) -> Self {
        self.declared_start = Some(start);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Duration rounded to whole seconds, the unit all scheduling math uses.
    pub fn duration(&self) -> Duration {
        hours_to_duration(self.duration_hours)
    }
}

/// An operation with its assigned slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    #[serde(flatten)]
    pub operation: Operation,
    pub assigned_start: Timestamp,
    pub assigned_end: Timestamp,
}

impl ScheduledOperation {
    pub fn id(&self) -> &str {
        &self.operation.id
    }

    pub fn plan_id(&self) -> &str {
        &self.operation.plan_id
    }

    pub fn machine_id(&self) -> &str {
        &self.operation.machine_id
    }

    pub fn sequence(&self) -> i32 {
        self.operation.sequence
    }

    pub fn assigned_hours(&self) -> f64 {
        duration_to_hours(self.assigned_end - self.assigned_start)
    }

    /// Window day the operation runs on.
    pub fn day(&self, window: &WorkWindow) -> NaiveDate {
        window.window_day(self.assigned_start)
    }

    pub fn overlaps(&self, other: &ScheduledOperation) -> bool {
        self.assigned_start < other.assigned_end && other.assigned_start < self.assigned_end
    }
}
