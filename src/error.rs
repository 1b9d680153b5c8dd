//! Errors raised before a scheduling run starts.
//!
//! Scheduling itself never fails: once the inputs pass validation the
//! assigner always finds a slot by rolling forward. Everything here is a
//! caller mistake that retrying would not fix.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("daily window length must be greater than 0 and at most 24 hours (got {hours})")]
    InvalidWindowLength { hours: f64 },

    #[error("invalid window start time '{value}' (expected HH:MM)")]
    InvalidStartTime { value: String },

    #[error("utc offset of {minutes} minutes is out of range")]
    InvalidOffset { minutes: i32 },

    #[error("operation #{index} ({operation_id}) has invalid duration {hours}h")]
    InvalidDuration {
        index: usize,
        operation_id: String,
        hours: f64,
    },

    #[error(
        "operation #{index} ({operation_id}) needs {hours}h on machine {machine_id} but the daily window is only {window_hours}h"
    )]
    DurationExceedsWindow {
        index: usize,
        operation_id: String,
        machine_id: String,
        hours: f64,
        window_hours: f64,
    },

    #[error("operation #{index} ({operation_id}) has no machine assigned")]
    MissingMachine { index: usize, operation_id: String },

    #[error("operation #{index} ({operation_id}) references unknown machine {machine_id}")]
    UnknownMachine {
        index: usize,
        operation_id: String,
        machine_id: String,
    },

    #[error("operation {operation_id} appears more than once in plan {plan_id}")]
    DuplicateOperation {
        plan_id: String,
        operation_id: String,
    },

    #[error("busy interval on machine '{machine_id}' must end after it starts ({start} .. {end})")]
    InvalidInterval {
        machine_id: String,
        start: String,
        end: String,
    },
}

impl ScheduleError {
    /// Bad window or operation parameters.
    pub fn is_configuration(&self) -> bool {
        !self.is_missing_reference() && !matches!(self, ScheduleError::DuplicateOperation { .. })
    }

    /// The input points at a machine nobody knows about.
    pub fn is_missing_reference(&self) -> bool {
        matches!(
            self,
            ScheduleError::MissingMachine { .. } | ScheduleError::UnknownMachine { .. }
        )
    }
}

pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;
