use crate::error::{ScheduleError, ScheduleResult};
use crate::machine::MachineRegistry;
use crate::operation::Operation;
use crate::window::WorkWindow;
use chrono::Duration;
use std::collections::HashSet;

/// Reject inputs the assigner cannot schedule. Runs before any slot is
/// picked so a bad operation never leaves a half-built schedule behind.
pub fn validate_operation(
    index: usize,
    operation: &Operation,
    window: &WorkWindow,
    registry: Option<&MachineRegistry>,
) -> ScheduleResult<()> {
    let hours = operation.duration_hours;
    if !hours.is_finite() || hours < 0.0 || operation.duration() <= Duration::zero() {
        return Err(ScheduleError::InvalidDuration {
            index,
            operation_id: operation.id.clone(),
            hours,
        });
    }

    if operation.duration() > window.length() {
        return Err(ScheduleError::DurationExceedsWindow {
            index,
            operation_id: operation.id.clone(),
            machine_id: operation.machine_id.clone(),
            hours,
            window_hours: window.daily_hours(),
        });
    }

    let machine_id = operation.machine_id.trim();
    if machine_id.is_empty() {
        return Err(ScheduleError::MissingMachine {
            index,
            operation_id: operation.id.clone(),
        });
    }

    if let Some(registry) = registry {
        if !registry.contains(machine_id) {
            return Err(ScheduleError::UnknownMachine {
                index,
                operation_id: operation.id.clone(),
                machine_id: machine_id.to_string(),
            });
        }
    }

    Ok(())
}

pub fn validate_operations(
    operations: &[Operation],
    window: &WorkWindow,
    registry: Option<&MachineRegistry>,
) -> ScheduleResult<()> {
    let mut seen = HashSet::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        validate_operation(index, operation, window, registry)?;
        if !seen.insert((operation.plan_id.as_str(), operation.id.as_str())) {
            return Err(ScheduleError::DuplicateOperation {
                plan_id: operation.plan_id.clone(),
                operation_id: operation.id.clone(),
            });
        }
    }
    Ok(())
}
