//! The schedule assigner: walks a plan's operations in process order and
//! gives each one a concrete slot.
//!
//! For every operation the candidate start is seeded from its declared start,
//! the previous operation's end, or the current window start, in that order,
//! and never earlier than the previous operation's end. The candidate then
//! moves forward until every constraint holds at once:
//!
//! - the whole operation fits inside one day's window,
//! - in [`AssignmentMode::MachineAware`], it does not touch any busy interval
//!   of its machine,
//! - the day still has enough capacity left for it.
//!
//! Each failed check moves the candidate strictly forward (to the end of the
//! blocking interval or to the next window start). Because validation
//! guarantees no operation is longer than the window, a fresh day always
//! accepts it and the search ends.

use crate::availability::MachineAvailability;
use crate::capacity::{CapacityBucket, DailyCapacity};
use crate::clock::{Clock, SystemClock};
use crate::error::ScheduleResult;
use crate::interval::{BusyInterval, StoredInterval, parse_stored_intervals};
use crate::machine::MachineRegistry;
use crate::operation::{Operation, ScheduledOperation};
use crate::sequencer::{ChainCursor, OperationSequencer};
use crate::validation;
use crate::window::{Timestamp, WindowConfig, WorkWindow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How strictly machines are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Per-machine busy intervals are consulted, so a machine is never
    /// double-booked.
    #[default]
    MachineAware,
    /// No per-machine interval lookup; only one capacity bucket shared by the
    /// whole run. Two operations on the same machine, or an operation and an
    /// already committed interval, can overlap. Only fit for looking at a
    /// single plan in isolation (print previews and the like).
    Simplified,
}

impl AssignmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMode::MachineAware => "machine_aware",
            AssignmentMode::Simplified => "simplified",
        }
    }

    pub fn enforces_machine_intervals(&self) -> bool {
        matches!(self, AssignmentMode::MachineAware)
    }
}

impl fmt::Display for AssignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "machine_aware" | "machine-aware" | "machine" | "aware" => {
                Ok(AssignmentMode::MachineAware)
            }
            "simplified" | "simple" => Ok(AssignmentMode::Simplified),
            other => Err(format!("unknown assignment mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub mode: AssignmentMode,
    pub operation_count: usize,
    pub machine_count: usize,
    pub first_start: Option<Timestamp>,
    pub last_end: Option<Timestamp>,
    /// Operations that ended up on a later day than their seed.
    pub rolled_operations: usize,
    /// Prior busy intervals dropped as malformed.
    pub skipped_intervals: usize,
}

impl ScheduleSummary {
    pub fn to_cli_summary(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("mode={}", self.mode));
        parts.push(format!("operations={}", self.operation_count));
        parts.push(format!("machines={}", self.machine_count));
        if let Some(start) = self.first_start {
            parts.push(format!("start={}", start.format("%Y-%m-%d %H:%M")));
        }
        if let Some(end) = self.last_end {
            parts.push(format!("finish={}", end.format("%Y-%m-%d %H:%M")));
        }
        if self.rolled_operations > 0 {
            parts.push(format!("rolled={}", self.rolled_operations));
        }
        if self.skipped_intervals > 0 {
            parts.push(format!("skipped_intervals={}", self.skipped_intervals));
        }
        parts.join(", ")
    }
}

/// Result of one run, ready to hand to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    /// Scheduled operations in process order.
    pub operations: Vec<ScheduledOperation>,
    /// Busy intervals produced by this run, one per operation.
    pub new_intervals: Vec<BusyInterval>,
    pub summary: ScheduleSummary,
}

#[derive(Debug, Clone)]
pub struct ScheduleAssigner<C = SystemClock> {
    window: WorkWindow,
    mode: AssignmentMode,
    clock: C,
    registry: Option<MachineRegistry>,
}

impl ScheduleAssigner<SystemClock> {
    pub fn new(window: WorkWindow) -> Self {
        Self {
            window,
            mode: AssignmentMode::default(),
            clock: SystemClock,
            registry: None,
        }
    }

    pub fn from_config(config: &WindowConfig) -> ScheduleResult<Self> {
        Ok(Self::new(WorkWindow::from_config(config)?))
    }
}

impl<C: Clock> ScheduleAssigner<C> {
    pub fn with_mode(mut self, mode: AssignmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_clock<D: Clock>(self, clock: D) -> ScheduleAssigner<D> {
        ScheduleAssigner {
            window: self.window,
            mode: self.mode,
            clock,
            registry: self.registry,
        }
    }

    /// Reject operations whose machine is not in `registry`.
    pub fn with_registry(mut self, registry: MachineRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn window(&self) -> &WorkWindow {
        &self.window
    }

    pub fn mode(&self) -> AssignmentMode {
        self.mode
    }

    /// Schedule with prior intervals still in storage form; unusable records
    /// are skipped.
    pub fn assign_stored(
        &self,
        operations: Vec<Operation>,
        prior: &[StoredInterval],
    ) -> ScheduleResult<ScheduleOutcome> {
        validation::validate_operations(&operations, &self.window, self.registry.as_ref())?;
        let (usable, skipped) = parse_stored_intervals(prior);
        Ok(self.run(operations, usable, skipped))
    }

    pub fn assign(
        &self,
        operations: Vec<Operation>,
        prior: &[BusyInterval],
    ) -> ScheduleResult<ScheduleOutcome> {
        validation::validate_operations(&operations, &self.window, self.registry.as_ref())?;
        let mut skipped = 0;
        let mut usable = Vec::with_capacity(prior.len());
        for interval in prior {
            if interval.is_well_formed() {
                usable.push(interval.clone().trimmed());
            } else {
                skipped += 1;
                warn!(
                    machine_id = %interval.machine_id,
                    start = %interval.start,
                    end = %interval.end,
                    "skipping malformed busy interval"
                );
            }
        }
        Ok(self.run(operations, usable, skipped))
    }

    fn run(
        &self,
        operations: Vec<Operation>,
        prior: Vec<BusyInterval>,
        skipped_intervals: usize,
    ) -> ScheduleOutcome {
        let machine_aware = self.mode.enforces_machine_intervals();
        let mut capacity = DailyCapacity::for_window(&self.window);
        let mut availability = MachineAvailability::new();
        if machine_aware {
            for interval in &prior {
                let bucket = CapacityBucket::Machine(interval.machine_id.clone());
                capacity.absorb(&bucket, interval, &self.window);
            }
            availability = MachineAvailability::from_intervals(prior);
        }

        let now = self.clock.now().with_timezone(&self.window.offset());
        let fallback = self.window.start_of_window(now);

        let sequencer = OperationSequencer::new(operations);
        let mut cursor = ChainCursor::new();
        let mut scheduled = Vec::with_capacity(sequencer.len());
        let mut new_intervals = Vec::with_capacity(sequencer.len());
        let mut machines = BTreeSet::new();
        let mut rolled_operations = 0;

        for (index, op) in sequencer.iter() {
            let mut operation = op.clone();
            operation.machine_id = operation.machine_id.trim().to_string();
            let length = operation.duration();
            let bucket = if machine_aware {
                CapacityBucket::Machine(operation.machine_id.clone())
            } else {
                CapacityBucket::Shared
            };

            let seed = cursor.seed(operation.declared_start, fallback);
            let seed_day = self.window.window_day(self.window.normalize(seed));
            let start = self.place(
                &availability,
                &capacity,
                &bucket,
                &operation.machine_id,
                seed,
                length,
            );
            let end = start + length;
            let day = self.window.window_day(start);
            if day > seed_day {
                rolled_operations += 1;
            }

            capacity.reserve(bucket, day, length);
            let scheduled_op = ScheduledOperation {
                operation,
                assigned_start: start,
                assigned_end: end,
            };
            let interval = BusyInterval::from(&scheduled_op);
            if machine_aware {
                availability.add_interval(interval.clone());
            }
            new_intervals.push(interval);
            machines.insert(scheduled_op.machine_id().to_string());

            debug!(
                input_index = index,
                operation_id = %scheduled_op.id(),
                machine_id = %scheduled_op.machine_id(),
                start = %start,
                end = %end,
                "operation assigned"
            );

            cursor.advance(end);
            scheduled.push(scheduled_op);
        }

        let summary = ScheduleSummary {
            mode: self.mode,
            operation_count: scheduled.len(),
            machine_count: machines.len(),
            first_start: scheduled.first().map(|op| op.assigned_start),
            last_end: cursor.prev_end(),
            rolled_operations,
            skipped_intervals,
        };
        info!(
            mode = %self.mode,
            operations = summary.operation_count,
            rolled = summary.rolled_operations,
            skipped_intervals = summary.skipped_intervals,
            "schedule assigned"
        );

        ScheduleOutcome {
            operations: scheduled,
            new_intervals,
            summary,
        }
    }

    fn place(
        &self,
        availability: &MachineAvailability,
        capacity: &DailyCapacity,
        bucket: &CapacityBucket,
        machine_id: &str,
        seed: Timestamp,
        length: Duration,
    ) -> Timestamp {
        let window = &self.window;
        let mut candidate = seed;
        loop {
            candidate = if self.mode.enforces_machine_intervals() {
                availability.earliest_fit(machine_id, candidate, length, window)
            } else {
                fit_in_window(window, candidate, length)
            };
            let day = window.window_day(candidate);
            if capacity.fits(bucket, day, length) {
                return candidate;
            }
            candidate = window.next_window_start(candidate);
        }
    }
}

fn fit_in_window(window: &WorkWindow, candidate: Timestamp, length: Duration) -> Timestamp {
    let mut candidate = window.normalize(candidate);
    while candidate + length > window.end_on(window.window_day(candidate)) {
        candidate = window.next_window_start(candidate);
    }
    candidate
}
