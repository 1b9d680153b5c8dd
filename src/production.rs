use crate::assigner::{AssignmentMode, ScheduleAssigner, ScheduleSummary};
use crate::clock::{Clock, SystemClock};
use crate::error::{ScheduleError, ScheduleResult};
use crate::interval::BusyInterval;
use crate::machine::MachineRegistry;
use crate::operation::{Operation, ScheduledOperation};
use crate::validation;
use crate::window::{WindowConfig, WorkWindow};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// In-memory production workspace: every plan's operations, the busy time
/// entered by hand, and the schedule committed for each plan.
///
/// `generate` follows the regenerate discipline: the plan's previous entries
/// are only replaced once a complete new schedule exists.
pub struct ProductionSchedule {
    window: WindowConfig,
    mode: AssignmentMode,
    registry: MachineRegistry,
    operations: Vec<Operation>,
    busy: Vec<BusyInterval>,
    committed: BTreeMap<String, Vec<ScheduledOperation>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for ProductionSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductionSchedule")
            .field("window", &self.window)
            .field("mode", &self.mode)
            .field("registry", &self.registry)
            .field("operations", &self.operations.len())
            .field("busy", &self.busy.len())
            .field("committed_plans", &self.committed.len())
            .finish()
    }
}

impl Default for ProductionSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionSchedule {
    pub fn new() -> Self {
        Self {
            window: WindowConfig::default(),
            mode: AssignmentMode::default(),
            registry: MachineRegistry::new(),
            operations: Vec::new(),
            busy: Vec::new(),
            committed: BTreeMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_window(window: WindowConfig) -> ScheduleResult<Self> {
        let mut schedule = Self::new();
        schedule.set_window_config(window)?;
        Ok(schedule)
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock + Send + Sync>) {
        self.clock = clock;
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    pub fn window_config(&self) -> &WindowConfig {
        &self.window
    }

    /// Only affects runs made after the change; committed entries stay put.
    pub fn set_window_config(&mut self, window: WindowConfig) -> ScheduleResult<()> {
        window.validate()?;
        self.window = window;
        Ok(())
    }

    pub fn mode(&self) -> AssignmentMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AssignmentMode) {
        self.mode = mode;
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn register_machine(&mut self, machine_id: impl Into<String>) -> bool {
        self.registry.register(machine_id)
    }

    pub fn plans(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .operations
            .iter()
            .map(|op| op.plan_id.as_str())
            .chain(self.committed.keys().map(String::as_str))
            .collect();
        ids.into_iter().map(ToOwned::to_owned).collect()
    }

    pub fn operations(&self, plan_id: &str) -> Vec<Operation> {
        self.operations
            .iter()
            .filter(|op| op.plan_id == plan_id)
            .cloned()
            .collect()
    }

    pub fn all_operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn find_operation(&self, plan_id: &str, operation_id: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.plan_id == plan_id && op.id == operation_id)
    }

    /// Insert or replace an operation, keyed by plan and operation id.
    ///
    /// Validated against the current window so obviously unschedulable
    /// operations are refused on entry. Machine references are only checked
    /// at generate time, when the registry is consulted.
    pub fn upsert_operation(&mut self, operation: Operation) -> ScheduleResult<()> {
        let window = WorkWindow::from_config(&self.window)?;
        let index = self
            .operations
            .iter()
            .position(|op| op.plan_id == operation.plan_id && op.id == operation.id);
        validation::validate_operation(
            index.unwrap_or(self.operations.len()),
            &operation,
            &window,
            None,
        )?;
        match index {
            Some(idx) => self.operations[idx] = operation,
            None => self.operations.push(operation),
        }
        Ok(())
    }

    pub fn delete_operation(&mut self, plan_id: &str, operation_id: &str) -> bool {
        let before = self.operations.len();
        self.operations
            .retain(|op| !(op.plan_id == plan_id && op.id == operation_id));
        before != self.operations.len()
    }

    pub fn busy_intervals(&self) -> &[BusyInterval] {
        &self.busy
    }

    pub fn add_busy_interval(&mut self, interval: BusyInterval) -> ScheduleResult<()> {
        let interval = interval.trimmed();
        if !interval.is_well_formed() {
            return Err(ScheduleError::InvalidInterval {
                machine_id: interval.machine_id.clone(),
                start: interval.start.to_rfc3339(),
                end: interval.end.to_rfc3339(),
            });
        }
        self.busy.push(interval);
        Ok(())
    }

    pub fn committed(&self, plan_id: &str) -> &[ScheduledOperation] {
        self.committed
            .get(plan_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_committed(&self) -> impl Iterator<Item = &ScheduledOperation> {
        self.committed.values().flatten()
    }

    pub fn clear_schedule(&mut self, plan_id: &str) -> bool {
        self.committed.remove(plan_id).is_some()
    }

    /// Busy time a run for `plan_id` must respect: hand-entered intervals plus
    /// every other plan's committed entries.
    pub fn prior_intervals(&self, plan_id: &str) -> Vec<BusyInterval> {
        self.busy
            .iter()
            .cloned()
            .chain(
                self.committed
                    .iter()
                    .filter(|(plan, _)| plan.as_str() != plan_id)
                    .flat_map(|(_, ops)| ops.iter().map(BusyInterval::from)),
            )
            .collect()
    }

    /// Regenerate the schedule of one plan. On error nothing changes.
    pub fn generate(&mut self, plan_id: &str) -> ScheduleResult<ScheduleSummary> {
        let mut assigner = ScheduleAssigner::from_config(&self.window)?
            .with_mode(self.mode)
            .with_clock(self.clock.clone());
        if !self.registry.is_empty() {
            assigner = assigner.with_registry(self.registry.clone());
        }

        let prior = self.prior_intervals(plan_id);
        let outcome = assigner.assign(self.operations(plan_id), &prior)?;
        info!(plan_id, summary = %outcome.summary.to_cli_summary(), "plan regenerated");

        if outcome.operations.is_empty() {
            self.committed.remove(plan_id);
        } else {
            self.committed
                .insert(plan_id.to_string(), outcome.operations);
        }
        Ok(outcome.summary)
    }

    pub(crate) fn from_parts(
        window: WindowConfig,
        mode: AssignmentMode,
        registry: MachineRegistry,
        operations: Vec<Operation>,
        busy: Vec<BusyInterval>,
        committed: Vec<ScheduledOperation>,
    ) -> Self {
        let mut by_plan: BTreeMap<String, Vec<ScheduledOperation>> = BTreeMap::new();
        for scheduled in committed {
            by_plan
                .entry(scheduled.plan_id().to_string())
                .or_default()
                .push(scheduled);
        }
        Self {
            window,
            mode,
            registry,
            operations,
            busy,
            committed: by_plan,
            clock: Arc::new(SystemClock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn failed_generate_keeps_previous_schedule() {
        let mut schedule = ProductionSchedule::new();
        schedule.set_clock(Arc::new(FixedClock(at("2025-03-10T05:00:00Z"))));
        schedule
            .upsert_operation(Operation::new("op1", "P1", 10, "M1", 4.0))
            .unwrap();
        schedule.generate("P1").unwrap();
        assert_eq!(schedule.committed("P1").len(), 1);

        schedule.register_machine("M2");
        let err = schedule.generate("P1").unwrap_err();
        assert!(err.is_missing_reference());
        assert_eq!(schedule.committed("P1").len(), 1);
    }
}
