use crate::assigner::{ScheduleAssigner, ScheduleOutcome};
use crate::clock::Clock;
use crate::error::ScheduleError;
use crate::interval::StoredInterval;
use crate::operation::{Operation, ScheduledOperation};
use std::collections::BTreeSet;
use std::io;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("no schedule stored")]
    NotFound,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The row store the scheduler reads from and hands results back to.
pub trait ScheduleStore {
    /// Operations of a plan, in no particular order.
    fn load_operations(&self, plan_id: &str) -> PersistenceResult<Vec<Operation>>;

    /// Committed busy time on the given machines, as stored. Entries that
    /// belong to `exclude_plan` are left out so a plan can be regenerated
    /// over its own previous schedule.
    fn load_busy_intervals(
        &self,
        machine_ids: &[String],
        exclude_plan: Option<&str>,
    ) -> PersistenceResult<Vec<StoredInterval>>;

    /// Drop every stored entry of the plan and write `scheduled` in its place,
    /// all or nothing.
    fn replace_plan_schedule(
        &self,
        plan_id: &str,
        scheduled: &[ScheduledOperation],
    ) -> PersistenceResult<()>;
}

/// Rebuild one plan's schedule against a store.
///
/// Everything is loaded and computed before the store is written, so a
/// rejected run leaves the previous schedule untouched.
pub fn regenerate_plan<S, C>(
    store: &S,
    plan_id: &str,
    assigner: &ScheduleAssigner<C>,
) -> PersistenceResult<ScheduleOutcome>
where
    S: ScheduleStore + ?Sized,
    C: Clock,
{
    let operations = store.load_operations(plan_id)?;
    let machine_ids: Vec<String> = operations
        .iter()
        .map(|op| op.machine_id.trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let prior = store.load_busy_intervals(&machine_ids, Some(plan_id))?;
    let outcome = assigner.assign_stored(operations, &prior)?;
    store.replace_plan_schedule(plan_id, &outcome.operations)?;
    info!(
        plan_id,
        operations = outcome.operations.len(),
        "plan schedule persisted"
    );
    Ok(outcome)
}

pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    load_busy_intervals_from_csv, load_operations_from_csv, load_production_from_json,
    load_window_config, save_production_to_json, save_schedule_to_csv, save_window_config,
};
