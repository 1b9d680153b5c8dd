use super::{PersistenceError, PersistenceResult};
use crate::{
    AssignmentMode, BusyInterval, MachineRegistry, Operation, ProductionSchedule,
    ScheduledOperation, WindowConfig,
    interval::{StoredInterval, parse_stored_intervals},
    window::Timestamp,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::warn;

#[derive(Serialize, Deserialize)]
struct ProductionSnapshot {
    window: WindowConfig,
    #[serde(default)]
    mode: AssignmentMode,
    #[serde(default)]
    machines: MachineRegistry,
    operations: Vec<Operation>,
    #[serde(default)]
    busy_intervals: Vec<BusyInterval>,
    #[serde(default)]
    schedule: Vec<ScheduledOperation>,
}

impl ProductionSnapshot {
    fn from_production(production: &ProductionSchedule) -> Self {
        Self {
            window: production.window_config().clone(),
            mode: production.mode(),
            machines: production.registry().clone(),
            operations: production.all_operations().to_vec(),
            busy_intervals: production.busy_intervals().to_vec(),
            schedule: production.all_committed().cloned().collect(),
        }
    }

    fn into_production(self) -> PersistenceResult<ProductionSchedule> {
        self.window.validate()?;
        for interval in &self.busy_intervals {
            if !interval.is_well_formed() {
                return Err(PersistenceError::InvalidData(format!(
                    "busy interval on '{}' ends before it starts",
                    interval.machine_id
                )));
            }
        }
        let mut production = ProductionSchedule::from_parts(
            self.window,
            self.mode,
            self.machines,
            Vec::new(),
            self.busy_intervals,
            self.schedule,
        );
        for operation in self.operations {
            production.upsert_operation(operation)?;
        }
        Ok(production)
    }
}

pub fn save_production_to_json<P: AsRef<Path>>(
    production: &ProductionSchedule,
    path: P,
) -> PersistenceResult<()> {
    let snapshot = ProductionSnapshot::from_production(production);
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &snapshot)?;
    Ok(())
}

pub fn load_production_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<ProductionSchedule> {
    let file = File::open(path)?;
    let snapshot: ProductionSnapshot = serde_json::from_reader(file)?;
    snapshot.into_production()
}

pub fn save_window_config<P: AsRef<Path>>(config: &WindowConfig, path: P) -> PersistenceResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

pub fn load_window_config<P: AsRef<Path>>(path: P) -> PersistenceResult<WindowConfig> {
    let file = File::open(path)?;
    let config: WindowConfig = serde_json::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

#[derive(Default, Serialize, Deserialize)]
struct OperationCsvRecord {
    plan_id: String,
    id: String,
    sequence: i32,
    machine_id: String,
    #[serde(default)]
    duration_hours: String,
    #[serde(default)]
    setup_hours: String,
    #[serde(default)]
    run_hours: String,
    #[serde(default)]
    cleanup_hours: String,
    #[serde(default)]
    declared_start: String,
    #[serde(default)]
    name: String,
}

impl OperationCsvRecord {
    fn into_operation(self) -> PersistenceResult<Operation> {
        let mut operation = match parse_f64(&self.duration_hours)? {
            Some(hours) => Operation::new(
                self.id,
                self.plan_id,
                self.sequence,
                self.machine_id,
                hours,
            ),
            None => Operation::from_components(
                self.id,
                self.plan_id,
                self.sequence,
                self.machine_id,
                parse_f64(&self.setup_hours)?.unwrap_or(0.0),
                parse_f64(&self.run_hours)?.unwrap_or(0.0),
                parse_f64(&self.cleanup_hours)?.unwrap_or(0.0),
            ),
        };
        operation.declared_start = parse_timestamp(&self.declared_start)?;
        operation.name = parse_string_option(self.name);
        Ok(operation)
    }
}

/// Read operations from CSV. Either `duration_hours` or the
/// `setup_hours`/`run_hours`/`cleanup_hours` columns must be filled.
pub fn load_operations_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<Operation>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut operations = Vec::new();
    for record in reader.deserialize::<OperationCsvRecord>() {
        operations.push(record?.into_operation()?);
    }
    Ok(operations)
}

/// Read busy intervals from CSV (`machine_id,start,end[,plan_id,operation_id]`).
///
/// Rows that cannot be used are skipped; the count of skipped rows is
/// returned alongside the intervals.
pub fn load_busy_intervals_from_csv<P: AsRef<Path>>(
    path: P,
) -> PersistenceResult<(Vec<BusyInterval>, usize)> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let mut records = Vec::new();
    let mut unreadable = 0;
    for (row, record) in reader.deserialize::<StoredInterval>().enumerate() {
        match record {
            Ok(record) => records.push(record),
            Err(err) => {
                unreadable += 1;
                warn!(row, error = %err, "skipping unreadable busy interval row");
            }
        }
    }
    let (intervals, skipped) = parse_stored_intervals(&records);
    Ok((intervals, skipped + unreadable))
}

#[derive(Serialize, Deserialize)]
struct ScheduleCsvRecord {
    plan_id: String,
    operation_id: String,
    sequence: i32,
    machine_id: String,
    duration_hours: f64,
    assigned_start: String,
    assigned_end: String,
    name: String,
}

impl From<&ScheduledOperation> for ScheduleCsvRecord {
    fn from(scheduled: &ScheduledOperation) -> Self {
        Self {
            plan_id: scheduled.plan_id().to_string(),
            operation_id: scheduled.id().to_string(),
            sequence: scheduled.sequence(),
            machine_id: scheduled.machine_id().to_string(),
            duration_hours: scheduled.operation.duration_hours,
            assigned_start: scheduled.assigned_start.to_rfc3339(),
            assigned_end: scheduled.assigned_end.to_rfc3339(),
            name: scheduled.operation.name.clone().unwrap_or_default(),
        }
    }
}

pub fn save_schedule_to_csv<P: AsRef<Path>>(
    scheduled: &[ScheduledOperation],
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for entry in scheduled {
        writer.serialize(ScheduleCsvRecord::from(entry))?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_f64(input: &str) -> PersistenceResult<Option<f64>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    input
        .trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid float '{input}': {e}")))
}

fn parse_timestamp(input: &str) -> PersistenceResult<Option<Timestamp>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(input.trim())
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid timestamp '{input}': {e}")))
}

fn parse_string_option(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
