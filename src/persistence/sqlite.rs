use super::{PersistenceError, PersistenceResult, ScheduleStore};
use crate::error::ScheduleError;
use crate::interval::{BusyInterval, StoredInterval};
use crate::operation::{Operation, ScheduledOperation};
use crate::window::{Timestamp, WindowConfig};
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Mutex, MutexGuard};

/// Row store backed by SQLite. Timestamps are kept as RFC 3339 text so the
/// offset they were written with survives a round trip.
pub struct SqliteScheduleStore {
    connection: Mutex<Connection>,
}

impl SqliteScheduleStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> PersistenceResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS window_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                config_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS operations (
                plan_id TEXT NOT NULL,
                operation_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                machine_id TEXT NOT NULL,
                duration_hours REAL NOT NULL,
                declared_start TEXT,
                name TEXT,
                PRIMARY KEY (plan_id, operation_id)
            );
            CREATE TABLE IF NOT EXISTS schedule_entries (
                plan_id TEXT NOT NULL,
                operation_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                machine_id TEXT NOT NULL,
                duration_hours REAL NOT NULL,
                declared_start TEXT,
                name TEXT,
                assigned_start TEXT NOT NULL,
                assigned_end TEXT NOT NULL,
                PRIMARY KEY (plan_id, operation_id)
            );
            CREATE INDEX IF NOT EXISTS schedule_entries_machine
                ON schedule_entries (machine_id);
            CREATE TABLE IF NOT EXISTS machine_busy (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                machine_id TEXT NOT NULL,
                start TEXT NOT NULL,
                end TEXT NOT NULL
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| PersistenceError::InvalidData("sqlite connection poisoned".into()))
    }

    pub fn save_window_config(&self, config: &WindowConfig) -> PersistenceResult<()> {
        config.validate()?;
        let json = serde_json::to_string(config)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM window_config", [])?;
        tx.execute(
            "INSERT INTO window_config (id, config_json) VALUES (1, ?1)",
            params![json],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_window_config(&self) -> PersistenceResult<Option<WindowConfig>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT config_json FROM window_config WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(json) = json else {
            return Ok(None);
        };
        let config: WindowConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Insert an operation or update it in place. An update keeps the row's
    /// original position among equal-sequence operations.
    pub fn upsert_operation(&self, operation: &Operation) -> PersistenceResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operations
                (plan_id, operation_id, sequence, machine_id, duration_hours, declared_start, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (plan_id, operation_id) DO UPDATE SET
                sequence = excluded.sequence,
                machine_id = excluded.machine_id,
                duration_hours = excluded.duration_hours,
                declared_start = excluded.declared_start,
                name = excluded.name",
            params![
                operation.plan_id,
                operation.id,
                operation.sequence,
                operation.machine_id,
                operation.duration_hours,
                operation.declared_start.map(|t| t.to_rfc3339()),
                operation.name,
            ],
        )?;
        Ok(())
    }

    pub fn delete_operation(&self, plan_id: &str, operation_id: &str) -> PersistenceResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM operations WHERE plan_id = ?1 AND operation_id = ?2",
            params![plan_id, operation_id],
        )?;
        Ok(removed > 0)
    }

    /// Busy time that does not come from any plan, such as maintenance.
    pub fn add_busy_interval(&self, interval: &BusyInterval) -> PersistenceResult<()> {
        check_busy(interval)?;
        let conn = self.lock()?;
        insert_busy(&conn, interval)?;
        Ok(())
    }

    /// Swap the whole set of plan-independent busy time.
    pub fn replace_busy_intervals(&self, intervals: &[BusyInterval]) -> PersistenceResult<()> {
        intervals.iter().try_for_each(check_busy)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM machine_busy", [])?;
        for interval in intervals {
            insert_busy(&tx, interval)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Committed entries of a plan, in process order.
    pub fn scheduled_operations(&self, plan_id: &str) -> PersistenceResult<Vec<ScheduledOperation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT plan_id, operation_id, sequence, machine_id, duration_hours, declared_start,
                    name, assigned_start, assigned_end
             FROM schedule_entries WHERE plan_id = ?1
             ORDER BY sequence ASC, assigned_start ASC",
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            Ok((
                operation_from_row(row)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut scheduled = Vec::new();
        for row in rows {
            let ((operation, declared), start, end) = row?;
            let mut operation = operation;
            operation.declared_start = parse_optional(declared)?;
            scheduled.push(ScheduledOperation {
                operation,
                assigned_start: parse_required(&start)?,
                assigned_end: parse_required(&end)?,
            });
        }
        Ok(scheduled)
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn load_operations(&self, plan_id: &str) -> PersistenceResult<Vec<Operation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT plan_id, operation_id, sequence, machine_id, duration_hours, declared_start, name
             FROM operations WHERE plan_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![plan_id], operation_from_row)?;

        let mut operations = Vec::new();
        for row in rows {
            let (mut operation, declared) = row?;
            operation.declared_start = parse_optional(declared)?;
            operations.push(operation);
        }
        Ok(operations)
    }

    fn load_busy_intervals(
        &self,
        machine_ids: &[String],
        exclude_plan: Option<&str>,
    ) -> PersistenceResult<Vec<StoredInterval>> {
        let conn = self.lock()?;
        let mut entries = conn.prepare(
            "SELECT machine_id, assigned_start, assigned_end, plan_id, operation_id
             FROM schedule_entries
             WHERE machine_id = ?1 AND (?2 IS NULL OR plan_id <> ?2)",
        )?;
        let mut manual =
            conn.prepare("SELECT machine_id, start, end FROM machine_busy WHERE trim(machine_id) = ?1")?;

        let mut intervals = Vec::new();
        for machine_id in machine_ids {
            let rows = entries.query_map(params![machine_id, exclude_plan], |row| {
                Ok(StoredInterval {
                    machine_id: row.get(0)?,
                    start: row.get(1)?,
                    end: row.get(2)?,
                    plan_id: row.get(3)?,
                    operation_id: row.get(4)?,
                })
            })?;
            for row in rows {
                intervals.push(row?);
            }

            let rows = manual.query_map(params![machine_id], |row| {
                Ok(StoredInterval {
                    machine_id: row.get(0)?,
                    start: row.get(1)?,
                    end: row.get(2)?,
                    ..StoredInterval::default()
                })
            })?;
            for row in rows {
                intervals.push(row?);
            }
        }
        Ok(intervals)
    }

    fn replace_plan_schedule(
        &self,
        plan_id: &str,
        scheduled: &[ScheduledOperation],
    ) -> PersistenceResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM schedule_entries WHERE plan_id = ?1",
            params![plan_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO schedule_entries
                    (plan_id, operation_id, sequence, machine_id, duration_hours, declared_start,
                     name, assigned_start, assigned_end)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for entry in scheduled {
                if entry.plan_id() != plan_id {
                    return Err(PersistenceError::InvalidData(format!(
                        "operation '{}' belongs to plan '{}', not '{plan_id}'",
                        entry.id(),
                        entry.plan_id()
                    )));
                }
                let op = &entry.operation;
                stmt.execute(params![
                    op.plan_id,
                    op.id,
                    op.sequence,
                    op.machine_id,
                    op.duration_hours,
                    op.declared_start.map(|t| t.to_rfc3339()),
                    op.name,
                    entry.assigned_start.to_rfc3339(),
                    entry.assigned_end.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn check_busy(interval: &BusyInterval) -> PersistenceResult<()> {
    if interval.is_well_formed() {
        return Ok(());
    }
    Err(ScheduleError::InvalidInterval {
        machine_id: interval.machine_id.clone(),
        start: interval.start.to_rfc3339(),
        end: interval.end.to_rfc3339(),
    }
    .into())
}

fn insert_busy(conn: &Connection, interval: &BusyInterval) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO machine_busy (machine_id, start, end) VALUES (?1, ?2, ?3)",
        params![
            interval.machine_id.trim(),
            interval.start.to_rfc3339(),
            interval.end.to_rfc3339()
        ],
    )
}

fn operation_from_row(row: &Row<'_>) -> rusqlite::Result<(Operation, Option<String>)> {
    let mut operation = Operation::new(
        row.get::<_, String>(1)?,
        row.get::<_, String>(0)?,
        row.get(2)?,
        row.get::<_, String>(3)?,
        row.get(4)?,
    );
    operation.name = row.get(6)?;
    Ok((operation, row.get(5)?))
}

fn parse_required(text: &str) -> PersistenceResult<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid timestamp '{text}': {e}")))
}

fn parse_optional(text: Option<String>) -> PersistenceResult<Option<Timestamp>> {
    text.as_deref().map(parse_required).transpose()
}
