use chrono::{DateTime, Utc};
use machine_scheduler::{
    AssignmentMode, BusyInterval, FixedClock, Operation, ProductionSchedule, ScheduleError,
    Timestamp, WindowConfig,
};
use std::sync::Arc;

fn ts(s: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn workspace() -> ProductionSchedule {
    let mut schedule = ProductionSchedule::new();
    schedule.set_clock(Arc::new(FixedClock(
        ts("2025-03-10T05:00:00Z").with_timezone(&Utc),
    )));
    schedule
}

#[test]
fn plans_sharing_a_machine_do_not_overlap() {
    let mut schedule = workspace();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 4.0))
        .unwrap();
    schedule
        .upsert_operation(Operation::new("b1", "PB", 1, "M1", 3.0))
        .unwrap();

    schedule.generate("PA").unwrap();
    schedule.generate("PB").unwrap();

    let a = &schedule.committed("PA")[0];
    let b = &schedule.committed("PB")[0];
    assert_eq!(a.assigned_start, ts("2025-03-10T06:30:00Z"));
    assert_eq!(b.assigned_start, ts("2025-03-10T10:30:00Z"));
    assert!(!a.overlaps(b));
}

#[test]
fn regenerating_a_plan_replaces_its_own_entries() {
    let mut schedule = workspace();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 4.0))
        .unwrap();
    schedule.generate("PA").unwrap();
    let first = schedule.committed("PA").to_vec();

    // Its own previous entries must not block the rerun.
    schedule.generate("PA").unwrap();
    assert_eq!(schedule.committed("PA"), first.as_slice());

    schedule
        .upsert_operation(Operation::new("a2", "PA", 2, "M1", 2.0))
        .unwrap();
    let summary = schedule.generate("PA").unwrap();
    assert_eq!(summary.operation_count, 2);
    assert_eq!(schedule.committed("PA").len(), 2);
}

#[test]
fn manual_busy_time_is_respected() {
    let mut schedule = workspace();
    schedule
        .add_busy_interval(BusyInterval::new(
            "M1",
            ts("2025-03-10T06:30:00Z"),
            ts("2025-03-10T09:00:00Z"),
        ))
        .unwrap();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 1.0))
        .unwrap();
    schedule.generate("PA").unwrap();
    assert_eq!(
        schedule.committed("PA")[0].assigned_start,
        ts("2025-03-10T09:00:00Z")
    );
}

#[test]
fn padded_machine_id_on_manual_busy_time_is_normalized() {
    let mut schedule = workspace();
    schedule
        .add_busy_interval(BusyInterval::new(
            " M1",
            ts("2025-03-10T06:30:00Z"),
            ts("2025-03-10T09:00:00Z"),
        ))
        .unwrap();
    assert_eq!(schedule.busy_intervals()[0].machine_id, "M1");
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 1.0))
        .unwrap();
    schedule.generate("PA").unwrap();
    assert_eq!(
        schedule.committed("PA")[0].assigned_start,
        ts("2025-03-10T09:00:00Z")
    );
}

#[test]
fn inverted_busy_interval_is_refused() {
    let mut schedule = workspace();
    let err = schedule
        .add_busy_interval(BusyInterval::new(
            "M1",
            ts("2025-03-10T09:00:00Z"),
            ts("2025-03-10T08:00:00Z"),
        ))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidInterval { .. }));
    assert!(schedule.busy_intervals().is_empty());
}

#[test]
fn operation_too_long_for_window_is_refused_on_entry() {
    let mut schedule = workspace();
    schedule
        .set_window_config(WindowConfig::parse("08:00", 6.0).unwrap())
        .unwrap();
    let err = schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 7.0))
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(schedule.all_operations().is_empty());
}

#[test]
fn absurd_duration_is_refused_on_entry() {
    let mut schedule = workspace();
    let err = schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 1e16))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::DurationExceedsWindow { .. }));
    assert!(schedule.all_operations().is_empty());
}

#[test]
fn bad_window_config_leaves_previous_one() {
    let mut schedule = workspace();
    let before = schedule.window_config().clone();
    let bad = WindowConfig::new(6, 0, 0.0).unwrap();
    assert!(schedule.set_window_config(bad).is_err());
    assert_eq!(schedule.window_config(), &before);
}

#[test]
fn simplified_mode_can_double_book_across_plans() {
    let mut schedule = workspace();
    schedule.set_mode(AssignmentMode::Simplified);
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 4.0))
        .unwrap();
    schedule
        .upsert_operation(Operation::new("b1", "PB", 1, "M1", 4.0))
        .unwrap();
    schedule.generate("PA").unwrap();
    schedule.generate("PB").unwrap();
    assert!(schedule.committed("PA")[0].overlaps(&schedule.committed("PB")[0]));
}

#[test]
fn upsert_replaces_and_delete_removes() {
    let mut schedule = workspace();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 4.0))
        .unwrap();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M2", 2.0))
        .unwrap();
    assert_eq!(schedule.operations("PA").len(), 1);
    assert_eq!(schedule.find_operation("PA", "a1").unwrap().machine_id, "M2");

    assert!(schedule.delete_operation("PA", "a1"));
    assert!(!schedule.delete_operation("PA", "a1"));
    assert!(schedule.operations("PA").is_empty());
}

#[test]
fn clearing_a_plan_frees_its_machine_time() {
    let mut schedule = workspace();
    schedule
        .upsert_operation(Operation::new("a1", "PA", 1, "M1", 4.0))
        .unwrap();
    schedule
        .upsert_operation(Operation::new("b1", "PB", 1, "M1", 4.0))
        .unwrap();
    schedule.generate("PA").unwrap();
    assert!(schedule.clear_schedule("PA"));
    assert!(!schedule.clear_schedule("PA"));

    schedule.generate("PB").unwrap();
    assert_eq!(
        schedule.committed("PB")[0].assigned_start,
        ts("2025-03-10T06:30:00Z")
    );
    assert_eq!(schedule.plans(), vec!["PA".to_string(), "PB".to_string()]);
}
