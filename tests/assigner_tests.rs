use chrono::{DateTime, Utc};
use machine_scheduler::{
    AssignmentMode, BusyInterval, FixedClock, MachineRegistry, Operation, ScheduleAssigner,
    ScheduleError, StoredInterval, Timestamp, WindowConfig,
};

fn ts(s: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn clock(s: &str) -> FixedClock {
    FixedClock(ts(s).with_timezone(&Utc))
}

fn assigner() -> ScheduleAssigner<FixedClock> {
    ScheduleAssigner::from_config(&WindowConfig::default())
        .unwrap()
        .with_clock(clock("2025-03-10T05:00:00Z"))
}

fn op(id: &str, seq: i32, machine: &str, hours: f64) -> Operation {
    Operation::new(id, "P1", seq, machine, hours)
}

#[test]
fn third_operation_rolls_to_next_window_when_day_is_full() {
    let ops = vec![
        op("op1", 10, "M1", 5.0).with_declared_start(ts("2025-03-10T06:30:00Z")),
        op("op2", 20, "M1", 4.0),
        op("op3", 30, "M1", 5.0),
    ];
    let outcome = assigner().assign(ops, &[]).unwrap();
    let slots: Vec<(Timestamp, Timestamp)> = outcome
        .operations
        .iter()
        .map(|s| (s.assigned_start, s.assigned_end))
        .collect();
    assert_eq!(
        slots,
        vec![
            (ts("2025-03-10T06:30:00Z"), ts("2025-03-10T11:30:00Z")),
            (ts("2025-03-10T11:30:00Z"), ts("2025-03-10T15:30:00Z")),
            (ts("2025-03-11T06:30:00Z"), ts("2025-03-11T11:30:00Z")),
        ]
    );
    assert_eq!(outcome.summary.rolled_operations, 1);
}

#[test]
fn second_long_operation_moves_to_next_day() {
    let ops = vec![op("op1", 1, "M1", 7.0), op("op2", 2, "M1", 7.0)];
    let outcome = assigner().assign(ops, &[]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T06:30:00Z"));
    assert_eq!(outcome.operations[0].assigned_end, ts("2025-03-10T13:30:00Z"));
    assert_eq!(outcome.operations[1].assigned_start, ts("2025-03-11T06:30:00Z"));
    assert_eq!(outcome.operations[1].assigned_end, ts("2025-03-11T13:30:00Z"));
}

#[test]
fn declared_start_inside_committed_interval_is_pushed_past_it() {
    let mut committed = BusyInterval::new(
        "M1",
        ts("2025-03-10T08:00:00Z"),
        ts("2025-03-10T12:00:00Z"),
    );
    committed.plan_id = Some("P0".into());
    let ops = vec![op("op1", 1, "M1", 2.0).with_declared_start(ts("2025-03-10T09:00:00Z"))];
    let outcome = assigner().assign(ops, &[committed]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T12:00:00Z"));
    assert_eq!(outcome.operations[0].assigned_end, ts("2025-03-10T14:00:00Z"));
}

#[test]
fn operation_that_would_run_into_committed_interval_starts_after_it() {
    let committed = BusyInterval::new(
        "M1",
        ts("2025-03-10T08:00:00Z"),
        ts("2025-03-10T12:00:00Z"),
    );
    let ops = vec![op("op1", 1, "M1", 2.0).with_declared_start(ts("2025-03-10T07:00:00Z"))];
    let outcome = assigner().assign(ops, &[committed]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T12:00:00Z"));
}

#[test]
fn operation_longer_than_window_is_rejected_up_front() {
    let ops = vec![op("ok", 1, "M1", 2.0), op("huge", 2, "M1", 13.0)];
    let err = assigner().assign(ops, &[]).unwrap_err();
    assert!(err.is_configuration());
    match err {
        ScheduleError::DurationExceedsWindow {
            index,
            operation_id,
            machine_id,
            ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(operation_id, "huge");
            assert_eq!(machine_id, "M1");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn duration_beyond_any_calendar_is_rejected_not_panicking() {
    let err = assigner()
        .assign(vec![op("op1", 1, "M1", 1e16)], &[])
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::DurationExceedsWindow { ref operation_id, .. } if operation_id == "op1"
    ));
}

#[test]
fn padded_machine_id_on_prior_interval_still_blocks() {
    let prior = [BusyInterval::new(
        " M1 ",
        ts("2025-03-10T06:30:00Z"),
        ts("2025-03-10T09:00:00Z"),
    )];
    let outcome = assigner()
        .assign(vec![op("op1", 1, "M1", 2.0)], &prior)
        .unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T09:00:00Z"));
}

#[test]
fn operations_are_placed_in_sequence_order_with_stable_ties() {
    let ops = vec![
        op("late", 30, "M1", 1.0),
        op("first_tie", 10, "M1", 1.0),
        op("second_tie", 10, "M2", 1.0),
    ];
    let outcome = assigner().assign(ops, &[]).unwrap();
    let ids: Vec<&str> = outcome.operations.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["first_tie", "second_tie", "late"]);
    for pair in outcome.operations.windows(2) {
        assert!(pair[1].assigned_start >= pair[0].assigned_end);
    }
}

#[test]
fn declared_start_before_previous_end_is_ignored() {
    let ops = vec![
        op("op1", 1, "M1", 3.0).with_declared_start(ts("2025-03-10T08:00:00Z")),
        op("op2", 2, "M2", 1.0).with_declared_start(ts("2025-03-10T07:00:00Z")),
    ];
    let outcome = assigner().assign(ops, &[]).unwrap();
    assert_eq!(outcome.operations[1].assigned_start, ts("2025-03-10T11:00:00Z"));
}

#[test]
fn later_declared_start_is_respected() {
    let ops = vec![
        op("op1", 1, "M1", 1.0),
        op("op2", 2, "M1", 1.0).with_declared_start(ts("2025-03-10T14:00:00Z")),
    ];
    let outcome = assigner().assign(ops, &[]).unwrap();
    assert_eq!(outcome.operations[1].assigned_start, ts("2025-03-10T14:00:00Z"));
}

#[test]
fn declared_start_after_window_close_moves_to_next_opening() {
    let ops = vec![op("op1", 1, "M1", 1.0).with_declared_start(ts("2025-03-10T20:00:00Z"))];
    let outcome = assigner().assign(ops, &[]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-11T06:30:00Z"));
}

#[test]
fn clock_supplies_start_when_nothing_is_declared() {
    let config = WindowConfig::new(6, 30, 12.0)
        .unwrap()
        .with_utc_offset_minutes(60);
    let outcome = ScheduleAssigner::from_config(&config)
        .unwrap()
        .with_clock(clock("2025-03-10T04:00:00Z"))
        .assign(vec![op("op1", 1, "M1", 2.0)], &[])
        .unwrap();
    let start = outcome.operations[0].assigned_start;
    assert_eq!(start, ts("2025-03-10T06:30:00+01:00"));
    assert_eq!(start.offset().local_minus_utc(), 3600);
}

#[test]
fn window_spanning_midnight_keeps_operation_inside_one_shift() {
    let config = WindowConfig::new(22, 0, 8.0).unwrap();
    let assigner = ScheduleAssigner::from_config(&config)
        .unwrap()
        .with_clock(clock("2025-03-10T12:00:00Z"));
    let ops = vec![
        op("op1", 1, "M1", 3.0).with_declared_start(ts("2025-03-10T23:00:00Z")),
        op("op2", 2, "M1", 5.0),
    ];
    let outcome = assigner.assign(ops, &[]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T23:00:00Z"));
    assert_eq!(outcome.operations[0].assigned_end, ts("2025-03-11T02:00:00Z"));
    // Four hours remain before 06:00, so op2 waits for the next shift.
    assert_eq!(outcome.operations[1].assigned_start, ts("2025-03-11T22:00:00Z"));
}

#[test]
fn busy_interval_on_another_machine_does_not_block() {
    let busy = BusyInterval::new(
        "M2",
        ts("2025-03-10T06:30:00Z"),
        ts("2025-03-10T18:30:00Z"),
    );
    let ops = vec![op("op1", 1, "M1", 2.0)];
    let outcome = assigner().assign(ops, &[busy]).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T06:30:00Z"));
}

#[test]
fn gap_between_busy_intervals_is_used_when_long_enough() {
    let busy = vec![
        BusyInterval::new("M1", ts("2025-03-10T06:30:00Z"), ts("2025-03-10T08:00:00Z")),
        BusyInterval::new("M1", ts("2025-03-10T10:00:00Z"), ts("2025-03-10T12:00:00Z")),
    ];
    let ops = vec![op("short", 1, "M1", 2.0)];
    let outcome = assigner().assign(ops, &busy).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T08:00:00Z"));

    let ops = vec![op("long", 1, "M1", 3.0)];
    let outcome = assigner().assign(ops, &busy).unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T12:00:00Z"));
}

#[test]
fn simplified_mode_ignores_machine_intervals() {
    let busy = BusyInterval::new(
        "M1",
        ts("2025-03-10T06:30:00Z"),
        ts("2025-03-10T12:00:00Z"),
    );
    let ops = vec![op("op1", 1, "M1", 2.0)];
    let outcome = assigner()
        .with_mode(AssignmentMode::Simplified)
        .assign(ops, &[busy])
        .unwrap();
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T06:30:00Z"));
    assert_eq!(outcome.summary.mode, AssignmentMode::Simplified);
}

#[test]
fn malformed_stored_intervals_are_skipped() {
    let prior = vec![
        StoredInterval {
            machine_id: "M1".into(),
            start: "not a time".into(),
            end: "2025-03-10T12:00:00Z".into(),
            ..StoredInterval::default()
        },
        StoredInterval {
            machine_id: "M1".into(),
            start: "2025-03-10T06:30:00Z".into(),
            end: "2025-03-10T08:00:00Z".into(),
            ..StoredInterval::default()
        },
    ];
    let ops = vec![op("op1", 1, "M1", 1.0)];
    let outcome = assigner().assign_stored(ops, &prior).unwrap();
    assert_eq!(outcome.summary.skipped_intervals, 1);
    assert_eq!(outcome.operations[0].assigned_start, ts("2025-03-10T08:00:00Z"));
}

#[test]
fn empty_plan_yields_empty_schedule() {
    let outcome = assigner().assign(Vec::new(), &[]).unwrap();
    assert!(outcome.operations.is_empty());
    assert!(outcome.new_intervals.is_empty());
    assert_eq!(outcome.summary.operation_count, 0);
    assert_eq!(outcome.summary.last_end, None);
}

#[test]
fn unknown_machine_is_a_missing_reference() {
    let registry = MachineRegistry::from_ids(["M1"]);
    let ops = vec![op("op1", 1, "M1", 1.0), op("op2", 2, "M9", 1.0)];
    let err = assigner()
        .with_registry(registry)
        .assign(ops, &[])
        .unwrap_err();
    assert!(err.is_missing_reference());
    assert_eq!(
        err,
        ScheduleError::UnknownMachine {
            index: 1,
            operation_id: "op2".into(),
            machine_id: "M9".into(),
        }
    );
}

#[test]
fn blank_machine_and_bad_durations_are_rejected() {
    let err = assigner()
        .assign(vec![op("op1", 1, "  ", 1.0)], &[])
        .unwrap_err();
    assert!(matches!(err, ScheduleError::MissingMachine { index: 0, .. }));

    for hours in [0.0, -1.0, 0.0001, f64::NAN] {
        let err = assigner()
            .assign(vec![op("op1", 1, "M1", hours)], &[])
            .unwrap_err();
        assert!(
            matches!(err, ScheduleError::InvalidDuration { .. }),
            "{hours} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn duplicate_operation_ids_are_rejected() {
    let ops = vec![op("op1", 1, "M1", 1.0), op("op1", 2, "M1", 1.0)];
    let err = assigner().assign(ops, &[]).unwrap_err();
    assert!(matches!(err, ScheduleError::DuplicateOperation { .. }));
}

#[test]
fn new_intervals_mirror_scheduled_operations() {
    let ops = vec![op("op1", 1, "M1", 1.5), op("op2", 2, "M2", 2.0)];
    let outcome = assigner().assign(ops, &[]).unwrap();
    assert_eq!(outcome.new_intervals.len(), 2);
    for (interval, scheduled) in outcome.new_intervals.iter().zip(&outcome.operations) {
        assert_eq!(interval.machine_id, scheduled.machine_id());
        assert_eq!(interval.start, scheduled.assigned_start);
        assert_eq!(interval.end, scheduled.assigned_end);
        assert_eq!(interval.operation_id.as_deref(), Some(scheduled.id()));
    }
    assert_eq!(outcome.summary.machine_count, 2);
    assert_eq!(outcome.operations[0].assigned_hours(), 1.5);
}
