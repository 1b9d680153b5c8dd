//! Per-machine index of busy intervals.
//!
//! Intervals for each machine are kept sorted by start. Prior intervals come
//! from storage and may overlap each other (legacy data); intervals added
//! during a run never do, because they are only placed where
//! [`MachineAvailability::earliest_fit`] found room.

use crate::interval::BusyInterval;
use crate::window::{Timestamp, WorkWindow};
use chrono::Duration;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MachineAvailability {
    intervals: BTreeMap<String, Vec<BusyInterval>>,
}

impl MachineAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals<I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = BusyInterval>,
    {
        let mut index = Self::new();
        for interval in intervals {
            index
                .intervals
                .entry(interval.machine_id.clone())
                .or_default()
                .push(interval);
        }
        for list in index.intervals.values_mut() {
            list.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        }
        index
    }

    /// Busy intervals known for a machine, sorted by start.
    pub fn busy(&self, machine_id: &str) -> &[BusyInterval] {
        self.intervals
            .get(machine_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First instant at or after `candidate` that lies inside a window and
    /// outside every busy interval of the machine.
    pub fn earliest_free(
        &self,
        machine_id: &str,
        candidate: Timestamp,
        window: &WorkWindow,
    ) -> Timestamp {
        let busy = self.busy(machine_id);
        let mut candidate = window.normalize(candidate);
        while let Some(end) = covering_end(busy, candidate) {
            candidate = window.normalize(end);
        }
        candidate
    }

    /// First instant at or after `candidate` where `[start, start + length)`
    /// fits inside one window without touching a busy interval.
    pub fn earliest_fit(
        &self,
        machine_id: &str,
        candidate: Timestamp,
        length: Duration,
        window: &WorkWindow,
    ) -> Timestamp {
        let busy = self.busy(machine_id);
        let mut candidate = candidate;
        loop {
            candidate = self.earliest_free(machine_id, candidate, window);
            let day_end = window.end_on(window.window_day(candidate));
            if candidate + length > day_end {
                candidate = window.next_window_start(candidate);
                continue;
            }
            match overlap_end(busy, candidate, candidate + length) {
                Some(end) => candidate = end,
                None => return candidate,
            }
        }
    }

    /// Whether `[start, end)` collides with anything on the machine.
    pub fn is_free(&self, machine_id: &str, start: Timestamp, end: Timestamp) -> bool {
        overlap_end(self.busy(machine_id), start, end).is_none()
    }

    pub fn add_interval(&mut self, interval: BusyInterval) {
        debug_assert!(
            self.is_free(&interval.machine_id, interval.start, interval.end),
            "interval added over an existing busy interval on {}",
            interval.machine_id
        );
        let list = self
            .intervals
            .entry(interval.machine_id.clone())
            .or_default();
        let at = list.partition_point(|existing| existing.start <= interval.start);
        list.insert(at, interval);
    }

    pub fn len(&self) -> usize {
        self.intervals.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Latest end among intervals that contain `at`.
fn covering_end(busy: &[BusyInterval], at: Timestamp) -> Option<Timestamp> {
    let started = busy.partition_point(|interval| interval.start <= at);
    busy[..started]
        .iter()
        .filter(|interval| interval.end > at)
        .map(|interval| interval.end)
        .max()
}

/// Latest end among intervals that overlap `[start, end)`.
fn overlap_end(busy: &[BusyInterval], start: Timestamp, end: Timestamp) -> Option<Timestamp> {
    let started = busy.partition_point(|interval| interval.start < end);
    busy[..started]
        .iter()
        .filter(|interval| interval.overlaps(start, end))
        .map(|interval| interval.end)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowConfig;
    use chrono::DateTime;

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn window() -> WorkWindow {
        WorkWindow::from_config(&WindowConfig::new(6, 30, 12.0).unwrap()).unwrap()
    }

    #[test]
    fn chained_intervals_are_skipped_in_one_call() {
        let index = MachineAvailability::from_intervals([
            BusyInterval::new(
                "M1",
                ts("2025-03-10T08:00:00Z"),
                ts("2025-03-10T10:00:00Z"),
            ),
            BusyInterval::new(
                "M1",
                ts("2025-03-10T06:30:00Z"),
                ts("2025-03-10T08:00:00Z"),
            ),
        ]);
        let free = index.earliest_free("M1", ts("2025-03-10T07:00:00Z"), &window());
        assert_eq!(free, ts("2025-03-10T10:00:00Z"));
    }

    #[test]
    fn interval_running_to_window_end_rolls_to_next_day() {
        let index = MachineAvailability::from_intervals([BusyInterval::new(
            "M1",
            ts("2025-03-10T12:00:00Z"),
            ts("2025-03-10T18:30:00Z"),
        )]);
        let free = index.earliest_free("M1", ts("2025-03-10T13:00:00Z"), &window());
        assert_eq!(free, ts("2025-03-11T06:30:00Z"));
    }

    #[test]
    fn earliest_fit_skips_gaps_that_are_too_short() {
        let index = MachineAvailability::from_intervals([BusyInterval::new(
            "M1",
            ts("2025-03-10T08:00:00Z"),
            ts("2025-03-10T09:00:00Z"),
        )]);
        let fit = index.earliest_fit(
            "M1",
            ts("2025-03-10T06:30:00Z"),
            Duration::hours(2),
            &window(),
        );
        assert_eq!(fit, ts("2025-03-10T09:00:00Z"));
    }

    #[test]
    fn added_intervals_stay_sorted_and_block_their_span() {
        let mut index = MachineAvailability::new();
        index.add_interval(BusyInterval::new(
            "M1",
            ts("2025-03-10T10:00:00Z"),
            ts("2025-03-10T12:00:00Z"),
        ));
        index.add_interval(BusyInterval::new(
            "M1",
            ts("2025-03-10T06:30:00Z"),
            ts("2025-03-10T08:00:00Z"),
        ));
        assert_eq!(index.busy("M1")[0].start, ts("2025-03-10T06:30:00Z"));
        assert!(index.is_free("M1", ts("2025-03-10T08:00:00Z"), ts("2025-03-10T10:00:00Z")));
        assert!(!index.is_free("M1", ts("2025-03-10T09:00:00Z"), ts("2025-03-10T10:30:00Z")));
        assert!(index.is_free("M2", ts("2025-03-10T09:00:00Z"), ts("2025-03-10T10:30:00Z")));
    }

    #[test]
    fn other_machines_do_not_block() {
        let index = MachineAvailability::from_intervals([BusyInterval::new(
            "M2",
            ts("2025-03-10T06:30:00Z"),
            ts("2025-03-10T18:30:00Z"),
        )]);
        let free = index.earliest_free("M1", ts("2025-03-10T06:30:00Z"), &window());
        assert_eq!(free, ts("2025-03-10T06:30:00Z"));
    }
}
