//! Hours committed per capacity bucket per window day.
//!
//! This is the guard against over-filling a day, independent of how the
//! individual intervals were placed.

use crate::interval::BusyInterval;
use crate::window::{WorkWindow, duration_to_hours};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// What a day's capacity is counted against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapacityBucket {
    Machine(String),
    /// One bucket for the whole run, used by the simplified mode.
    Shared,
}

#[derive(Debug, Clone)]
pub struct DailyCapacity {
    limit: Duration,
    usage: BTreeMap<(CapacityBucket, NaiveDate), Duration>,
}

impl DailyCapacity {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            usage: BTreeMap::new(),
        }
    }

    pub fn for_window(window: &WorkWindow) -> Self {
        Self::new(window.length())
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn usage(&self, bucket: &CapacityBucket, day: NaiveDate) -> Duration {
        self.usage
            .get(&(bucket.clone(), day))
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    pub fn remaining(&self, bucket: &CapacityBucket, day: NaiveDate) -> Duration {
        (self.limit - self.usage(bucket, day)).max(Duration::zero())
    }

    pub fn remaining_hours(&self, bucket: &CapacityBucket, day: NaiveDate) -> f64 {
        duration_to_hours(self.remaining(bucket, day))
    }

    pub fn fits(&self, bucket: &CapacityBucket, day: NaiveDate, hours: Duration) -> bool {
        hours <= self.remaining(bucket, day)
    }

    /// Record `hours` against the day. The caller checks [`Self::fits`] first.
    pub fn reserve(&mut self, bucket: CapacityBucket, day: NaiveDate, hours: Duration) {
        let used = self.usage.entry((bucket, day)).or_insert_with(Duration::zero);
        debug_assert!(*used + hours <= self.limit, "daily capacity exceeded");
        *used += hours;
    }

    /// Count the part of a prior interval that falls inside each window it
    /// touches. Usage from prior state is capped at the daily limit.
    pub fn absorb(&mut self, bucket: &CapacityBucket, interval: &BusyInterval, window: &WorkWindow) {
        let mut day = window.window_day(interval.start);
        let last = window.window_day(interval.end);
        while day <= last {
            let start = interval.start.max(window.start_on(day));
            let end = interval.end.min(window.end_on(day));
            if end > start {
                let used = self
                    .usage
                    .entry((bucket.clone(), day))
                    .or_insert_with(Duration::zero);
                *used = (*used + (end - start)).min(self.limit);
            }
            day = day + Duration::days(1);
        }
    }
}
