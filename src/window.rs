use crate::error::{ScheduleError, ScheduleResult};
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

/// An absolute instant with its UTC offset preserved.
pub type Timestamp = DateTime<FixedOffset>;

const MAX_OFFSET_MINUTES: i32 = 18 * 60;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Operator-facing configuration of the recurring daily working window.
///
/// This is the value persisted by callers (JSON file, SQLite row) and passed
/// into every scheduling run. It is validated when turned into a
/// [`WorkWindow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(with = "hhmm")]
    start_time: NaiveTime,
    daily_duration_hours: f64,
    #[serde(default)]
    utc_offset_minutes: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(6, 30, 0).unwrap_or(NaiveTime::MIN),
            daily_duration_hours: 12.0,
            utc_offset_minutes: 0,
        }
    }
}

impl WindowConfig {
    pub fn new(hour: u32, minute: u32, daily_duration_hours: f64) -> ScheduleResult<Self> {
        let start_time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            ScheduleError::InvalidStartTime {
                value: format!("{hour:02}:{minute:02}"),
            }
        })?;
        Ok(Self {
            start_time,
            daily_duration_hours,
            utc_offset_minutes: 0,
        })
    }

    /// Parse a `HH:MM` start time, as typed by an operator.
    pub fn parse(start: &str, daily_duration_hours: f64) -> ScheduleResult<Self> {
        let start_time = hhmm::parse(start).ok_or_else(|| ScheduleError::InvalidStartTime {
            value: start.to_string(),
        })?;
        Ok(Self {
            start_time,
            daily_duration_hours,
            utc_offset_minutes: 0,
        })
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    pub fn daily_duration_hours(&self) -> f64 {
        self.daily_duration_hours
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        WorkWindow::from_config(self).map(|_| ())
    }
}

/// The recurring daily window shared by every machine.
///
/// Days here are window days: day `D` runs from the window start on `D` to
/// the window start on `D + 1`, so a window that opens at 22:00 and runs past
/// midnight still belongs to the day it opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWindow {
    start_time: NaiveTime,
    length: Duration,
    offset: FixedOffset,
}

impl Default for WorkWindow {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(6, 30, 0).unwrap_or(NaiveTime::MIN),
            length: Duration::hours(12),
            offset: Utc.fix(),
        }
    }
}

impl WorkWindow {
    pub fn from_config(config: &WindowConfig) -> ScheduleResult<Self> {
        let hours = config.daily_duration_hours;
        if !hours.is_finite() || hours <= 0.0 || hours > 24.0 {
            return Err(ScheduleError::InvalidWindowLength { hours });
        }
        let length = hours_to_duration(hours);
        if length <= Duration::zero() {
            return Err(ScheduleError::InvalidWindowLength { hours });
        }
        if config.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ScheduleError::InvalidOffset {
                minutes: config.utc_offset_minutes,
            });
        }
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or(
            ScheduleError::InvalidOffset {
                minutes: config.utc_offset_minutes,
            },
        )?;
        let start_time = config
            .start_time
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(config.start_time);

        Ok(Self {
            start_time,
            length,
            offset,
        })
    }

    pub fn to_config(&self) -> WindowConfig {
        WindowConfig {
            start_time: self.start_time,
            daily_duration_hours: duration_to_hours(self.length),
            utc_offset_minutes: self.offset.local_minus_utc() / 60,
        }
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn daily_hours(&self) -> f64 {
        duration_to_hours(self.length)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Re-express an instant in the window's offset. The instant itself does
    /// not move.
    pub fn localize(&self, at: Timestamp) -> Timestamp {
        at.with_timezone(&self.offset)
    }

    /// Window start on the given window day.
    pub fn start_on(&self, day: NaiveDate) -> Timestamp {
        self.at_local(day.and_time(self.start_time))
    }

    /// Window end on the given window day.
    pub fn end_on(&self, day: NaiveDate) -> Timestamp {
        self.start_on(day) + self.length
    }

    /// Window start on the calendar date of `at`, zero seconds.
    pub fn start_of_window(&self, at: Timestamp) -> Timestamp {
        self.start_on(self.localize(at).date_naive())
    }

    pub fn end_of_window(&self, at: Timestamp) -> Timestamp {
        self.start_of_window(at) + self.length
    }

    /// The window day `at` belongs to: the latest window start at or before it.
    pub fn window_day(&self, at: Timestamp) -> NaiveDate {
        let local = self.localize(at);
        let date = local.date_naive();
        if local.time() >= self.start_time {
            date
        } else {
            date - Duration::days(1)
        }
    }

    /// Start of the window following the one `at` belongs to.
    pub fn next_window_start(&self, at: Timestamp) -> Timestamp {
        self.start_on(self.window_day(at) + Duration::days(1))
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        at < self.end_on(self.window_day(at))
    }

    /// `at` itself when it is inside a window, otherwise the next window start.
    pub fn normalize(&self, at: Timestamp) -> Timestamp {
        if self.contains(at) {
            self.localize(at)
        } else {
            self.next_window_start(at)
        }
    }

    /// Whether `[start, end)` lies inside a single day's window.
    pub fn contains_span(&self, start: Timestamp, end: Timestamp) -> bool {
        self.contains(start) && end <= self.end_on(self.window_day(start))
    }

    fn at_local(&self, local: NaiveDateTime) -> Timestamp {
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }

    /// Parse an operator-entered instant. RFC 3339 keeps its own offset;
    /// `YYYY-MM-DDTHH:MM[:SS]` and `YYYY-MM-DD HH:MM[:SS]` are read as wall
    /// clock time in the window's offset.
    pub fn parse_timestamp(&self, input: &str) -> Option<Timestamp> {
        let input = input.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
            return Some(ts);
        }
        const LOCAL_FORMATS: [&str; 4] = [
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
        ];
        LOCAL_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .map(|local| self.at_local(local))
    }
}

/// Fractional hours to a duration rounded to whole seconds. Values beyond
/// what a `Duration` can hold saturate at its bounds.
pub fn hours_to_duration(hours: f64) -> Duration {
    let seconds = (hours * SECONDS_PER_HOUR).round() as i64;
    Duration::try_seconds(seconds).unwrap_or_else(|| {
        if seconds < 0 {
            Duration::min_value()
        } else {
            Duration::max_value()
        }
    })
}

pub fn duration_to_hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / SECONDS_PER_HOUR
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid start time '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn window_spanning_midnight_keeps_its_opening_day() {
        let config = WindowConfig::new(22, 0, 8.0).unwrap();
        let window = WorkWindow::from_config(&config).unwrap();
        let after_midnight = ts("2025-03-11T02:00:00+00:00");
        assert_eq!(
            window.window_day(after_midnight),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
        assert!(window.contains(after_midnight));
        assert_eq!(
            window.next_window_start(after_midnight),
            ts("2025-03-11T22:00:00+00:00")
        );
    }

    #[test]
    fn start_time_drops_seconds() {
        let config = WindowConfig::parse("07:15:42", 8.0).unwrap();
        let window = WorkWindow::from_config(&config).unwrap();
        assert_eq!(window.start_time(), NaiveTime::from_hms_opt(7, 15, 0).unwrap());
    }

    #[test]
    fn config_serializes_start_as_hhmm() {
        let config = WindowConfig::new(6, 30, 12.0).unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["start_time"], "06:30");
        let back: WindowConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
