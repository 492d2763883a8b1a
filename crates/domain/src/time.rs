//! Time and timestamp helpers.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, SecondsFormat, SubsecRound, Timelike, Utc};

use crate::error::ValidationError;

/// UTC timestamp used for `last_seen`, sample times, run records, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time, truncated to microseconds.
///
/// Stored timestamps keep microsecond precision, so a value taken here is
/// unchanged by a round trip through storage.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp for a deduplication key, at microsecond precision.
#[must_use]
pub fn key_stamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a `HH:MM` time-of-day string.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTimeOfDay`] when the string is not a
/// valid 24h `HH:MM` value.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ValidationError::InvalidTimeOfDay(value.to_string()))
}

/// Wall-clock view of a timestamp at a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    /// Time of day truncated to the minute.
    pub time: NaiveTime,
    /// Weekday, 0 = Monday through 6 = Sunday.
    pub weekday: u8,
}

impl LocalClock {
    #[must_use]
    pub fn at(ts: Timestamp, offset: FixedOffset) -> Self {
        let local = ts.with_timezone(&offset);
        let time = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or_default();
        let weekday = u8::try_from(local.weekday().num_days_from_monday()).unwrap_or_default();
        Self { time, weekday }
    }

    /// Render as `HH:MM`.
    #[must_use]
    pub fn hh_mm(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}
