//! Condition: an extra gate evaluated before the trigger.

use serde::{Deserialize, Serialize};

use super::trigger::validate_days;
use crate::error::ValidationError;
use crate::time::parse_time_of_day;

/// Expected state for a [`Condition::DeviceState`] gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedState {
    On,
    Off,
    Online,
}

impl ExpectedState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Online => "online",
        }
    }
}

/// A predicate that must hold for the trigger to be evaluated at all.
///
/// All conditions of a rule are combined with logical AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    TimeRange {
        #[serde(default = "default_start")]
        start: String,
        #[serde(default = "default_end")]
        end: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days: Option<Vec<u8>>,
    },
    DayOfWeek {
        /// 0 = Monday through 6 = Sunday.
        #[serde(default = "all_days")]
        days: Vec<u8>,
    },
    /// Checks the linked device's last known state or liveness.
    DeviceState { state: ExpectedState },
    /// Condition types outside the vocabulary are treated as met.
    #[serde(other)]
    Unknown,
}

fn default_start() -> String {
    "00:00".to_string()
}

fn default_end() -> String {
    "23:59".to_string()
}

fn all_days() -> Vec<u8> {
    (0..=6).collect()
}

impl Condition {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for malformed times or weekdays.
    /// Unknown condition types pass.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::TimeRange { start, end, days } => {
                parse_time_of_day(start)?;
                parse_time_of_day(end)?;
                validate_days(days.as_deref().unwrap_or_default())
            }
            Self::DayOfWeek { days } => validate_days(days),
            Self::DeviceState { .. } | Self::Unknown => Ok(()),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeRange { start, end, .. } => write!(f, "time_range({start}-{end})"),
            Self::DayOfWeek { days } => write!(f, "day_of_week({days:?})"),
            Self::DeviceState { state } => write!(f, "device_state({})", state.as_str()),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
