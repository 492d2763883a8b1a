//! Trigger: the primary boolean condition of a rule.

use serde::{Deserialize, Serialize};

use super::operator::Operator;
use crate::error::ValidationError;
use crate::telemetry::MeasurementKey;
use crate::time::parse_time_of_day;

/// What makes a rule fire on a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Compares the latest known market price against a threshold.
    Price {
        #[serde(default = "Operator::lt")]
        operator: Operator,
        #[serde(default)]
        value: f64,
    },
    /// Fires while the local time of day is inside `[start, end]`.
    ///
    /// `start > end` wraps around midnight.
    TimeRange {
        #[serde(default = "default_start")]
        start: String,
        #[serde(default = "default_end")]
        end: String,
        /// Weekdays, 0 = Monday. `None` means every day.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days: Option<Vec<u8>>,
    },
    /// Compares the linked device's latest sample for `key`.
    Sensor {
        #[serde(default = "default_sensor_key")]
        key: MeasurementKey,
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        value: f64,
    },
    Always,
    /// Any trigger type outside the vocabulary. Never fires.
    #[serde(other)]
    Unknown,
}

fn default_start() -> String {
    "00:00".to_string()
}

fn default_end() -> String {
    "23:59".to_string()
}

fn default_sensor_key() -> MeasurementKey {
    MeasurementKey::PowerW
}

impl Trigger {
    /// Check the trigger against the rule vocabulary.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for unknown trigger types, malformed
    /// times of day and out-of-range weekdays.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::TimeRange { start, end, days } => {
                parse_time_of_day(start)?;
                parse_time_of_day(end)?;
                validate_days(days.as_deref().unwrap_or_default())
            }
            Self::Unknown => Err(ValidationError::UnknownTrigger),
            Self::Price { .. } | Self::Sensor { .. } | Self::Always => Ok(()),
        }
    }
}

pub(crate) fn validate_days(days: &[u8]) -> Result<(), ValidationError> {
    match days.iter().find(|day| **day > 6) {
        Some(day) => Err(ValidationError::InvalidWeekday(*day)),
        None => Ok(()),
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Price { operator, value } => write!(f, "price({operator} {value})"),
            Self::TimeRange { start, end, .. } => write!(f, "time_range({start}-{end})"),
            Self::Sensor {
                key,
                operator,
                value,
            } => write!(f, "sensor({key} {operator} {value})"),
            Self::Always => f.write_str("always"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
