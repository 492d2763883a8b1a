//! Action: the effect performed when a rule fires.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    TurnOn,
    TurnOff,
    Toggle,
    /// Drive the linked device to a power level, 0 to 100.
    SetPower {
        #[serde(default = "full_power")]
        value: u8,
    },
    /// Create a notification for the rule's organization.
    Notify {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

fn full_power() -> u8 {
    100
}

impl Action {
    /// Stable name recorded in run records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Toggle => "toggle",
            Self::SetPower { .. } => "set_power",
            Self::Notify { .. } => "notify",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the action needs a linked device.
    #[must_use]
    pub fn targets_device(&self) -> bool {
        !matches!(self, Self::Notify { .. } | Self::Unknown)
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownAction`] for types outside the
    /// vocabulary and [`ValidationError::PowerLevelOutOfRange`] above 100.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Unknown => Err(ValidationError::UnknownAction),
            Self::SetPower { value } if *value > 100 => {
                Err(ValidationError::PowerLevelOutOfRange(*value))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetPower { value } => write!(f, "set_power({value})"),
            other => f.write_str(other.kind()),
        }
    }
}
