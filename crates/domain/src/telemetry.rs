//! Telemetry: decoded measurements and the samples persisted from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;
use crate::time::Timestamp;

/// Canonical measurement key.
///
/// Numeric fields without a canonical mapping are kept verbatim in
/// [`MeasurementKey::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MeasurementKey {
    PowerW,
    EnergyTotalKwh,
    Voltage,
    Current,
    Temperature,
    Humidity,
    Other(String),
}

impl MeasurementKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PowerW => "power_w",
            Self::EnergyTotalKwh => "energy_total_kwh",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Other(key) => key,
        }
    }

    /// Map a wire field name or alias onto a canonical key.
    ///
    /// Returns `None` for names outside the recognized alias set.
    #[must_use]
    pub fn from_alias(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "power" | "power_w" => Some(Self::PowerW),
            "energy" | "energy_total_kwh" => Some(Self::EnergyTotalKwh),
            "voltage" => Some(Self::Voltage),
            "current" => Some(Self::Current),
            "temperature" | "temp" => Some(Self::Temperature),
            "humidity" => Some(Self::Humidity),
            _ => None,
        }
    }

    /// Canonical key for an alias, or the raw name otherwise.
    #[must_use]
    pub fn from_field(name: &str) -> Self {
        Self::from_alias(name).unwrap_or_else(|| Self::Other(name.to_string()))
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MeasurementKey> for String {
    fn from(key: MeasurementKey) -> Self {
        key.as_str().to_string()
    }
}

impl From<String> for MeasurementKey {
    fn from(value: String) -> Self {
        Self::from_alias(&value).unwrap_or(Self::Other(value))
    }
}

/// Quality assigned to samples when the source does not report one.
pub const DEFAULT_QUALITY: u8 = 100;

/// One persisted measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: DeviceId,
    pub recorded_at: Timestamp,
    pub key: MeasurementKey,
    pub value: f64,
    /// 0 to 100.
    pub quality: u8,
}

impl TelemetrySample {
    /// Create a sample with the default quality.
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        recorded_at: Timestamp,
        key: MeasurementKey,
        value: f64,
    ) -> Self {
        Self {
            device_id,
            recorded_at,
            key,
            value,
            quality: DEFAULT_QUALITY,
        }
    }
}

/// How an inbound message identifies its device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceLookup {
    /// Explicit id field from the payload: internal UUID or external id.
    pub explicit_id: Option<String>,
    /// Short-name derived from a sensor-stream topic.
    pub short_name: Option<String>,
}

impl DeviceLookup {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.explicit_id.is_none() && self.short_name.is_none()
    }

    /// Value used for fuzzy name matching, preferring the short-name.
    #[must_use]
    pub fn name_hint(&self) -> Option<&str> {
        self.short_name.as_deref().or(self.explicit_id.as_deref())
    }
}

/// A decoded inbound telemetry message, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryMessage {
    pub lookup: DeviceLookup,
    pub measurements: Vec<(MeasurementKey, f64)>,
    /// Boolean relay or sensor state, when the message carried one.
    pub state: Option<bool>,
    /// Decoded fields forwarded verbatim on the live telemetry event.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryMessage {
    /// The `power_w` reading, if present.
    #[must_use]
    pub fn power_w(&self) -> Option<f64> {
        self.measurements
            .iter()
            .find(|(key, _)| *key == MeasurementKey::PowerW)
            .map(|(_, value)| *value)
    }
}
