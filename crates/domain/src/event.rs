//! Event: a live update fanned out to an organization's subscribers.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, OrganizationId};
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Raw decoded telemetry for one device.
    Telemetry,
    /// Online or relay state of a device changed.
    DeviceStatus,
    AnomalyDetected,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::DeviceStatus => "device_status",
            Self::AnomalyDetected => "anomaly_detected",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record delivered on the organization-scoped live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub organization_id: OrganizationId,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        organization_id: OrganizationId,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            organization_id,
            event_type,
            data,
            timestamp: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_event_type_in_snake_case() {
        let event = Event::new(
            OrganizationId::new(),
            EventType::DeviceStatus,
            serde_json::json!({"is_online": true}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "device_status");
        assert_eq!(json["data"]["is_online"], true);
    }
}
