//! JSON telemetry payloads and the top-level message decoder.
//!
//! Accepted shapes:
//! - `{"external_id": "...", "data": {"power": 12.5, ...}}`
//! - the same without `data`, measurements at the top level
//! - legacy `{"device_id": "...", "sensor_type": "temperature", "value": 21.4}`
//!
//! Anything that is not a JSON object is wrapped as `{"raw": text}`.

use serde_json::{Map, Value};

use fieldhub_domain::telemetry::{DeviceLookup, MeasurementKey, TelemetryMessage};

use crate::topic::{SensorTopic, decode_reading, parse_bool};

const IDENTITY_FIELDS: [&str; 4] = ["external_id", "device_id", "deviceId", "id"];
const SERIAL_FIELDS: [&str; 2] = ["serial_number", "serialNumber"];
const STATE_FIELDS: [&str; 3] = ["data", "state", "output"];
/// Top-level keys never read as measurements.
const RESERVED_FIELDS: [&str; 10] = [
    "external_id",
    "device_id",
    "deviceId",
    "id",
    "serial_number",
    "serialNumber",
    "sensor_type",
    "value",
    "timestamp",
    "quality",
];

/// Decode one broker message.
///
/// Structured sensor topics are decoded from their plain-text payload; every
/// other topic is read as JSON. Returns `None` when a structured payload
/// cannot be understood.
#[must_use]
pub fn decode_message(namespace: &str, topic: &str, payload: &[u8]) -> Option<TelemetryMessage> {
    let text = String::from_utf8_lossy(payload);
    if let Some(sensor) = SensorTopic::parse(namespace, topic) {
        let decoded = decode_reading(&sensor, &text);
        if decoded.is_none() {
            tracing::debug!(topic, payload = %text, "discarding unparseable sensor payload");
        }
        return decoded;
    }
    Some(decode_json(&text))
}

/// Decode a JSON payload, falling back to `{"raw": text}`.
#[must_use]
pub fn decode_json(text: &str) -> TelemetryMessage {
    let root = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("raw".to_string(), Value::String(text.to_string()));
            map
        }
    };

    let lookup = DeviceLookup {
        explicit_id: first_identifier(&root, &IDENTITY_FIELDS)
            .or_else(|| first_identifier(&root, &SERIAL_FIELDS)),
        short_name: None,
    };

    let nested = root.get("data").and_then(Value::as_object);
    let data = nested.unwrap_or(&root);

    let mut measurements = Vec::new();
    for (name, value) in data {
        if STATE_FIELDS.contains(&name.as_str())
            || (nested.is_none() && RESERVED_FIELDS.contains(&name.as_str()))
        {
            continue;
        }
        if let Some(number) = value.as_f64().filter(|v| v.is_finite()) {
            measurements.push((MeasurementKey::from_field(name), number));
        }
    }

    if let (Some(Value::String(sensor_type)), Some(number)) = (
        root.get("sensor_type"),
        root.get("value").and_then(Value::as_f64),
    ) {
        measurements.push((MeasurementKey::from_field(sensor_type), number));
    }

    let state = read_state(data).or_else(|| read_state(&root));

    TelemetryMessage {
        lookup,
        measurements,
        state,
        fields: data.clone(),
    }
}

fn first_identifier(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match map.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn read_state(map: &Map<String, Value>) -> Option<bool> {
    match map.get("state") {
        Some(Value::Bool(b)) => return Some(*b),
        Some(Value::String(s)) => {
            if let Some(b) = parse_bool(s) {
                return Some(b);
            }
        }
        _ => {}
    }
    map.get("output").and_then(Value::as_bool)
}
