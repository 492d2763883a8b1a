//! Structured sensor topics: `{ns}/sensors/{domain}/{entity_id}/{attribute}`.
//!
//! The entity id is a device short-name followed by a metric suffix, e.g.
//! `tapo_priz_103_current_consumption`. The payload is plain text.

use fieldhub_domain::telemetry::{DeviceLookup, MeasurementKey, TelemetryMessage};

/// Metric suffixes and the canonical key they map to, longest first.
const SUFFIXES: [(&str, &str); 10] = [
    ("_today_s_consumption", "energy_total_kwh"),
    ("_current_consumption", "power_w"),
    ("_total_consumption", "energy_total_kwh"),
    ("_temperature", "temperature"),
    ("_humidity", "humidity"),
    ("_voltage", "voltage"),
    ("_current", "current"),
    ("_power_w", "power_w"),
    ("_energy", "energy_total_kwh"),
    ("_power", "power_w"),
];

const STATE_DOMAINS: [&str; 3] = ["switch", "light", "binary_sensor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTopic<'a> {
    pub domain: &'a str,
    pub entity_id: &'a str,
    pub attribute: &'a str,
}

impl<'a> SensorTopic<'a> {
    /// Match `topic` against the structured layout under `namespace`.
    #[must_use]
    pub fn parse(namespace: &str, topic: &'a str) -> Option<Self> {
        let rest = topic.strip_prefix(namespace)?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let (Some("sensors"), Some(domain), Some(entity_id), Some(attribute), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return None;
        };
        if domain.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(Self {
            domain,
            entity_id,
            attribute,
        })
    }

    fn is_state_domain(&self) -> bool {
        STATE_DOMAINS.contains(&self.domain)
    }
}

/// Split an entity id into the device short-name and the measurement its
/// suffix names, if any.
#[must_use]
pub fn split_entity(entity_id: &str) -> (&str, Option<MeasurementKey>) {
    SUFFIXES
        .iter()
        .find_map(|(suffix, key)| {
            entity_id
                .strip_suffix(suffix)
                .filter(|short| !short.is_empty())
                .map(|short| (short, Some(MeasurementKey::from_field(key))))
        })
        .unwrap_or((entity_id, None))
}

/// Parse an `ON`/`OFF`/`true`/`false`/`1`/`0` payload, ignoring case.
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Decode a plain-text payload received on a structured topic.
///
/// Returns `None` when the payload does not fit the topic's domain, or when
/// a numeric entity carries no known metric suffix.
#[must_use]
pub fn decode_reading(topic: &SensorTopic<'_>, payload: &str) -> Option<TelemetryMessage> {
    let (short_name, key) = split_entity(topic.entity_id);
    let lookup = DeviceLookup {
        explicit_id: None,
        short_name: Some(short_name.to_string()),
    };
    let mut fields = serde_json::Map::new();

    if topic.is_state_domain() {
        let state = parse_bool(payload)?;
        fields.insert("state".to_string(), serde_json::Value::Bool(state));
        return Some(TelemetryMessage {
            lookup,
            measurements: Vec::new(),
            state: Some(state),
            fields,
        });
    }

    if topic.domain != "sensor" {
        return None;
    }
    let key = key?;
    let value: f64 = payload.trim().parse().ok().filter(|v: &f64| v.is_finite())?;
    fields.insert(key.as_str().to_string(), serde_json::Value::from(value));
    Some(TelemetryMessage {
        lookup,
        measurements: vec![(key, value)],
        state: None,
        fields,
    })
}
