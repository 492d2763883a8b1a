//! MQTT integration configuration.

use std::time::Duration;

use serde::Deserialize;

const SCHEMES: [&str; 4] = ["mqtt://", "mqtts://", "tcp://", "ssl://"];

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address. `None` disables the bridge.
    pub broker_host: Option<String>,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Namespace prefix for every fieldhub topic.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long the first connection attempt waits for a CONNACK.
    pub connect_timeout_secs: u64,
    pub reconnect_min_secs: u64,
    pub reconnect_max_secs: u64,
    /// Bound of the queue between the network loop and the ingestion worker.
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: None,
            broker_port: 1883,
            client_id: "fieldhub".to_string(),
            username: None,
            password: None,
            base_topic: "fieldhub".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            reconnect_min_secs: 1,
            reconnect_max_secs: 120,
            channel_capacity: 256,
        }
    }
}

impl MqttConfig {
    /// Point the bridge at a broker URL such as `mqtts://broker.local:8883/`.
    ///
    /// The scheme is stripped; an embedded port overrides `broker_port`.
    pub fn apply_broker_url(&mut self, url: &str) {
        let (host, port) = parse_broker_url(url);
        if host.is_empty() {
            return;
        }
        self.broker_host = Some(host);
        if let Some(port) = port {
            self.broker_port = port;
        }
    }

    /// Broker host, if the bridge is enabled.
    #[must_use]
    pub fn enabled_host(&self) -> Option<&str> {
        self.broker_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Split a broker URL into a bare host and an optional port.
#[must_use]
pub fn parse_broker_url(raw: &str) -> (String, Option<u16>) {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let rest = SCHEMES
        .iter()
        .find(|scheme| lowered.starts_with(*scheme))
        .map_or(trimmed, |scheme| &trimmed[scheme.len()..]);
    let rest = rest.trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (rest.to_string(), None),
        },
        None => (rest.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.broker_host, None);
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "fieldhub");
        assert_eq!(config.base_topic, "fieldhub");
        assert_eq!(config.keep_alive_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.reconnect_min_secs, 1);
        assert_eq!(config.reconnect_max_secs, 120);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            broker_host = "mqtt.example.com"
            broker_port = 8883
            client_id = "edge-hub"
            username = "ingest"
            password = "secret"
            base_topic = "plant"
            keep_alive_secs = 60
            channel_capacity = 1024
        "#;
        let config: MqttConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.enabled_host(), Some("mqtt.example.com"));
        assert_eq!(config.broker_port, 8883);
        assert_eq!(config.client_id, "edge-hub");
        assert_eq!(config.username.as_deref(), Some("ingest"));
        assert_eq!(config.base_topic, "plant");
        assert_eq!(config.keep_alive_secs, 60);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.reconnect_max_secs, 120);
    }

    #[test]
    fn should_treat_blank_host_as_disabled() {
        let config: MqttConfig = toml::from_str(r#"broker_host = "  ""#).unwrap();
        assert_eq!(config.enabled_host(), None);
    }

    #[test]
    fn should_strip_scheme_and_trailing_slash() {
        assert_eq!(
            parse_broker_url("MQTT://broker.local/"),
            ("broker.local".to_string(), None)
        );
        assert_eq!(
            parse_broker_url("ssl://broker.local"),
            ("broker.local".to_string(), None)
        );
        assert_eq!(parse_broker_url("10.0.0.5"), ("10.0.0.5".to_string(), None));
    }

    #[test]
    fn should_let_embedded_port_override_configured_port() {
        let mut config = MqttConfig::default();
        config.apply_broker_url("mqtts://broker.local:8883");
        assert_eq!(config.enabled_host(), Some("broker.local"));
        assert_eq!(config.broker_port, 8883);
    }

    #[test]
    fn should_keep_configured_port_when_url_has_none() {
        let mut config = MqttConfig {
            broker_port: 1884,
            ..MqttConfig::default()
        };
        config.apply_broker_url("tcp://broker.local");
        assert_eq!(config.broker_port, 1884);
    }
}
