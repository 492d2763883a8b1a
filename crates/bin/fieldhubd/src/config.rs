//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `fieldhub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use chrono::{FixedOffset, Offset, TimeDelta, Utc};
use serde::Deserialize;

use fieldhub_adapter_mqtt::MqttConfig;
use fieldhub_app::automation_engine::EngineConfig;
use fieldhub_app::services::anomaly_service::AnomalyConfig;
use fieldhub_app::services::watchdog_service::WatchdogConfig;
use fieldhub_domain::anomaly::Thresholds;
use fieldhub_domain::health::Timeouts;

const CONFIG_FILE: &str = "fieldhub.toml";
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Broker connection for ingestion and device commands.
    pub mqtt: MqttConfig,
    pub automation: AutomationConfig,
    pub anomaly: AnomalySettings,
    pub watchdog: WatchdogSettings,
    pub scheduler: SchedulerConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Fixed offset of the local clock used for time and weekday triggers.
    pub utc_offset_minutes: i32,
    pub action_timeout_secs: u64,
    /// Write a `skipped` run record for rules that did not fire.
    pub record_skipped_runs: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    pub zscore_threshold: f64,
    pub high_zscore: f64,
    pub min_samples: u64,
    pub lookback_days: u32,
    pub spike_multiplier: f64,
    pub use_hourly_pattern: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub device_timeout_secs: u64,
    pub gateway_timeout_secs: u64,
    pub critical_timeout_secs: u64,
    pub auto_reset_critical: bool,
}

/// Cadence of the periodic jobs.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub automation_interval_secs: u64,
    pub device_check_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Retries for the device check and the sweep.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Config {
    /// Load configuration from `fieldhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(CONFIG_FILE)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("FIELDHUB_HOST") {
            self.server.host = val;
        }
        if let Some(val) = var("FIELDHUB_PORT")
            && let Ok(port) = val.parse()
        {
            self.server.port = port;
        }
        if let Some(val) = var("FIELDHUB_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("FIELDHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("FIELDHUB_MQTT_URL") {
            self.mqtt.apply_broker_url(&val);
        }
        if let Some(val) = var("FIELDHUB_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = var("FIELDHUB_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(val) = var("FIELDHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return invalid("port must be non-zero");
        }
        if self.mqtt.reconnect_min_secs == 0 {
            return invalid("mqtt.reconnect_min_secs must be non-zero");
        }
        if self.mqtt.reconnect_min_secs > self.mqtt.reconnect_max_secs {
            return invalid("mqtt.reconnect_min_secs must not exceed mqtt.reconnect_max_secs");
        }
        if self.automation.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return invalid("automation.utc_offset_minutes must be within ±18 hours");
        }
        let watchdog = &self.watchdog;
        if watchdog.critical_timeout_secs <= watchdog.device_timeout_secs
            || watchdog.critical_timeout_secs <= watchdog.gateway_timeout_secs
        {
            return invalid(
                "watchdog.critical_timeout_secs must exceed the device and gateway timeouts",
            );
        }
        let anomaly = &self.anomaly;
        if anomaly.zscore_threshold <= 0.0
            || anomaly.high_zscore <= 0.0
            || anomaly.spike_multiplier <= 0.0
        {
            return invalid("anomaly thresholds must be positive");
        }
        let scheduler = &self.scheduler;
        if scheduler.automation_interval_secs == 0
            || scheduler.device_check_interval_secs == 0
            || scheduler.sweep_interval_secs == 0
        {
            return invalid("scheduler intervals must be non-zero");
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        // the offset range is checked in `validate`
        let utc_offset = FixedOffset::east_opt(self.automation.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        EngineConfig {
            utc_offset,
            action_timeout: Duration::from_secs(self.automation.action_timeout_secs),
            record_skipped_runs: self.automation.record_skipped_runs,
        }
    }

    #[must_use]
    pub fn anomaly_config(&self) -> AnomalyConfig {
        let anomaly = &self.anomaly;
        AnomalyConfig {
            thresholds: Thresholds {
                zscore: anomaly.zscore_threshold,
                high_zscore: anomaly.high_zscore,
                min_samples: anomaly.min_samples,
                spike_multiplier: anomaly.spike_multiplier,
            },
            lookback: TimeDelta::days(i64::from(anomaly.lookback_days)),
            use_hourly_pattern: anomaly.use_hourly_pattern,
        }
    }

    /// Remediation commands go under the MQTT base topic.
    #[must_use]
    pub fn watchdog_config(&self) -> WatchdogConfig {
        let watchdog = &self.watchdog;
        let critical = Duration::from_secs(watchdog.critical_timeout_secs);
        WatchdogConfig {
            device: Timeouts {
                unresponsive: Duration::from_secs(watchdog.device_timeout_secs),
                critical,
            },
            gateway: Timeouts {
                unresponsive: Duration::from_secs(watchdog.gateway_timeout_secs),
                critical,
            },
            namespace: self.mqtt.base_topic.clone(),
            auto_reset_critical: watchdog.auto_reset_critical,
        }
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Validation(message.to_string()))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:fieldhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fieldhubd=info,fieldhub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            action_timeout_secs: 10,
            record_skipped_runs: false,
        }
    }
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            zscore_threshold: 3.0,
            high_zscore: 4.0,
            min_samples: 10,
            lookback_days: 7,
            spike_multiplier: 4.0,
            use_hourly_pattern: true,
        }
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            device_timeout_secs: 300,
            gateway_timeout_secs: 600,
            critical_timeout_secs: 1800,
            auto_reset_critical: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            automation_interval_secs: 60,
            device_check_interval_secs: 300,
            sweep_interval_secs: 600,
            max_retries: 2,
            retry_delay_secs: 5,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_env(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).cloned());
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:fieldhub.db?mode=rwc");
        assert_eq!(config.mqtt.broker_host, None);
        assert_eq!(config.scheduler.automation_interval_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.watchdog.critical_timeout_secs, 1800);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [mqtt]
            broker_host = 'broker.local'
            broker_port = 8883
            base_topic = 'site-a'

            [automation]
            utc_offset_minutes = 180
            record_skipped_runs = true

            [anomaly]
            zscore_threshold = 2.5
            use_hourly_pattern = false

            [watchdog]
            auto_reset_critical = true

            [scheduler]
            sweep_interval_secs = 900
            max_retries = 5
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.mqtt.enabled_host(), Some("broker.local"));
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.automation.utc_offset_minutes, 180);
        assert!(config.automation.record_skipped_runs);
        assert!((config.anomaly.zscore_threshold - 2.5).abs() < f64::EPSILON);
        assert!(!config.anomaly.use_hourly_pattern);
        assert!(config.watchdog.auto_reset_critical);
        assert_eq!(config.scheduler.sweep_interval_secs, 900);
        assert_eq!(config.scheduler.max_retries, 5);
        assert_eq!(config.scheduler.retry_delay_secs, 5);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_apply_environment_overrides() {
        let config = with_env(&[
            ("FIELDHUB_BIND", "127.0.0.1:8080"),
            ("FIELDHUB_DATABASE_URL", "sqlite::memory:"),
            ("FIELDHUB_MQTT_URL", "mqtts://broker.example.com:8883/"),
            ("FIELDHUB_MQTT_USERNAME", "hub"),
            ("FIELDHUB_LOG", "debug"),
        ]);

        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.mqtt.enabled_host(), Some("broker.example.com"));
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("hub"));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_prefer_rust_log_over_fieldhub_log() {
        let config = with_env(&[("FIELDHUB_LOG", "debug"), ("RUST_LOG", "trace")]);
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_ignore_unparseable_port_override() {
        let config = with_env(&[("FIELDHUB_PORT", "http")]);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_inverted_reconnect_bounds() {
        let mut config = Config::default();
        config.mqtt.reconnect_min_secs = 300;
        assert!(config.validate().is_err());

        config.mqtt.reconnect_min_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_critical_timeout_below_entity_timeouts() {
        let mut config = Config::default();
        config.watchdog.critical_timeout_secs = 600;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_non_positive_thresholds() {
        let mut config = Config::default();
        config.anomaly.zscore_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_intervals() {
        let mut config = Config::default();
        config.scheduler.device_check_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_out_of_range_utc_offset() {
        let mut config = Config::default();
        config.automation.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_build_service_configs() {
        let mut config = Config::default();
        config.automation.utc_offset_minutes = -300;
        config.mqtt.base_topic = "site-a".to_string();

        let engine = config.engine_config();
        assert_eq!(engine.utc_offset.local_minus_utc(), -300 * 60);
        assert_eq!(engine.action_timeout, Duration::from_secs(10));

        let anomaly = config.anomaly_config();
        assert_eq!(anomaly.lookback, TimeDelta::days(7));
        assert_eq!(anomaly.thresholds.min_samples, 10);

        let watchdog = config.watchdog_config();
        assert_eq!(watchdog.namespace, "site-a");
        assert_eq!(watchdog.device.unresponsive, Duration::from_secs(300));
        assert_eq!(watchdog.gateway.critical, Duration::from_secs(1800));
    }
}
