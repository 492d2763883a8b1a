//! # fieldhub-adapter-mqtt
//!
//! MQTT adapter. Bridges field-device telemetry into fieldhub and sends
//! device commands back over the same broker session.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker with exponential reconnect backoff
//! - Subscribe to `{base_topic}/#` after every (re)connect
//! - Decode structured sensor topics and JSON payloads into
//!   [`TelemetryMessage`](fieldhub_domain::telemetry::TelemetryMessage)s
//! - Implement the `CommandPublisher` port and Shelly Gen2 RPC control
//!
//! ## Dependency rule
//! Same as other adapters: depends on `fieldhub-app` and `fieldhub-domain`.

mod backoff;
mod bridge;
pub mod config;
mod error;
pub mod payload;
mod publisher;
mod shelly;
pub mod topic;

pub use bridge::{MessageHandler, MqttBridge};
pub use config::MqttConfig;
pub use error::MqttError;
pub use payload::decode_message;
pub use publisher::MqttCommandPublisher;
pub use shelly::ShellyController;
