//! Shelly Gen2 control over MQTT RPC.
//!
//! Requests go to `{external_id}/rpc` as
//! `{"id": n, "src": "...", "method": "...", "params": {...}}`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::{Value, json};

use fieldhub_app::ports::{CommandPublisher, Controllable};
use fieldhub_domain::device::Device;
use fieldhub_domain::error::{FieldHubError, ValidationError};

use crate::error::MqttError;

const DIMMABLE_TYPES: [&str; 2] = ["dimmer", "rgbw"];

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    src: &'a str,
    method: &'a str,
    params: Value,
}

/// [`Controllable`] implementation for Shelly Gen2 devices.
pub struct ShellyController<CP> {
    commands: CP,
    source: String,
    next_id: AtomicU64,
}

impl<CP: CommandPublisher + Send + Sync> ShellyController<CP> {
    /// `source` is the `src` field Shelly echoes in its replies.
    pub fn new(commands: CP, source: impl Into<String>) -> Self {
        Self {
            commands,
            source: source.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        device: &Device,
        method: &str,
        params: Value,
    ) -> Result<(), FieldHubError> {
        let external_id = device
            .external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::MissingExternalId)?;
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            src: &self.source,
            method,
            params,
        };
        let payload = serde_json::to_vec(&request).map_err(MqttError::PayloadParse)?;
        tracing::debug!(device_id = %device.id, %external_id, method, "sending shelly rpc");
        self.commands
            .publish(format!("{external_id}/rpc"), payload)
            .await
    }
}

fn is_dimmable(device: &Device) -> bool {
    device
        .device_type
        .as_deref()
        .is_some_and(|t| DIMMABLE_TYPES.iter().any(|d| t.eq_ignore_ascii_case(d)))
}

impl<CP: CommandPublisher + Send + Sync> Controllable for ShellyController<CP> {
    async fn turn_on(&self, device: &Device) -> Result<(), FieldHubError> {
        self.call(device, "Switch.Set", json!({ "id": 0, "on": true }))
            .await
    }

    async fn turn_off(&self, device: &Device) -> Result<(), FieldHubError> {
        self.call(device, "Switch.Set", json!({ "id": 0, "on": false }))
            .await
    }

    async fn toggle(&self, device: &Device) -> Result<(), FieldHubError> {
        self.call(device, "Switch.Toggle", json!({ "id": 0 })).await
    }

    async fn set_power(&self, device: &Device, level: u8) -> Result<(), FieldHubError> {
        if !is_dimmable(device) {
            return Err(ValidationError::PowerControlUnsupported.into());
        }
        self.call(
            device,
            "Light.Set",
            json!({ "id": 0, "on": level > 0, "brightness": level }),
        )
        .await
    }
}
