//! Device: a field device (plug, relay, meter, sensor) reporting telemetry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FieldHubError, ValidationError};
use crate::id::{AssetId, DeviceId, GatewayId, OrganizationId};
use crate::time::Timestamp;

/// Hardware vendor, used to pick a control implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Brand {
    Shelly,
    Tapo,
    Tuya,
    #[default]
    #[serde(other)]
    Generic,
}

impl Brand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shelly => "shelly",
            Self::Tapo => "tapo",
            Self::Tuya => "tuya",
            Self::Generic => "generic",
        }
    }

    /// Parse a stored brand tag, falling back to [`Brand::Generic`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "shelly" => Self::Shelly,
            "tapo" => Self::Tapo,
            "tuya" => Self::Tuya,
            _ => Self::Generic,
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical device owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub organization_id: OrganizationId,
    /// Identifier used on the wire (MQTT client id, vendor device id).
    pub external_id: Option<String>,
    pub name: String,
    pub brand: Brand,
    /// Vendor model family, e.g. `relay`, `dimmer`, `plug`.
    pub device_type: Option<String>,
    pub asset_id: Option<AssetId>,
    pub gateway_id: Option<GatewayId>,
    pub is_active: bool,
    pub online: bool,
    pub last_seen: Option<Timestamp>,
    /// Last known relay state, reported or commanded.
    pub is_on: Option<bool>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when `name` is empty.
    pub fn validate(&self) -> Result<(), FieldHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// Name folded to lowercase with spaces and dashes as underscores,
    /// the shape device short-names take on sensor topics.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Fold a display name or short-name into a comparable slug.
#[must_use]
pub fn normalize_name(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    organization_id: Option<OrganizationId>,
    external_id: Option<String>,
    name: Option<String>,
    brand: Brand,
    device_type: Option<String>,
    asset_id: Option<AssetId>,
    gateway_id: Option<GatewayId>,
    is_active: Option<bool>,
    online: bool,
    last_seen: Option<Timestamp>,
    is_on: Option<bool>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn organization_id(mut self, id: OrganizationId) -> Self {
        self.organization_id = Some(id);
        self
    }

    #[must_use]
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn brand(mut self, brand: Brand) -> Self {
        self.brand = brand;
        self
    }

    #[must_use]
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    #[must_use]
    pub fn asset_id(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    #[must_use]
    pub fn gateway_id(mut self, gateway_id: GatewayId) -> Self {
        self.gateway_id = Some(gateway_id);
        self
    }

    #[must_use]
    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    #[must_use]
    pub fn last_seen(mut self, ts: Timestamp) -> Self {
        self.last_seen = Some(ts);
        self
    }

    #[must_use]
    pub fn is_on(mut self, is_on: bool) -> Self {
        self.is_on = Some(is_on);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`FieldHubError::Validation`] if the name is empty.
    pub fn build(self) -> Result<Device, FieldHubError> {
        let device = Device {
            id: self.id.unwrap_or_default(),
            organization_id: self.organization_id.unwrap_or_default(),
            external_id: self.external_id,
            name: self.name.unwrap_or_default(),
            brand: self.brand,
            device_type: self.device_type,
            asset_id: self.asset_id,
            gateway_id: self.gateway_id,
            is_active: self.is_active.unwrap_or(true),
            online: self.online,
            last_seen: self.last_seen,
            is_on: self.is_on,
        };
        device.validate()?;
        Ok(device)
    }
}
