//! Gateway: an on-site hub relaying device traffic.

use serde::{Deserialize, Serialize};

use crate::id::{GatewayId, OrganizationId};
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: GatewayId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub serial_number: Option<String>,
    pub is_active: bool,
    pub last_seen: Option<Timestamp>,
}

impl Gateway {
    /// Create an active gateway that has never been seen.
    #[must_use]
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: GatewayId::new(),
            organization_id,
            name: name.into(),
            serial_number: None,
            is_active: true,
            last_seen: None,
        }
    }
}
