//! Notifications raised by the anomaly detector, the watchdog and rules.

use serde::{Deserialize, Serialize};

use crate::anomaly::Severity;
use crate::health::IssueSeverity;
use crate::id::{NotificationId, OrganizationId};
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Anomaly,
    Watchdog,
    Automation,
}

impl NotificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anomaly => "anomaly",
            Self::Watchdog => "watchdog",
            Self::Automation => "automation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
        }
    }
}

impl From<IssueSeverity> for Priority {
    fn from(severity: IssueSeverity) -> Self {
        match severity {
            IssueSeverity::Warning => Self::Medium,
            IssueSeverity::Critical => Self::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub organization_id: OrganizationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub payload: serde_json::Value,
    /// Notifications sharing a key are created at most once.
    pub dedup_key: Option<String>,
    pub created_at: Timestamp,
}

impl Notification {
    /// Create a notification without payload or dedup key.
    #[must_use]
    pub fn new(
        organization_id: OrganizationId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            organization_id,
            kind,
            title: title.into(),
            message: message.into(),
            priority,
            payload: serde_json::Value::Null,
            dedup_key: None,
            created_at: crate::time::now(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}
