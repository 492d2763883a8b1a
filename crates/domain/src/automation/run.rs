//! Audit trail of automation executions.

use serde::{Deserialize, Serialize};

use crate::id::{AutomationId, OrganizationId, RunRecordId};
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    /// The rule was evaluated but did not fire.
    Skipped,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One execution of a rule, appended after each fired evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRunRecord {
    pub id: RunRecordId,
    pub rule_id: AutomationId,
    pub organization_id: OrganizationId,
    pub recorded_at: Timestamp,
    pub action_taken: String,
    pub reason: String,
    pub status: RunStatus,
    pub error: Option<String>,
}
