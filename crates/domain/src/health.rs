//! Liveness assessment for devices and gateways.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTarget {
    Device,
    Gateway,
}

impl HealthTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Gateway => "gateway",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    NeverSeen,
    Unresponsive,
    Critical,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeverSeen => "never_seen",
            Self::Unresponsive => "unresponsive",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

impl IssueSeverity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Silence thresholds for one kind of target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub unresponsive: Duration,
    pub critical: Duration,
}

/// Outcome of a liveness check that found a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub status: HealthStatus,
    pub severity: IssueSeverity,
    pub offline_for: Option<Duration>,
}

/// Classify a target from its last contact.
///
/// Thresholds are strict: exactly `unresponsive` of silence is still healthy.
#[must_use]
pub fn assess(
    last_seen: Option<Timestamp>,
    now: Timestamp,
    timeouts: Timeouts,
) -> Option<Assessment> {
    let Some(last_seen) = last_seen else {
        return Some(Assessment {
            status: HealthStatus::NeverSeen,
            severity: IssueSeverity::Warning,
            offline_for: None,
        });
    };

    // Clock skew can put last_seen in the future; treat it as just seen.
    let silence = (now - last_seen).to_std().unwrap_or_default();

    if silence > timeouts.critical {
        Some(Assessment {
            status: HealthStatus::Critical,
            severity: IssueSeverity::Critical,
            offline_for: Some(silence),
        })
    } else if silence > timeouts.unresponsive {
        Some(Assessment {
            status: HealthStatus::Unresponsive,
            severity: IssueSeverity::Warning,
            offline_for: Some(silence),
        })
    } else {
        None
    }
}

/// A liveness problem found by the watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHealthIssue {
    pub target: HealthTarget,
    pub target_id: uuid::Uuid,
    pub name: String,
    pub external_id: Option<String>,
    pub status: HealthStatus,
    pub severity: IssueSeverity,
    #[serde(with = "duration_secs")]
    pub offline_for: Option<Duration>,
    pub last_seen: Option<Timestamp>,
    pub message: String,
}

impl DeviceHealthIssue {
    #[must_use]
    pub fn new(
        target: HealthTarget,
        target_id: uuid::Uuid,
        name: impl Into<String>,
        last_seen: Option<Timestamp>,
        assessment: Assessment,
    ) -> Self {
        let name = name.into();
        let message = describe(target, &name, assessment);
        Self {
            target,
            target_id,
            name,
            external_id: None,
            status: assessment.status,
            severity: assessment.severity,
            offline_for: assessment.offline_for,
            last_seen,
            message,
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    /// Offline duration in whole minutes.
    #[must_use]
    pub fn offline_minutes(&self) -> Option<u64> {
        self.offline_for.map(|d| d.as_secs() / 60)
    }
}

fn describe(target: HealthTarget, name: &str, assessment: Assessment) -> String {
    let label = match target {
        HealthTarget::Device => "Device",
        HealthTarget::Gateway => "Gateway",
    };
    let minutes = assessment.offline_for.map_or(0, |d| d.as_secs() / 60);
    match assessment.status {
        HealthStatus::NeverSeen => format!("{label} {name} has never reported"),
        HealthStatus::Unresponsive => {
            format!("{label} {name} has not responded for {minutes} minutes")
        }
        HealthStatus::Critical => {
            format!("{label} {name} has been offline for {minutes} minutes")
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn device_timeouts() -> Timeouts {
        Timeouts {
            unresponsive: Duration::from_secs(5 * 60),
            critical: Duration::from_secs(30 * 60),
        }
    }

    #[test]
    fn should_report_never_seen_as_warning() {
        let assessment = assess(None, crate::time::now(), device_timeouts()).unwrap();
        assert_eq!(assessment.status, HealthStatus::NeverSeen);
        assert_eq!(assessment.severity, IssueSeverity::Warning);
        assert!(assessment.offline_for.is_none());
    }

    #[test]
    fn should_report_unresponsive_after_six_minutes() {
        let now = crate::time::now();
        let assessment = assess(
            Some(now - TimeDelta::minutes(6)),
            now,
            device_timeouts(),
        )
        .unwrap();
        assert_eq!(assessment.status, HealthStatus::Unresponsive);
        assert_eq!(assessment.severity, IssueSeverity::Warning);
    }

    #[test]
    fn should_report_critical_after_thirty_one_minutes() {
        let now = crate::time::now();
        let assessment = assess(
            Some(now - TimeDelta::minutes(31)),
            now,
            device_timeouts(),
        )
        .unwrap();
        assert_eq!(assessment.status, HealthStatus::Critical);
        assert_eq!(assessment.severity, IssueSeverity::Critical);
    }

    #[test]
    fn should_stay_healthy_at_exact_timeout() {
        let now = crate::time::now();
        let assessment = assess(Some(now - TimeDelta::minutes(5)), now, device_timeouts());
        assert!(assessment.is_none());
    }

    #[test]
    fn should_stay_healthy_when_last_seen_is_in_the_future() {
        let now = crate::time::now();
        let assessment = assess(Some(now + TimeDelta::minutes(2)), now, device_timeouts());
        assert!(assessment.is_none());
    }

    #[test]
    fn should_describe_issue_with_offline_minutes() {
        let now = crate::time::now();
        let last_seen = now - TimeDelta::minutes(40);
        let assessment = assess(Some(last_seen), now, device_timeouts()).unwrap();
        let issue = DeviceHealthIssue::new(
            HealthTarget::Device,
            uuid::Uuid::new_v4(),
            "Boiler plug",
            Some(last_seen),
            assessment,
        );
        assert_eq!(issue.offline_minutes(), Some(40));
        assert_eq!(issue.message, "Device Boiler plug has been offline for 40 minutes");
    }
}
