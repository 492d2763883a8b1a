//! Anomaly classification using z-scores over a device's own history.
//!
//! The statistics come from storage; this module only decides whether a
//! reading is abnormal given those statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighPower,
    LowPower,
    PowerSpike,
}

impl AnomalyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighPower => "high_power",
            Self::LowPower => "low_power",
            Self::PowerSpike => "power_spike",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict severity.
///
/// [`Severity::Low`] is part of the taxonomy but no rule produces it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Whether a verdict of this severity should create a notification.
    #[must_use]
    pub fn notifies(self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate over a device's trailing history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub mean: f64,
    /// Sample standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

/// Tunable detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub zscore: f64,
    /// `|z|` above which a z-score verdict is [`Severity::High`].
    pub high_zscore: f64,
    pub min_samples: u64,
    pub spike_multiplier: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            zscore: 3.0,
            high_zscore: 4.0,
            min_samples: 10,
            spike_multiplier: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub device_id: DeviceId,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub current_value: f64,
    pub expected_value: f64,
    pub z_score: f64,
    pub deviation_percent: f64,
    pub message: String,
}

/// Classify `current` against `stats`.
///
/// Returns `None` when history is too short or the reading is normal.
#[must_use]
pub fn classify(
    device_id: DeviceId,
    stats: &DeviceStats,
    current: f64,
    thresholds: &Thresholds,
) -> Option<AnomalyVerdict> {
    if stats.count < thresholds.min_samples {
        return None;
    }

    let z_score = if stats.std > 0.0 {
        (current - stats.mean) / stats.std
    } else {
        0.0
    };

    if z_score.abs() > thresholds.zscore {
        let kind = if z_score > 0.0 {
            AnomalyKind::HighPower
        } else {
            AnomalyKind::LowPower
        };
        let severity = if z_score.abs() > thresholds.high_zscore {
            Severity::High
        } else {
            Severity::Medium
        };
        let deviation_percent = if stats.mean > 0.0 {
            (current - stats.mean) / stats.mean * 100.0
        } else {
            0.0
        };
        return Some(AnomalyVerdict {
            device_id,
            kind,
            severity,
            current_value: current,
            expected_value: stats.mean,
            z_score,
            deviation_percent,
            message: zscore_message(kind, current, stats.mean, deviation_percent),
        });
    }

    if stats.mean > 0.0 {
        let ratio = current / stats.mean;
        if ratio > thresholds.spike_multiplier {
            return Some(AnomalyVerdict {
                device_id,
                kind: AnomalyKind::PowerSpike,
                severity: Severity::High,
                current_value: current,
                expected_value: stats.mean,
                z_score,
                deviation_percent: (ratio - 1.0) * 100.0,
                message: format!(
                    "Sudden power spike: {current:.0}W is {ratio:.1}x the usual {:.0}W",
                    stats.mean
                ),
            });
        }
    }

    None
}

fn zscore_message(kind: AnomalyKind, current: f64, mean: f64, deviation_percent: f64) -> String {
    match kind {
        AnomalyKind::HighPower if mean > 0.0 && current > mean * 10.0 => format!(
            "Extremely high consumption: {current:.0}W against a usual {mean:.0}W"
        ),
        AnomalyKind::HighPower if mean > 0.0 && current > mean * 4.0 => {
            format!("High consumption: {current:.0}W against a usual {mean:.0}W")
        }
        AnomalyKind::HighPower => format!(
            "Consumption above normal: {current:.0}W ({deviation_percent:+.0}% vs {mean:.0}W)"
        ),
        AnomalyKind::LowPower if current < mean * 0.1 => format!(
            "Consumption nearly stopped: {current:.0}W against a usual {mean:.0}W"
        ),
        AnomalyKind::LowPower | AnomalyKind::PowerSpike => format!(
            "Consumption below normal: {current:.0}W ({deviation_percent:+.0}% vs {mean:.0}W)"
        ),
    }
}
