//! Anomaly detector: flags power readings that stray from a device's history.

use chrono::{TimeDelta, Timelike};

use fieldhub_domain::anomaly::{AnomalyVerdict, DeviceStats, Thresholds, classify};
use fieldhub_domain::device::Device;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::event::{Event, EventType};
use fieldhub_domain::id::{DeviceId, OrganizationId};
use fieldhub_domain::notification::{Notification, NotificationKind};
use fieldhub_domain::telemetry::MeasurementKey;
use fieldhub_domain::time::{Timestamp, key_stamp, now};

use crate::ports::{
    DeviceRepository, EventPublisher, NotificationRepository, StatsWindow, TelemetryRepository,
};

/// Detection thresholds and the history window.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyConfig {
    pub thresholds: Thresholds,
    /// Length of the history window ending at the reading.
    pub lookback: TimeDelta,
    /// Compare only against samples taken in the same UTC hour.
    pub use_hourly_pattern: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            lookback: TimeDelta::days(7),
            use_hourly_pattern: true,
        }
    }
}

/// Z-score detector over the trailing `power_w` history of each device.
pub struct AnomalyDetector<DR, TR, NR, EP> {
    devices: DR,
    telemetry: TR,
    notifications: NR,
    publisher: EP,
    config: AnomalyConfig,
}

impl<DR, TR, NR, EP> AnomalyDetector<DR, TR, NR, EP>
where
    DR: DeviceRepository + Send + Sync,
    TR: TelemetryRepository + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    EP: EventPublisher + Send + Sync,
{
    /// Create a new detector.
    pub fn new(
        devices: DR,
        telemetry: TR,
        notifications: NR,
        publisher: EP,
        config: AnomalyConfig,
    ) -> Self {
        Self {
            devices,
            telemetry,
            notifications,
            publisher,
            config,
        }
    }

    /// Aggregate `power_w` over `[at - lookback, at)`, optionally for one hour of day.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the telemetry repository.
    pub async fn device_stats(
        &self,
        device_id: DeviceId,
        hour: Option<u32>,
        at: Timestamp,
    ) -> Result<DeviceStats, FieldHubError> {
        let window = StatsWindow {
            since: at - self.config.lookback,
            until: at,
            hour,
        };
        self.telemetry
            .stats(device_id, &MeasurementKey::PowerW, window)
            .await
    }

    /// Classify `current` against the device's history as of `at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the telemetry repository.
    #[tracing::instrument(skip(self), fields(device_id = %device_id))]
    pub async fn check_power_anomaly(
        &self,
        device_id: DeviceId,
        current: f64,
        at: Timestamp,
    ) -> Result<Option<AnomalyVerdict>, FieldHubError> {
        let hour = self.config.use_hourly_pattern.then(|| at.hour());
        let stats = self.device_stats(device_id, hour, at).await?;
        Ok(classify(
            device_id,
            &stats,
            current,
            &self.config.thresholds,
        ))
    }

    /// Check a fresh reading and report it when the verdict notifies.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the telemetry or notification repository.
    pub async fn inspect(
        &self,
        device: &Device,
        current: f64,
        at: Timestamp,
    ) -> Result<Option<AnomalyVerdict>, FieldHubError> {
        let verdict = self.check_power_anomaly(device.id, current, at).await?;
        if let Some(verdict) = &verdict
            && verdict.severity.notifies()
        {
            self.report(device, verdict, at).await?;
        }
        Ok(verdict)
    }

    /// Check the latest `power_w` of every online device in an organization.
    ///
    /// # Errors
    ///
    /// Returns a storage error from any repository.
    #[tracing::instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn scan_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<AnomalyVerdict>, FieldHubError> {
        let devices = self
            .devices
            .list_active_by_organization(organization_id)
            .await?;
        let mut verdicts = Vec::new();

        for device in devices.iter().filter(|d| d.online) {
            let Some(latest) = self
                .telemetry
                .latest(device.id, &MeasurementKey::PowerW)
                .await?
            else {
                continue;
            };
            if let Some(verdict) = self.inspect(device, latest.value, latest.recorded_at).await? {
                verdicts.push(verdict);
            }
        }

        if !verdicts.is_empty() {
            tracing::info!(count = verdicts.len(), "anomalies found");
        }
        Ok(verdicts)
    }

    async fn report(
        &self,
        device: &Device,
        verdict: &AnomalyVerdict,
        sample_at: Timestamp,
    ) -> Result<(), FieldHubError> {
        let notification = Notification::new(
            device.organization_id,
            NotificationKind::Anomaly,
            "Unusual activity detected",
            verdict.message.clone(),
            verdict.severity.into(),
        )
        .with_payload(serde_json::json!({
            "anomaly_type": verdict.kind.as_str(),
            "device_id": device.id,
            "device_name": device.name,
            "current_value": verdict.current_value,
            "expected_value": verdict.expected_value,
            "zscore": verdict.z_score,
        }))
        .with_dedup_key(format!(
            "anomaly:{}:{}:{}",
            device.id,
            verdict.kind.as_str(),
            key_stamp(sample_at)
        ));

        if !self.notifications.create(notification).await? {
            tracing::debug!(device_id = %device.id, "anomaly already reported");
            return Ok(());
        }

        tracing::warn!(
            device_id = %device.id,
            kind = verdict.kind.as_str(),
            severity = verdict.severity.as_str(),
            z_score = verdict.z_score,
            "power anomaly"
        );

        let event = Event::new(
            device.organization_id,
            EventType::AnomalyDetected,
            serde_json::json!({
                "device_id": device.id,
                "device_name": device.name,
                "type": verdict.kind.as_str(),
                "severity": verdict.severity.as_str(),
                "message": verdict.message,
                "current_value": verdict.current_value,
                "expected_value": verdict.expected_value,
                "timestamp": now(),
            }),
        );
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish anomaly event");
        }
        Ok(())
    }
}
