//! Ingestion service: turns decoded broker messages into stored telemetry.
//!
//! Each message is resolved to a registered device, persisted as one batch
//! of samples, then fanned out: liveness update, relay state, inline
//! anomaly check and live events for the device's organization.

use fieldhub_domain::anomaly::AnomalyVerdict;
use fieldhub_domain::device::{Device, normalize_name};
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::event::{Event, EventType};
use fieldhub_domain::id::DeviceId;
use fieldhub_domain::telemetry::{DeviceLookup, TelemetryMessage, TelemetrySample};
use fieldhub_domain::time::{Timestamp, now};

use crate::ports::{DeviceRepository, EventPublisher, NotificationRepository, TelemetryRepository};
use crate::services::anomaly_service::AnomalyDetector;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// No active device matched; the message was dropped.
    Unresolved,
    Ingested {
        device_id: DeviceId,
        samples: usize,
        anomaly: Option<AnomalyVerdict>,
    },
}

/// Ingestion pipeline from decoded broker messages to storage and live events.
pub struct IngestionService<DR, TR, NR, EP> {
    devices: DR,
    telemetry: TR,
    publisher: EP,
    detector: AnomalyDetector<DR, TR, NR, EP>,
}

impl<DR, TR, NR, EP> IngestionService<DR, TR, NR, EP>
where
    DR: DeviceRepository + Send + Sync,
    TR: TelemetryRepository + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    EP: EventPublisher + Send + Sync,
{
    /// Create a new ingestion service.
    pub fn new(
        devices: DR,
        telemetry: TR,
        publisher: EP,
        detector: AnomalyDetector<DR, TR, NR, EP>,
    ) -> Self {
        Self {
            devices,
            telemetry,
            publisher,
            detector,
        }
    }

    /// Find the active device a message refers to.
    ///
    /// Explicit ids are tried first (internal UUID, then external id), then
    /// the topic short-name as an external id, then a normalised name match.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the device repository.
    pub async fn resolve_device(
        &self,
        lookup: &DeviceLookup,
    ) -> Result<Option<Device>, FieldHubError> {
        if let Some(explicit) = lookup.explicit_id.as_deref() {
            if let Ok(id) = explicit.parse::<DeviceId>()
                && let Some(device) = self.devices.get_by_id(id).await?.filter(|d| d.is_active)
            {
                return Ok(Some(device));
            }
            if let Some(device) = self.devices.find_by_external_id(explicit).await? {
                return Ok(Some(device));
            }
        }

        if let Some(short_name) = lookup.short_name.as_deref()
            && let Some(device) = self.devices.find_by_external_id(short_name).await?
        {
            return Ok(Some(device));
        }

        match lookup.name_hint() {
            Some(hint) if !hint.trim().is_empty() => {
                self.devices
                    .find_by_normalized_name(&normalize_name(hint))
                    .await
            }
            _ => Ok(None),
        }
    }

    /// Ingest one decoded message.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the samples or the liveness update
    /// cannot be written. Anomaly and event failures are logged only.
    #[tracing::instrument(skip(self, message), fields(lookup = ?message.lookup))]
    pub async fn handle_message(
        &self,
        message: TelemetryMessage,
    ) -> Result<IngestOutcome, FieldHubError> {
        let Some(device) = self.resolve_device(&message.lookup).await? else {
            tracing::debug!("no device matched telemetry");
            return Ok(IngestOutcome::Unresolved);
        };

        let at = now();
        let samples: Vec<TelemetrySample> = message
            .measurements
            .iter()
            .map(|(key, value)| TelemetrySample::new(device.id, at, key.clone(), *value))
            .collect();
        let sample_count = samples.len();

        if !samples.is_empty()
            && let Err(err) = self.telemetry.record_batch(samples).await
        {
            tracing::warn!(device_id = %device.id, %err, "failed to store telemetry");
            return Err(err);
        }

        self.devices.mark_seen(device.id, at).await?;
        if let Some(is_on) = message.state {
            self.devices.set_power_state(device.id, is_on).await?;
        }

        let anomaly = match message.power_w() {
            Some(power) => match self.detector.inspect(&device, power, at).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::warn!(device_id = %device.id, %err, "anomaly check failed");
                    None
                }
            },
            None => None,
        };

        self.publish_telemetry(&device, &message, at).await;
        if message.state.is_some() || !device.online {
            self.publish_status(&device, message.state.or(device.is_on), at)
                .await;
        }

        tracing::debug!(device_id = %device.id, samples = sample_count, "telemetry ingested");
        Ok(IngestOutcome::Ingested {
            device_id: device.id,
            samples: sample_count,
            anomaly,
        })
    }

    async fn publish_telemetry(&self, device: &Device, message: &TelemetryMessage, at: Timestamp) {
        let event = Event::new(
            device.organization_id,
            EventType::Telemetry,
            serde_json::json!({
                "device_id": device.id,
                "external_id": device.external_id,
                "name": device.name,
                "data": message.fields,
                "timestamp": at,
            }),
        );
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish telemetry event");
        }
    }

    async fn publish_status(&self, device: &Device, is_on: Option<bool>, at: Timestamp) {
        let mut data = serde_json::json!({
            "device_id": device.id,
            "is_online": true,
            "timestamp": at,
        });
        if let Some(is_on) = is_on {
            data["is_on"] = is_on.into();
            data["state"] = if is_on { "on" } else { "off" }.into();
        }
        let event = Event::new(device.organization_id, EventType::DeviceStatus, data);
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish device status");
        }
    }
}
