//! Watchdog: liveness monitoring of devices and gateways.

use std::time::Duration;

use fieldhub_domain::device::Device;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::gateway::Gateway;
use fieldhub_domain::health::{DeviceHealthIssue, HealthStatus, HealthTarget, Timeouts, assess};
use fieldhub_domain::id::OrganizationId;
use fieldhub_domain::notification::{Notification, NotificationKind};
use fieldhub_domain::time::{Timestamp, key_stamp, now};

use crate::ports::{CommandPublisher, DeviceRepository, GatewayRepository, NotificationRepository};

/// Liveness timeouts and reset behaviour.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub device: Timeouts,
    pub gateway: Timeouts,
    /// Topic namespace for remediation commands.
    pub namespace: String,
    /// Send a reset command to every device found critical during a sweep.
    pub auto_reset_critical: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let critical = Duration::from_secs(30 * 60);
        Self {
            device: Timeouts {
                unresponsive: Duration::from_secs(5 * 60),
                critical,
            },
            gateway: Timeouts {
                unresponsive: Duration::from_secs(10 * 60),
                critical,
            },
            namespace: "fieldhub".to_string(),
            auto_reset_critical: false,
        }
    }
}

/// Liveness monitor for devices and gateways.
pub struct Watchdog<DR, GR, NR, CP> {
    devices: DR,
    gateways: GR,
    notifications: NR,
    commands: CP,
    config: WatchdogConfig,
}

impl<DR, GR, NR, CP> Watchdog<DR, GR, NR, CP>
where
    DR: DeviceRepository + Send + Sync,
    GR: GatewayRepository + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    CP: CommandPublisher + Send + Sync,
{
    /// Create a new watchdog.
    pub fn new(
        devices: DR,
        gateways: GR,
        notifications: NR,
        commands: CP,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            devices,
            gateways,
            notifications,
            commands,
            config,
        }
    }

    #[must_use]
    pub fn check_device(&self, device: &Device, at: Timestamp) -> Option<DeviceHealthIssue> {
        assess(device.last_seen, at, self.config.device).map(|assessment| {
            DeviceHealthIssue::new(
                HealthTarget::Device,
                device.id.as_uuid(),
                &device.name,
                device.last_seen,
                assessment,
            )
            .with_external_id(device.external_id.clone())
        })
    }

    #[must_use]
    pub fn check_gateway(&self, gateway: &Gateway, at: Timestamp) -> Option<DeviceHealthIssue> {
        assess(gateway.last_seen, at, self.config.gateway).map(|assessment| {
            DeviceHealthIssue::new(
                HealthTarget::Gateway,
                gateway.id.as_uuid(),
                &gateway.name,
                gateway.last_seen,
                assessment,
            )
            .with_external_id(gateway.serial_number.clone())
        })
    }

    /// Mark silent devices offline, without notifying.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the device repository.
    #[tracing::instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn check_devices(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<DeviceHealthIssue>, FieldHubError> {
        let at = now();
        let devices = self
            .devices
            .list_active_by_organization(organization_id)
            .await?;
        let mut issues = Vec::new();
        for device in &devices {
            if let Some(issue) = self.check_device(device, at) {
                self.take_offline(device).await?;
                issues.push(issue);
            }
        }
        Ok(issues)
    }

    /// Check devices then gateways and notify once per outage and status.
    ///
    /// # Errors
    ///
    /// Returns a storage error from any repository.
    #[tracing::instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn scan_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<DeviceHealthIssue>, FieldHubError> {
        let at = now();
        let devices = self
            .devices
            .list_active_by_organization(organization_id)
            .await?;
        let gateways = self
            .gateways
            .list_active_by_organization(organization_id)
            .await?;

        let mut issues = Vec::new();
        let mut critical_devices = Vec::new();
        for device in &devices {
            if let Some(issue) = self.check_device(device, at) {
                self.take_offline(device).await?;
                if issue.status == HealthStatus::Critical {
                    critical_devices.push(device);
                }
                issues.push(issue);
            }
        }
        issues.extend(gateways.iter().filter_map(|g| self.check_gateway(g, at)));

        for issue in &issues {
            self.notify(organization_id, issue).await?;
        }

        if self.config.auto_reset_critical {
            for device in critical_devices {
                self.send_reset_command(device).await;
            }
        }

        if !issues.is_empty() {
            tracing::info!(count = issues.len(), "health issues found");
        }
        Ok(issues)
    }

    /// Ask a device to reboot itself.
    ///
    /// Returns `false` when the device has no external id or the broker is
    /// unreachable.
    pub async fn send_reset_command(&self, device: &Device) -> bool {
        let Some(external_id) = device.external_id.as_deref() else {
            tracing::debug!(device_id = %device.id, "no external id, reset skipped");
            return false;
        };
        let topic = format!("{}/devices/{external_id}/command", self.config.namespace);
        let payload = serde_json::json!({"action": "reset", "source": "watchdog"}).to_string();

        match self.commands.publish(topic, payload.into_bytes()).await {
            Ok(()) => {
                tracing::info!(device_id = %device.id, "reset command sent");
                true
            }
            Err(err) => {
                tracing::warn!(device_id = %device.id, %err, "reset command failed");
                false
            }
        }
    }

    async fn take_offline(&self, device: &Device) -> Result<(), FieldHubError> {
        if device.online {
            tracing::info!(device_id = %device.id, "device marked offline");
            self.devices.mark_offline(device.id).await?;
        }
        Ok(())
    }

    async fn notify(
        &self,
        organization_id: OrganizationId,
        issue: &DeviceHealthIssue,
    ) -> Result<(), FieldHubError> {
        let last_seen = issue
            .last_seen
            .map_or_else(|| "never".to_string(), key_stamp);
        let notification = Notification::new(
            organization_id,
            NotificationKind::Watchdog,
            "Device health alert",
            issue.message.clone(),
            issue.severity.into(),
        )
        .with_payload(serde_json::json!({
            "issue_type": issue.target.as_str(),
            "device_id": issue.target_id,
            "device_name": issue.name,
            "status": issue.status.as_str(),
            "offline_duration_minutes": issue.offline_minutes(),
        }))
        .with_dedup_key(format!(
            "watchdog:{}:{}:{}:{last_seen}",
            issue.target.as_str(),
            issue.target_id,
            issue.status.as_str(),
        ));
        self.notifications.create(notification).await?;
        Ok(())
    }
}
