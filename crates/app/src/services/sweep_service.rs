//! Organization sweep: the periodic cross-organization watchdog and anomaly pass.

use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::id::OrganizationId;

use crate::ports::{
    CommandPublisher, DeviceRepository, EventPublisher, GatewayRepository, NotificationRepository,
    TelemetryRepository,
};
use crate::services::anomaly_service::AnomalyDetector;
use crate::services::watchdog_service::Watchdog;

/// Totals for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub organizations: usize,
    pub issues: usize,
    pub anomalies: usize,
}

/// Periodic pass running the watchdog and the anomaly scan per organization.
pub struct OrganizationSweep<DR, GR, TR, NR, EP, CP> {
    devices: DR,
    gateways: GR,
    watchdog: Watchdog<DR, GR, NR, CP>,
    detector: AnomalyDetector<DR, TR, NR, EP>,
}

impl<DR, GR, TR, NR, EP, CP> OrganizationSweep<DR, GR, TR, NR, EP, CP>
where
    DR: DeviceRepository + Send + Sync,
    GR: GatewayRepository + Send + Sync,
    TR: TelemetryRepository + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    EP: EventPublisher + Send + Sync,
    CP: CommandPublisher + Send + Sync,
{
    /// Create a new sweep.
    pub fn new(
        devices: DR,
        gateways: GR,
        watchdog: Watchdog<DR, GR, NR, CP>,
        detector: AnomalyDetector<DR, TR, NR, EP>,
    ) -> Self {
        Self {
            devices,
            gateways,
            watchdog,
            detector,
        }
    }

    /// Organizations owning an active device or gateway.
    ///
    /// # Errors
    ///
    /// Returns a storage error from either repository.
    pub async fn organizations(&self) -> Result<Vec<OrganizationId>, FieldHubError> {
        let mut orgs = self.devices.list_organizations().await?;
        orgs.extend(self.gateways.list_organizations().await?);
        orgs.sort();
        orgs.dedup();
        Ok(orgs)
    }

    /// Watchdog scan then anomaly scan for every organization.
    ///
    /// A failing organization is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the organizations cannot be listed.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<SweepSummary, FieldHubError> {
        let mut summary = SweepSummary::default();
        for org in self.organizations().await? {
            summary.organizations += 1;
            match self.watchdog.scan_organization(org).await {
                Ok(issues) => summary.issues += issues.len(),
                Err(err) => {
                    tracing::warn!(organization_id = %org, %err, "watchdog scan failed");
                }
            }
            match self.detector.scan_organization(org).await {
                Ok(verdicts) => summary.anomalies += verdicts.len(),
                Err(err) => {
                    tracing::warn!(organization_id = %org, %err, "anomaly scan failed");
                }
            }
        }
        tracing::info!(
            organizations = summary.organizations,
            issues = summary.issues,
            anomalies = summary.anomalies,
            "sweep complete"
        );
        Ok(summary)
    }

    /// Mark silent devices offline in every organization.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the organizations cannot be listed.
    pub async fn check_devices(&self) -> Result<usize, FieldHubError> {
        let mut offline = 0;
        for org in self.devices.list_organizations().await? {
            match self.watchdog.check_devices(org).await {
                Ok(issues) => offline += issues.len(),
                Err(err) => {
                    tracing::warn!(organization_id = %org, %err, "device check failed");
                }
            }
        }
        Ok(offline)
    }
}
