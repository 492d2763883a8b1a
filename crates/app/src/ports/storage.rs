//! Storage port: repository traits for persistence.

use std::future::Future;
use std::sync::Arc;

use fieldhub_domain::anomaly::DeviceStats;
use fieldhub_domain::automation::{AutomationRule, AutomationRunRecord};
use fieldhub_domain::device::Device;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::gateway::Gateway;
use fieldhub_domain::id::{AssetId, AutomationId, DeviceId, OrganizationId};
use fieldhub_domain::telemetry::{MeasurementKey, TelemetrySample};
use fieldhub_domain::time::Timestamp;

/// Repository for [`Device`]s and their liveness fields.
///
/// Lookups used for message resolution only return active devices.
pub trait DeviceRepository {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, FieldHubError>> + Send;

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send;

    /// Find an active device by its wire identifier.
    fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send;

    /// Find an active device whose normalized name contains `needle`.
    ///
    /// `needle` is already normalized (lowercase, `_` for spaces and dashes).
    fn find_by_normalized_name(
        &self,
        needle: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send;

    /// Find the active device linked to a logical asset.
    fn find_by_asset(
        &self,
        asset_id: AssetId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send;

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Device>, FieldHubError>> + Send;

    /// Organizations owning at least one active device.
    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send;

    /// Set `online = true` and `last_seen = at`.
    fn mark_seen(
        &self,
        id: DeviceId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    /// Set `online = false`, leaving `last_seen` untouched.
    fn mark_offline(&self, id: DeviceId) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    fn set_power_state(
        &self,
        id: DeviceId,
        is_on: bool,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;
}

/// Repository for [`Gateway`]s.
pub trait GatewayRepository {
    fn create(&self, gateway: Gateway)
    -> impl Future<Output = Result<Gateway, FieldHubError>> + Send;

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Gateway>, FieldHubError>> + Send;

    /// Organizations owning at least one active gateway.
    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send;
}

/// Time window for [`TelemetryRepository::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    /// Inclusive lower bound.
    pub since: Timestamp,
    /// Exclusive upper bound.
    pub until: Timestamp,
    /// Restrict to samples recorded in this UTC hour.
    pub hour: Option<u32>,
}

/// Append-only store of [`TelemetrySample`]s.
pub trait TelemetryRepository {
    /// Persist all samples atomically: either every row is written or none.
    fn record_batch(
        &self,
        samples: Vec<TelemetrySample>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    /// Most recent sample for a device and key.
    fn latest(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
    ) -> impl Future<Output = Result<Option<TelemetrySample>, FieldHubError>> + Send;

    /// Aggregate samples in `window`. An empty window yields `count = 0`.
    fn stats(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
        window: StatsWindow,
    ) -> impl Future<Output = Result<DeviceStats, FieldHubError>> + Send;
}

/// Repository for [`AutomationRule`]s and their run records.
pub trait AutomationRepository {
    fn create(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, FieldHubError>> + Send;

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, FieldHubError>> + Send;

    /// All active rules, ascending priority.
    fn list_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send;

    /// Active rules of one organization, ascending priority.
    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send;

    /// Set `last_triggered_at = at` and increment `trigger_count` in one write.
    fn record_trigger(
        &self,
        id: AutomationId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    fn append_run(
        &self,
        record: AutomationRunRecord,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    /// Most recent run records of a rule, newest first.
    fn list_runs(
        &self,
        rule_id: AutomationId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AutomationRunRecord>, FieldHubError>> + Send;
}

impl<T: DeviceRepository + Send + Sync> DeviceRepository for Arc<T> {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, FieldHubError>> + Send {
        (**self).create(device)
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        (**self).get_by_id(id)
    }

    fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        (**self).find_by_external_id(external_id)
    }

    fn find_by_normalized_name(
        &self,
        needle: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        (**self).find_by_normalized_name(needle)
    }

    fn find_by_asset(
        &self,
        asset_id: AssetId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        (**self).find_by_asset(asset_id)
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Device>, FieldHubError>> + Send {
        (**self).list_active_by_organization(organization_id)
    }

    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send {
        (**self).list_organizations()
    }

    fn mark_seen(
        &self,
        id: DeviceId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).mark_seen(id, at)
    }

    fn mark_offline(&self, id: DeviceId) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).mark_offline(id)
    }

    fn set_power_state(
        &self,
        id: DeviceId,
        is_on: bool,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).set_power_state(id, is_on)
    }
}

impl<T: GatewayRepository + Send + Sync> GatewayRepository for Arc<T> {
    fn create(
        &self,
        gateway: Gateway,
    ) -> impl Future<Output = Result<Gateway, FieldHubError>> + Send {
        (**self).create(gateway)
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Gateway>, FieldHubError>> + Send {
        (**self).list_active_by_organization(organization_id)
    }

    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send {
        (**self).list_organizations()
    }
}

impl<T: TelemetryRepository + Send + Sync> TelemetryRepository for Arc<T> {
    fn record_batch(
        &self,
        samples: Vec<TelemetrySample>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).record_batch(samples)
    }

    fn latest(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
    ) -> impl Future<Output = Result<Option<TelemetrySample>, FieldHubError>> + Send {
        (**self).latest(device_id, key)
    }

    fn stats(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
        window: StatsWindow,
    ) -> impl Future<Output = Result<DeviceStats, FieldHubError>> + Send {
        (**self).stats(device_id, key, window)
    }
}

impl<T: AutomationRepository + Send + Sync> AutomationRepository for Arc<T> {
    fn create(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, FieldHubError>> + Send {
        (**self).create(rule)
    }

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, FieldHubError>> + Send {
        (**self).get_by_id(id)
    }

    fn list_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send {
        (**self).list_active()
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send {
        (**self).list_active_by_organization(organization_id)
    }

    fn record_trigger(
        &self,
        id: AutomationId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).record_trigger(id, at)
    }

    fn append_run(
        &self,
        record: AutomationRunRecord,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).append_run(record)
    }

    fn list_runs(
        &self,
        rule_id: AutomationId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AutomationRunRecord>, FieldHubError>> + Send {
        (**self).list_runs(rule_id, limit)
    }
}
