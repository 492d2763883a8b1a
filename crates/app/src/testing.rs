//! In-memory port implementations shared by the service tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::Timelike;

use fieldhub_domain::anomaly::DeviceStats;
use fieldhub_domain::automation::{AutomationRule, AutomationRunRecord};
use fieldhub_domain::device::{Device, normalize_name};
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::event::Event;
use fieldhub_domain::gateway::Gateway;
use fieldhub_domain::id::{AssetId, AutomationId, DeviceId, OrganizationId};
use fieldhub_domain::market::MarketPrice;
use fieldhub_domain::notification::Notification;
use fieldhub_domain::telemetry::{MeasurementKey, TelemetrySample};
use fieldhub_domain::time::Timestamp;

use crate::ports::{
    AutomationRepository, CommandPublisher, ControlOutcome, DeviceCommand, DeviceController,
    DeviceRepository, EventPublisher, GatewayRepository, MarketPriceSource,
    NotificationRepository, StatsWindow, TelemetryRepository,
};

// ── Devices ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDeviceRepo {
    pub store: Mutex<HashMap<DeviceId, Device>>,
}

impl InMemoryDeviceRepo {
    pub fn with(devices: Vec<Device>) -> Self {
        Self {
            store: Mutex::new(devices.into_iter().map(|d| (d.id, d)).collect()),
        }
    }

    pub fn get(&self, id: DeviceId) -> Device {
        self.store.lock().unwrap().get(&id).cloned().unwrap()
    }

    fn find(&self, pred: impl Fn(&Device) -> bool) -> Option<Device> {
        let store = self.store.lock().unwrap();
        let mut matches: Vec<_> = store.values().filter(|d| d.is_active && pred(d)).collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.first().map(|d| (*d).clone())
    }

    fn update(&self, id: DeviceId, f: impl FnOnce(&mut Device)) {
        if let Some(device) = self.store.lock().unwrap().get_mut(&id) {
            f(device);
        }
    }
}

impl DeviceRepository for InMemoryDeviceRepo {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, FieldHubError>> + Send {
        self.store.lock().unwrap().insert(device.id, device.clone());
        async { Ok(device) }
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        let r = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(r) }
    }

    fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        let r = self.find(|d| d.external_id.as_deref() == Some(external_id));
        async { Ok(r) }
    }

    fn find_by_normalized_name(
        &self,
        needle: &str,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        let r = self.find(|d| normalize_name(&d.name).contains(needle));
        async { Ok(r) }
    }

    fn find_by_asset(
        &self,
        asset_id: AssetId,
    ) -> impl Future<Output = Result<Option<Device>, FieldHubError>> + Send {
        let r = self.find(|d| d.asset_id == Some(asset_id));
        async { Ok(r) }
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Device>, FieldHubError>> + Send {
        let store = self.store.lock().unwrap();
        let mut r: Vec<_> = store
            .values()
            .filter(|d| d.is_active && d.organization_id == organization_id)
            .cloned()
            .collect();
        r.sort_by(|a, b| a.name.cmp(&b.name));
        async { Ok(r) }
    }

    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send {
        let store = self.store.lock().unwrap();
        let mut r: Vec<_> = store
            .values()
            .filter(|d| d.is_active)
            .map(|d| d.organization_id)
            .collect();
        r.sort();
        r.dedup();
        async { Ok(r) }
    }

    fn mark_seen(
        &self,
        id: DeviceId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        self.update(id, |d| {
            d.online = true;
            d.last_seen = Some(at);
        });
        async { Ok(()) }
    }

    fn mark_offline(&self, id: DeviceId) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        self.update(id, |d| d.online = false);
        async { Ok(()) }
    }

    fn set_power_state(
        &self,
        id: DeviceId,
        is_on: bool,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        self.update(id, |d| d.is_on = Some(is_on));
        async { Ok(()) }
    }
}

// ── Gateways ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryGatewayRepo {
    pub store: Mutex<Vec<Gateway>>,
}

impl InMemoryGatewayRepo {
    pub fn with(gateways: Vec<Gateway>) -> Self {
        Self {
            store: Mutex::new(gateways),
        }
    }
}

impl GatewayRepository for InMemoryGatewayRepo {
    fn create(
        &self,
        gateway: Gateway,
    ) -> impl Future<Output = Result<Gateway, FieldHubError>> + Send {
        self.store.lock().unwrap().push(gateway.clone());
        async { Ok(gateway) }
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<Gateway>, FieldHubError>> + Send {
        let r: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.is_active && g.organization_id == organization_id)
            .cloned()
            .collect();
        async { Ok(r) }
    }

    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationId>, FieldHubError>> + Send {
        let mut r: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.is_active)
            .map(|g| g.organization_id)
            .collect();
        r.sort();
        r.dedup();
        async { Ok(r) }
    }
}

// ── Telemetry ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryTelemetryRepo {
    pub samples: Mutex<Vec<TelemetrySample>>,
    /// Stats returned by every `stats` call, when set.
    pub fixed_stats: Mutex<Option<DeviceStats>>,
    pub fail_writes: Mutex<bool>,
}

impl InMemoryTelemetryRepo {
    pub fn with_stats(stats: DeviceStats) -> Self {
        Self {
            fixed_stats: Mutex::new(Some(stats)),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn push(&self, sample: TelemetrySample) {
        self.samples.lock().unwrap().push(sample);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }
}

impl TelemetryRepository for InMemoryTelemetryRepo {
    fn record_batch(
        &self,
        samples: Vec<TelemetrySample>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        let result = if *self.fail_writes.lock().unwrap() {
            Err(FieldHubError::Storage("disk full".into()))
        } else {
            self.samples.lock().unwrap().extend(samples);
            Ok(())
        };
        async { result }
    }

    fn latest(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
    ) -> impl Future<Output = Result<Option<TelemetrySample>, FieldHubError>> + Send {
        let r = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.device_id == device_id && s.key == *key)
            .max_by_key(|s| s.recorded_at)
            .cloned();
        async { Ok(r) }
    }

    fn stats(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
        window: StatsWindow,
    ) -> impl Future<Output = Result<DeviceStats, FieldHubError>> + Send {
        let fixed = *self.fixed_stats.lock().unwrap();
        let stats = fixed.unwrap_or_else(|| {
            let values: Vec<f64> = self
                .samples
                .lock()
                .unwrap()
                .iter()
                .filter(|s| {
                    s.device_id == device_id
                        && s.key == *key
                        && s.recorded_at >= window.since
                        && s.recorded_at < window.until
                        && window.hour.is_none_or(|h| s.recorded_at.hour() == h)
                })
                .map(|s| s.value)
                .collect();
            summarize(&values)
        });
        async move { Ok(stats) }
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(values: &[f64]) -> DeviceStats {
    let count = values.len();
    if count == 0 {
        return DeviceStats {
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
            count: 0,
        };
    }
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    DeviceStats {
        mean,
        std,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        count: count as u64,
    }
}

// ── Automations ────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryAutomationRepo {
    pub store: Mutex<HashMap<AutomationId, AutomationRule>>,
    pub runs: Mutex<Vec<AutomationRunRecord>>,
}

impl InMemoryAutomationRepo {
    pub fn with(rules: Vec<AutomationRule>) -> Self {
        Self {
            store: Mutex::new(rules.into_iter().map(|r| (r.id, r)).collect()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, id: AutomationId) -> AutomationRule {
        self.store.lock().unwrap().get(&id).cloned().unwrap()
    }

    pub fn runs(&self) -> Vec<AutomationRunRecord> {
        self.runs.lock().unwrap().clone()
    }

    fn active(&self, pred: impl Fn(&AutomationRule) -> bool) -> Vec<AutomationRule> {
        let mut r: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_active && pred(r))
            .cloned()
            .collect();
        r.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        r
    }
}

impl AutomationRepository for InMemoryAutomationRepo {
    fn create(
        &self,
        rule: AutomationRule,
    ) -> impl Future<Output = Result<AutomationRule, FieldHubError>> + Send {
        self.store.lock().unwrap().insert(rule.id, rule.clone());
        async { Ok(rule) }
    }

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<AutomationRule>, FieldHubError>> + Send {
        let r = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(r) }
    }

    fn list_active(
        &self,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send {
        let r = self.active(|_| true);
        async { Ok(r) }
    }

    fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> impl Future<Output = Result<Vec<AutomationRule>, FieldHubError>> + Send {
        let r = self.active(|r| r.organization_id == organization_id);
        async { Ok(r) }
    }

    fn record_trigger(
        &self,
        id: AutomationId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        if let Some(rule) = self.store.lock().unwrap().get_mut(&id) {
            rule.last_triggered_at = Some(at);
            rule.trigger_count += 1;
        }
        async { Ok(()) }
    }

    fn append_run(
        &self,
        record: AutomationRunRecord,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        self.runs.lock().unwrap().push(record);
        async { Ok(()) }
    }

    fn list_runs(
        &self,
        rule_id: AutomationId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AutomationRunRecord>, FieldHubError>> + Send {
        let r: Vec<_> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.rule_id == rule_id)
            .take(limit)
            .cloned()
            .collect();
        async { Ok(r) }
    }
}

// ── Market prices ──────────────────────────────────────────────────

#[derive(Default)]
pub struct FixedPrice(pub Option<f64>);

impl MarketPriceSource for FixedPrice {
    fn latest_price(
        &self,
    ) -> impl Future<Output = Result<Option<MarketPrice>, FieldHubError>> + Send {
        let r = self.0.map(|price| MarketPrice {
            price,
            currency: "TRY".to_string(),
            valid_at: fieldhub_domain::time::now(),
        });
        async { Ok(r) }
    }
}

// ── Notifications ──────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryNotificationRepo {
    pub store: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationRepo {
    pub fn all(&self) -> Vec<Notification> {
        self.store.lock().unwrap().clone()
    }
}

impl NotificationRepository for InMemoryNotificationRepo {
    fn create(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<bool, FieldHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let duplicate = notification.dedup_key.is_some()
            && store.iter().any(|n| n.dedup_key == notification.dedup_key);
        if !duplicate {
            store.push(notification);
        }
        async move { Ok(!duplicate) }
    }
}

// ── Spies ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SpyPublisher {
    pub events: Mutex<Vec<Event>>,
}

impl SpyPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for SpyPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}

#[derive(Default)]
pub struct SpyCommandPublisher {
    pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    pub disconnected: bool,
}

impl SpyCommandPublisher {
    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, payload)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }
}

impl CommandPublisher for SpyCommandPublisher {
    fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        let result = if self.disconnected {
            Err(FieldHubError::Transport("not connected".into()))
        } else {
            self.sent.lock().unwrap().push((topic, payload));
            Ok(())
        };
        async { result }
    }
}

/// Controller recording every dispatched command.
#[derive(Default)]
pub struct SpyController {
    pub commands: Mutex<Vec<(DeviceId, DeviceCommand)>>,
    pub outcome: Option<ControlOutcome>,
    pub fail: bool,
    /// Never completes, to exercise dispatch timeouts.
    pub hang: bool,
}

impl SpyController {
    pub fn unsupported() -> Self {
        Self {
            outcome: Some(ControlOutcome::NotSupported),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<(DeviceId, DeviceCommand)> {
        self.commands.lock().unwrap().clone()
    }
}

impl DeviceController for SpyController {
    fn dispatch(
        &self,
        device: &Device,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<ControlOutcome, FieldHubError>> + Send {
        self.commands.lock().unwrap().push((device.id, command));
        let hang = self.hang;
        let result = if self.fail {
            Err(FieldHubError::Transport("relay unreachable".into()))
        } else {
            Ok(self.outcome.unwrap_or(ControlOutcome::Applied))
        };
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            result
        }
    }
}
