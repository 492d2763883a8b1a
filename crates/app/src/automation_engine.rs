//! Automation engine: evaluates rules on each tick and executes the ones that fire.
//!
//! A rule's conditions are checked first (logical AND, short-circuit), then
//! its trigger. A firing rule executes its single action under a timeout;
//! every fired invocation leaves one run record behind and bumps the rule's
//! trigger counter.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use fieldhub_domain::automation::{
    Action, AutomationRule, AutomationRunRecord, Condition, ExpectedState, RunStatus, Trigger,
};
use fieldhub_domain::device::Device;
use fieldhub_domain::error::{FieldHubError, ValidationError};
use fieldhub_domain::event::{Event, EventType};
use fieldhub_domain::id::{AutomationId, OrganizationId, RunRecordId};
use fieldhub_domain::notification::{Notification, NotificationKind, Priority};
use fieldhub_domain::time::{LocalClock, Timestamp, now, parse_time_of_day};

use crate::ports::{
    AutomationRepository, ControlOutcome, DeviceCommand, DeviceController, DeviceRepository,
    EventPublisher, MarketPriceSource, NotificationRepository, TelemetryRepository,
};

/// Tuning knobs for the automation engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Offset used to derive local time of day and weekday.
    pub utc_offset: FixedOffset,
    pub action_timeout: Duration,
    /// Also write a `skipped` record when a rule does not fire.
    pub record_skipped_runs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            action_timeout: Duration::from_secs(10),
            record_skipped_runs: false,
        }
    }
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub should_fire: bool,
    pub reason: String,
}

impl Evaluation {
    fn fire(reason: impl Into<String>) -> Self {
        Self {
            should_fire: true,
            reason: reason.into(),
        }
    }

    fn hold(reason: impl Into<String>) -> Self {
        Self {
            should_fire: false,
            reason: reason.into(),
        }
    }

    fn from_check(should_fire: bool, reason: String) -> Self {
        Self {
            should_fire,
            reason,
        }
    }
}

/// Result of one [`AutomationEngine::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub rule_id: AutomationId,
    pub fired: bool,
    /// `true` when the rule did not fire or its action completed.
    pub success: bool,
    pub reason: String,
    pub error: Option<String>,
}

/// Totals for one pass over a set of rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub fired: usize,
    pub failed: usize,
}

/// Rule engine evaluating automations against prices, clock and telemetry.
pub struct AutomationEngine<AR, DR, TR, PS, NR, EP, DC> {
    rules: AR,
    devices: DR,
    telemetry: TR,
    prices: PS,
    notifications: NR,
    publisher: EP,
    controller: DC,
    config: EngineConfig,
}

impl<AR, DR, TR, PS, NR, EP, DC> AutomationEngine<AR, DR, TR, PS, NR, EP, DC>
where
    AR: AutomationRepository + Send + Sync,
    DR: DeviceRepository + Send + Sync,
    TR: TelemetryRepository + Send + Sync,
    PS: MarketPriceSource + Send + Sync,
    NR: NotificationRepository + Send + Sync,
    EP: EventPublisher + Send + Sync,
    DC: DeviceController + Send + Sync,
{
    /// Create a new engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: AR,
        devices: DR,
        telemetry: TR,
        prices: PS,
        notifications: NR,
        publisher: EP,
        controller: DC,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules,
            devices,
            telemetry,
            prices,
            notifications,
            publisher,
            controller,
            config,
        }
    }

    /// Evaluate a rule as of `at` without executing it.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the linked device, price or telemetry
    /// cannot be read.
    pub async fn evaluate_at(
        &self,
        rule: &AutomationRule,
        at: Timestamp,
    ) -> Result<Evaluation, FieldHubError> {
        let device = self.linked_device(rule).await?;
        self.evaluate_with(rule, device.as_ref(), at).await
    }

    /// Evaluate a rule and execute its action when it fires.
    ///
    /// # Errors
    ///
    /// Returns a storage error when evaluation inputs cannot be read or the
    /// run record cannot be written. Action failures are recorded, not
    /// returned.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id, rule = %rule.name))]
    pub async fn run(
        &self,
        rule: &AutomationRule,
        at: Timestamp,
    ) -> Result<RunOutcome, FieldHubError> {
        let device = self.linked_device(rule).await?;
        let evaluation = self.evaluate_with(rule, device.as_ref(), at).await?;

        if !evaluation.should_fire {
            tracing::debug!(reason = %evaluation.reason, "rule not fired");
            if self.config.record_skipped_runs {
                self.rules
                    .append_run(run_record(rule, at, &evaluation.reason, RunStatus::Skipped, None))
                    .await?;
            }
            return Ok(RunOutcome {
                rule_id: rule.id,
                fired: false,
                success: true,
                reason: evaluation.reason,
                error: None,
            });
        }

        let execution = tokio::time::timeout(
            self.config.action_timeout,
            self.execute(rule, device.as_ref(), &evaluation, at),
        )
        .await;
        let error = match execution {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.describe()),
            Err(_) => Some(format!(
                "action timed out after {}s",
                self.config.action_timeout.as_secs()
            )),
        };

        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        match &error {
            Some(err) => tracing::warn!(error = %err, "automation action failed"),
            None => tracing::info!(reason = %evaluation.reason, "automation fired"),
        }

        self.rules
            .append_run(run_record(
                rule,
                at,
                &evaluation.reason,
                status,
                error.clone(),
            ))
            .await?;
        self.rules.record_trigger(rule.id, at).await?;

        Ok(RunOutcome {
            rule_id: rule.id,
            fired: true,
            success: error.is_none(),
            reason: evaluation.reason,
            error,
        })
    }

    /// Run every active rule of one organization.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the rules cannot be listed.
    #[tracing::instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn run_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<RunSummary, FieldHubError> {
        let rules = self
            .rules
            .list_active_by_organization(organization_id)
            .await?;
        Ok(self.run_rules(rules, now()).await)
    }

    /// Run every active rule across all organizations.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the rules cannot be listed.
    pub async fn run_all(&self) -> Result<RunSummary, FieldHubError> {
        let rules = self.rules.list_active().await?;
        let summary = self.run_rules(rules, now()).await;
        tracing::debug!(
            evaluated = summary.evaluated,
            fired = summary.fired,
            failed = summary.failed,
            "automation tick"
        );
        Ok(summary)
    }

    async fn run_rules(&self, mut rules: Vec<AutomationRule>, at: Timestamp) -> RunSummary {
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        let mut summary = RunSummary::default();
        for rule in &rules {
            summary.evaluated += 1;
            match self.run(rule, at).await {
                Ok(outcome) => {
                    if outcome.fired {
                        summary.fired += 1;
                    }
                    if !outcome.success {
                        summary.failed += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(rule_id = %rule.id, %err, "automation run failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// The rule's own device, or else the active device on its asset.
    async fn linked_device(&self, rule: &AutomationRule) -> Result<Option<Device>, FieldHubError> {
        if let Some(device_id) = rule.device_id {
            return self.devices.get_by_id(device_id).await;
        }
        match rule.asset_id {
            Some(asset_id) => self.devices.find_by_asset(asset_id).await,
            None => Ok(None),
        }
    }

    async fn evaluate_with(
        &self,
        rule: &AutomationRule,
        device: Option<&Device>,
        at: Timestamp,
    ) -> Result<Evaluation, FieldHubError> {
        let clock = LocalClock::at(at, self.config.utc_offset);

        for condition in &rule.rules.conditions {
            let (met, reason) = check_condition(condition, device, clock);
            if !met {
                return Ok(Evaluation::hold(format!("Condition not met: {reason}")));
            }
        }

        self.check_trigger(&rule.rules.trigger, device, clock).await
    }

    async fn check_trigger(
        &self,
        trigger: &Trigger,
        device: Option<&Device>,
        clock: LocalClock,
    ) -> Result<Evaluation, FieldHubError> {
        match trigger {
            Trigger::Price { operator, value } => {
                let Some(price) = self.prices.latest_price().await? else {
                    return Ok(Evaluation::hold("No market price data available"));
                };
                Ok(Evaluation::from_check(
                    operator.compare(price.price, *value),
                    format!(
                        "Price {:.2} {}/kWh {operator} {value}",
                        price.price, price.currency
                    ),
                ))
            }
            Trigger::TimeRange { start, end, days } => {
                let (met, reason) = check_time_range(clock, start, end, days.as_deref());
                Ok(Evaluation::from_check(met, reason))
            }
            Trigger::Sensor {
                key,
                operator,
                value,
            } => {
                let Some(device) = device else {
                    return Ok(Evaluation::hold("No device linked to rule"));
                };
                let Some(sample) = self.telemetry.latest(device.id, key).await? else {
                    return Ok(Evaluation::hold(format!("No telemetry data for {key}")));
                };
                Ok(Evaluation::from_check(
                    operator.compare(sample.value, *value),
                    format!("{key} {} {operator} {value}", sample.value),
                ))
            }
            Trigger::Always => Ok(Evaluation::fire("Always trigger")),
            Trigger::Unknown => Ok(Evaluation::hold("Unknown trigger type")),
        }
    }

    async fn execute(
        &self,
        rule: &AutomationRule,
        device: Option<&Device>,
        evaluation: &Evaluation,
        at: Timestamp,
    ) -> Result<(), FieldHubError> {
        let action = &rule.rules.action;
        if let Action::Notify { title, message } = action {
            return self
                .notify(rule, title.as_deref(), message.as_deref(), evaluation, at)
                .await;
        }

        let Some(command) = DeviceCommand::from_action(action) else {
            return Err(ValidationError::UnknownAction.into());
        };
        let device = device.ok_or(ValidationError::NoLinkedDevice)?;

        match self.controller.dispatch(device, command).await? {
            ControlOutcome::NotSupported => {
                tracing::info!(
                    device_id = %device.id,
                    brand = %device.brand,
                    "no controller for brand, action skipped"
                );
            }
            ControlOutcome::Applied => {
                if let Some(state) = command.resulting_state(device.is_on)
                    && device.is_on != Some(state)
                {
                    self.devices.set_power_state(device.id, state).await?;
                    self.publish_state(device, state).await;
                }
            }
        }
        Ok(())
    }

    async fn notify(
        &self,
        rule: &AutomationRule,
        title: Option<&str>,
        message: Option<&str>,
        evaluation: &Evaluation,
        at: Timestamp,
    ) -> Result<(), FieldHubError> {
        let notification = Notification::new(
            rule.organization_id,
            NotificationKind::Automation,
            title.unwrap_or(&rule.name),
            message.unwrap_or(&evaluation.reason),
            Priority::Medium,
        )
        .with_payload(serde_json::json!({
            "rule_id": rule.id,
            "rule_name": rule.name,
            "reason": evaluation.reason,
        }))
        .with_dedup_key(format!(
            "automation:{}:{}",
            rule.id,
            at.format("%Y-%m-%dT%H:%M")
        ));
        self.notifications.create(notification).await?;
        Ok(())
    }

    async fn publish_state(&self, device: &Device, is_on: bool) {
        let event = Event::new(
            device.organization_id,
            EventType::DeviceStatus,
            serde_json::json!({
                "device_id": device.id,
                "is_online": device.online,
                "is_on": is_on,
                "state": if is_on { "on" } else { "off" },
                "timestamp": now(),
            }),
        );
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish device status");
        }
    }
}

fn run_record(
    rule: &AutomationRule,
    at: Timestamp,
    reason: &str,
    status: RunStatus,
    error: Option<String>,
) -> AutomationRunRecord {
    AutomationRunRecord {
        id: RunRecordId::new(),
        rule_id: rule.id,
        organization_id: rule.organization_id,
        recorded_at: at,
        action_taken: rule.rules.action.to_string(),
        reason: reason.to_string(),
        status,
        error,
    }
}

fn check_condition(
    condition: &Condition,
    device: Option<&Device>,
    clock: LocalClock,
) -> (bool, String) {
    match condition {
        Condition::TimeRange { start, end, days } => {
            check_time_range(clock, start, end, days.as_deref())
        }
        Condition::DayOfWeek { days } => {
            if days.contains(&clock.weekday) {
                (true, format!("Weekday {} is active", clock.weekday))
            } else {
                (false, format!("Weekday {} is not active", clock.weekday))
            }
        }
        Condition::DeviceState { state } => {
            let Some(device) = device else {
                return (false, "No device linked".to_string());
            };
            let met = match state {
                ExpectedState::Online => device.online,
                ExpectedState::On => device.is_on.is_none_or(|on| on),
                ExpectedState::Off => device.is_on.is_none_or(|on| !on),
            };
            (met, format!("Device state {}", state.as_str()))
        }
        Condition::Unknown => {
            tracing::warn!("unknown condition type ignored");
            (true, "Unknown condition type (ignored)".to_string())
        }
    }
}

/// Inclusive local-time window; `start > end` wraps past midnight.
fn check_time_range(
    clock: LocalClock,
    start: &str,
    end: &str,
    days: Option<&[u8]>,
) -> (bool, String) {
    let (Ok(from), Ok(to)) = (parse_time_of_day(start), parse_time_of_day(end)) else {
        return (false, format!("Invalid time range {start}-{end}"));
    };
    if let Some(days) = days
        && !days.contains(&clock.weekday)
    {
        return (false, format!("Weekday {} is not active", clock.weekday));
    }

    let inside = if from <= to {
        clock.time >= from && clock.time <= to
    } else {
        clock.time >= from || clock.time <= to
    };
    let hh_mm = clock.hh_mm();
    if inside {
        (true, format!("Time {hh_mm} in range {start}-{end}"))
    } else {
        (false, format!("Time {hh_mm} outside range {start}-{end}"))
    }
}
