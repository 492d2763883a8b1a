//! Automation: trigger + conditions → action rules.
//!
//! A rule is evaluated periodically. Its [`Condition`]s gate evaluation,
//! its single [`Trigger`] decides whether it fires now, and its single
//! [`Action`] is dispatched when it does.

mod action;
mod condition;
mod operator;
mod run;
mod trigger;

pub use action::Action;
pub use condition::{Condition, ExpectedState};
pub use operator::Operator;
pub use run::{AutomationRunRecord, RunStatus};
pub use trigger::Trigger;

use serde::{Deserialize, Serialize};

use crate::error::{FieldHubError, ValidationError};
use crate::id::{AssetId, AutomationId, DeviceId, OrganizationId};
use crate::time::Timestamp;

/// Default priority; lower numbers run first.
pub const DEFAULT_PRIORITY: i32 = 100;

/// The persisted rule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: Action,
}

impl RuleSet {
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found in the trigger, the
    /// conditions or the action.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.trigger.validate()?;
        for condition in &self.conditions {
            condition.validate()?;
        }
        self.action.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: AutomationId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub asset_id: Option<AssetId>,
    pub device_id: Option<DeviceId>,
    pub is_active: bool,
    pub priority: i32,
    pub rules: RuleSet,
    pub last_triggered_at: Option<Timestamp>,
    pub trigger_count: u32,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Check domain invariants before persistence.
    ///
    /// # Errors
    ///
    /// Returns [`FieldHubError::Validation`] when the name is empty or the
    /// rule tree falls outside the trigger/action vocabulary.
    pub fn validate(&self) -> Result<(), FieldHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        self.rules.validate()?;
        Ok(())
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<AutomationId>,
    organization_id: Option<OrganizationId>,
    name: Option<String>,
    asset_id: Option<AssetId>,
    device_id: Option<DeviceId>,
    is_active: Option<bool>,
    priority: Option<i32>,
    trigger: Option<Trigger>,
    conditions: Vec<Condition>,
    action: Option<Action>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: AutomationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn organization_id(mut self, id: OrganizationId) -> Self {
        self.organization_id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn asset_id(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    #[must_use]
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// A missing trigger or action counts as unknown and fails validation.
    ///
    /// # Errors
    ///
    /// Returns [`FieldHubError::Validation`] if required fields are missing
    /// or invalid.
    pub fn build(self) -> Result<AutomationRule, FieldHubError> {
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            organization_id: self.organization_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            asset_id: self.asset_id,
            device_id: self.device_id,
            is_active: self.is_active.unwrap_or(true),
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            rules: RuleSet {
                trigger: self.trigger.unwrap_or(Trigger::Unknown),
                conditions: self.conditions,
                action: self.action.unwrap_or(Action::Unknown),
            },
            last_triggered_at: None,
            trigger_count: 0,
        };
        rule.validate()?;
        Ok(rule)
    }
}
