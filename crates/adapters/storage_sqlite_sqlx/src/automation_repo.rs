//! `SQLite` implementation of [`AutomationRepository`].
//!
//! The rule tree is stored as one JSON column. Rows written before a trigger
//! or action type was retired still decode, into the `Unknown` variants.
//! Rows that do not decode at all are left out of the active listings with a
//! warning, so one hand-edited rule cannot stall every other rule.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::AutomationRepository;
use fieldhub_domain::automation::{AutomationRule, AutomationRunRecord, RuleSet, RunStatus};
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::id::{AssetId, AutomationId, DeviceId, OrganizationId, RunRecordId};
use fieldhub_domain::time::Timestamp;

use crate::error::{StorageError, decode_error};
use crate::timestamp;

struct Wrapper(AutomationRule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<AutomationRule> {
        value.map(|w| w.0)
    }

    fn decodable(rows: &[SqliteRow]) -> Vec<AutomationRule> {
        rows.iter()
            .filter_map(|row| match Self::from_row(row) {
                Ok(wrapper) => Some(wrapper.0),
                Err(err) => {
                    let id: Option<String> = row.try_get("id").ok();
                    tracing::warn!(rule_id = ?id, %err, "skipping undecodable automation rule");
                    None
                }
            })
            .collect()
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let organization_id: String = row.try_get("organization_id")?;
        let asset_id: Option<String> = row.try_get("asset_id")?;
        let device_id: Option<String> = row.try_get("device_id")?;
        let rules_json: String = row.try_get("rules")?;
        let last_triggered_at: Option<String> = row.try_get("last_triggered_at")?;
        let trigger_count: i64 = row.try_get("trigger_count")?;

        let rules: RuleSet = serde_json::from_str(&rules_json).map_err(decode_error)?;

        Ok(Self(AutomationRule {
            id: AutomationId::from_str(&id).map_err(decode_error)?,
            organization_id: OrganizationId::from_str(&organization_id).map_err(decode_error)?,
            name: row.try_get("name")?,
            asset_id: asset_id
                .as_deref()
                .map(AssetId::from_str)
                .transpose()
                .map_err(decode_error)?,
            device_id: device_id
                .as_deref()
                .map(DeviceId::from_str)
                .transpose()
                .map_err(decode_error)?,
            is_active: row.try_get("is_active")?,
            priority: row.try_get("priority")?,
            rules,
            last_triggered_at: timestamp::decode_opt(last_triggered_at)?,
            trigger_count: u32::try_from(trigger_count).map_err(decode_error)?,
        }))
    }
}

struct RunWrapper(AutomationRunRecord);

#[derive(Debug, thiserror::Error)]
#[error("unknown run status `{0}`")]
struct UnknownStatus(String);

impl<'r> FromRow<'r, SqliteRow> for RunWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let rule_id: String = row.try_get("automation_id")?;
        let organization_id: String = row.try_get("organization_id")?;
        let recorded_at: String = row.try_get("recorded_at")?;
        let status: String = row.try_get("status")?;

        Ok(Self(AutomationRunRecord {
            id: RunRecordId::from_str(&id).map_err(decode_error)?,
            rule_id: AutomationId::from_str(&rule_id).map_err(decode_error)?,
            organization_id: OrganizationId::from_str(&organization_id).map_err(decode_error)?,
            recorded_at: timestamp::decode(&recorded_at)?,
            action_taken: row.try_get("action_taken")?,
            reason: row.try_get("reason")?,
            status: RunStatus::from_tag(&status)
                .ok_or_else(|| decode_error(UnknownStatus(status.clone())))?,
            error: row.try_get("error")?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO automations
        (id, organization_id, name, asset_id, device_id, is_active, priority,
         rules, last_triggered_at, trigger_count)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";
const SELECT_ACTIVE: &str =
    "SELECT * FROM automations WHERE is_active = 1 ORDER BY priority, name";
const SELECT_ACTIVE_BY_ORGANIZATION: &str = r"
    SELECT * FROM automations
    WHERE is_active = 1 AND organization_id = ?
    ORDER BY priority, name
";
const RECORD_TRIGGER: &str = r"
    UPDATE automations
    SET trigger_count = trigger_count + 1, last_triggered_at = ?
    WHERE id = ?
";
const INSERT_RUN: &str = r"
    INSERT INTO automation_runs
        (id, automation_id, organization_id, recorded_at, action_taken, reason, status, error)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";
const SELECT_RUNS: &str = r"
    SELECT * FROM automation_runs
    WHERE automation_id = ?
    ORDER BY recorded_at DESC, rowid DESC
    LIMIT ?
";

/// `SQLite`-backed automation repository.
pub struct SqliteAutomationRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AutomationRepository for SqliteAutomationRepository {
    async fn create(&self, rule: AutomationRule) -> Result<AutomationRule, FieldHubError> {
        rule.validate()?;
        let rules_json = serde_json::to_string(&rule.rules).map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(rule.id.to_string())
            .bind(rule.organization_id.to_string())
            .bind(&rule.name)
            .bind(rule.asset_id.map(|id| id.to_string()))
            .bind(rule.device_id.map(|id| id.to_string()))
            .bind(rule.is_active)
            .bind(rule.priority)
            .bind(&rules_json)
            .bind(rule.last_triggered_at.map(timestamp::encode))
            .bind(i64::from(rule.trigger_count))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get_by_id(&self, id: AutomationId) -> Result<Option<AutomationRule>, FieldHubError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM automations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn list_active(&self) -> Result<Vec<AutomationRule>, FieldHubError> {
        let rows = sqlx::query(SELECT_ACTIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::decodable(&rows))
    }

    async fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<AutomationRule>, FieldHubError> {
        let rows = sqlx::query(SELECT_ACTIVE_BY_ORGANIZATION)
            .bind(organization_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::decodable(&rows))
    }

    async fn record_trigger(&self, id: AutomationId, at: Timestamp) -> Result<(), FieldHubError> {
        sqlx::query(RECORD_TRIGGER)
            .bind(timestamp::encode(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn append_run(&self, record: AutomationRunRecord) -> Result<(), FieldHubError> {
        sqlx::query(INSERT_RUN)
            .bind(record.id.to_string())
            .bind(record.rule_id.to_string())
            .bind(record.organization_id.to_string())
            .bind(timestamp::encode(record.recorded_at))
            .bind(&record.action_taken)
            .bind(&record.reason)
            .bind(record.status.as_str())
            .bind(&record.error)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn list_runs(
        &self,
        rule_id: AutomationId,
        limit: usize,
    ) -> Result<Vec<AutomationRunRecord>, FieldHubError> {
        let rows: Vec<RunWrapper> = sqlx::query_as(SELECT_RUNS)
            .bind(rule_id.to_string())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use fieldhub_domain::automation::{Action, Condition, ExpectedState, Operator, Trigger};

    use super::*;
    use crate::pool::memory_pool;

    async fn setup() -> SqliteAutomationRepository {
        SqliteAutomationRepository::new(memory_pool().await)
    }

    fn rule(org: OrganizationId, name: &str, priority: i32) -> AutomationRule {
        AutomationRule::builder()
            .organization_id(org)
            .name(name)
            .priority(priority)
            .trigger(Trigger::Price {
                operator: Operator::Lt,
                value: 2.0,
            })
            .condition(Condition::DeviceState {
                state: ExpectedState::Online,
            })
            .action(Action::TurnOn)
            .build()
            .unwrap()
    }

    fn run(rule: &AutomationRule, at: Timestamp, status: RunStatus) -> AutomationRunRecord {
        AutomationRunRecord {
            id: RunRecordId::new(),
            rule_id: rule.id,
            organization_id: rule.organization_id,
            recorded_at: at,
            action_taken: "turn_on".to_string(),
            reason: "Price 1.50 TRY/kWh < 2".to_string(),
            status,
            error: None,
        }
    }

    #[tokio::test]
    async fn should_round_trip_rule_tree() {
        let repo = setup().await;
        let created = rule(OrganizationId::new(), "Cheap power", 100);
        let id = created.id;
        repo.create(created.clone()).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn should_decode_unknown_types_from_legacy_rows() {
        let repo = setup().await;
        let id = AutomationId::new();
        sqlx::query(
            "INSERT INTO automations (id, organization_id, name, rules) VALUES (?, ?, 'Legacy', ?)",
        )
        .bind(id.to_string())
        .bind(OrganizationId::new().to_string())
        .bind(concat!(
            r#"{"trigger":{"type":"weather"},"#,
            r#""conditions":[{"type":"moon_phase"}],"#,
            r#""action":{"type":"email"}}"#,
        ))
        .execute(&repo.pool)
        .await
        .unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();

        assert_eq!(fetched.rules.trigger, Trigger::Unknown);
        assert_eq!(fetched.rules.conditions, vec![Condition::Unknown]);
        assert_eq!(fetched.rules.action, Action::Unknown);
    }

    #[tokio::test]
    async fn should_skip_malformed_rows_when_listing_active_rules() {
        let repo = setup().await;
        let org = OrganizationId::new();
        let good = rule(org, "Cheap power", 100);
        repo.create(good.clone()).await.unwrap();
        for rules in [
            r#"{"trigger":{"type":"price","value":"2.0"},"action":{"type":"notify"}}"#,
            r#"{"trigger":{"type":"price","operator":"~"},"action":{"type":"notify"}}"#,
            r#"{"trigger":{"type":"always"},"action":{"type":"set_power","value":300}}"#,
            "{",
        ] {
            sqlx::query(
                "INSERT INTO automations (id, organization_id, name, rules) VALUES (?, ?, 'X', ?)",
            )
            .bind(AutomationId::new().to_string())
            .bind(org.to_string())
            .bind(rules)
            .execute(&repo.pool)
            .await
            .unwrap();
        }

        let active = repo.list_active().await.unwrap();
        let by_org = repo.list_active_by_organization(org).await.unwrap();

        assert_eq!(active, vec![good.clone()]);
        assert_eq!(by_org, vec![good]);
    }

    #[tokio::test]
    async fn should_list_active_rules_by_priority_then_name() {
        let repo = setup().await;
        let org = OrganizationId::new();
        repo.create(rule(org, "Zeta", 10)).await.unwrap();
        repo.create(rule(org, "Alpha", 50)).await.unwrap();
        repo.create(rule(org, "Beta", 10)).await.unwrap();
        let mut paused = rule(org, "Paused", 1);
        paused.is_active = false;
        repo.create(paused).await.unwrap();
        repo.create(rule(OrganizationId::new(), "Elsewhere", 1)).await.unwrap();

        let names: Vec<_> = repo
            .list_active_by_organization(org)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, vec!["Beta", "Zeta", "Alpha"]);
        assert_eq!(repo.list_active().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn should_increment_trigger_count_in_place() {
        let repo = setup().await;
        let created = rule(OrganizationId::new(), "Counter", 100);
        let id = created.id;
        repo.create(created).await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        repo.record_trigger(id, at).await.unwrap();
        repo.record_trigger(id, at + TimeDelta::minutes(1)).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.trigger_count, 2);
        assert_eq!(fetched.last_triggered_at, Some(at + TimeDelta::minutes(1)));
    }

    #[tokio::test]
    async fn should_list_runs_newest_first_with_limit() {
        let repo = setup().await;
        let created = rule(OrganizationId::new(), "Audited", 100);
        repo.create(created.clone()).await.unwrap();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        repo.append_run(run(&created, start, RunStatus::Success)).await.unwrap();
        let mut failed = run(&created, start + TimeDelta::minutes(1), RunStatus::Failed);
        failed.error = Some("transport error: broker unavailable".to_string());
        repo.append_run(failed).await.unwrap();
        repo.append_run(run(&created, start + TimeDelta::minutes(2), RunStatus::Skipped))
            .await
            .unwrap();

        let runs = repo.list_runs(created.id, 2).await.unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Skipped);
        assert_eq!(runs[1].status, RunStatus::Failed);
        assert_eq!(
            runs[1].error.as_deref(),
            Some("transport error: broker unavailable")
        );
    }

    #[tokio::test]
    async fn should_reject_invalid_rule_on_create() {
        let repo = setup().await;
        let mut invalid = rule(OrganizationId::new(), "Broken", 100);
        invalid.rules.action = Action::SetPower { value: 150 };

        assert!(matches!(
            repo.create(invalid).await,
            Err(FieldHubError::Validation(_))
        ));
    }
}
