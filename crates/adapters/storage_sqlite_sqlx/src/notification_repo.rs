//! `SQLite` implementation of [`NotificationRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::NotificationRepository;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::id::{NotificationId, OrganizationId};
use fieldhub_domain::notification::Notification;

use crate::error::{StorageError, decode_error};
use crate::timestamp;

struct Wrapper(Notification);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let organization_id: String = row.try_get("organization_id")?;
        let kind: String = row.try_get("kind")?;
        let priority: String = row.try_get("priority")?;
        let payload: String = row.try_get("payload")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Self(Notification {
            id: NotificationId::from_str(&id).map_err(decode_error)?,
            organization_id: OrganizationId::from_str(&organization_id).map_err(decode_error)?,
            kind: serde_json::from_value(serde_json::Value::String(kind)).map_err(decode_error)?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            priority: serde_json::from_value(serde_json::Value::String(priority))
                .map_err(decode_error)?,
            payload: serde_json::from_str(&payload).map_err(decode_error)?,
            dedup_key: row.try_get("dedup_key")?,
            created_at: timestamp::decode(&created_at)?,
        }))
    }
}

// A NULL dedup key never conflicts, so undeduplicated notifications always land.
const INSERT: &str = r"
    INSERT OR IGNORE INTO notifications
        (id, organization_id, kind, title, message, priority, payload, dedup_key, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
";
const SELECT_BY_ORGANIZATION: &str = r"
    SELECT * FROM notifications
    WHERE organization_id = ?
    ORDER BY created_at DESC
    LIMIT ?
";

/// `SQLite`-backed notification sink.
pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent notifications of an organization, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the query or row decoding fails.
    pub async fn list_recent(
        &self,
        organization_id: OrganizationId,
        limit: u32,
    ) -> Result<Vec<Notification>, FieldHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_ORGANIZATION)
            .bind(organization_id.to_string())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl NotificationRepository for SqliteNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<bool, FieldHubError> {
        let payload = serde_json::to_string(&notification.payload).map_err(StorageError::from)?;

        let result = sqlx::query(INSERT)
            .bind(notification.id.to_string())
            .bind(notification.organization_id.to_string())
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.priority.as_str())
            .bind(&payload)
            .bind(&notification.dedup_key)
            .bind(timestamp::encode(notification.created_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
