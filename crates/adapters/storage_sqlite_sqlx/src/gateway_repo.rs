//! `SQLite` implementation of [`GatewayRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::GatewayRepository;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::gateway::Gateway;
use fieldhub_domain::id::{GatewayId, OrganizationId};

use crate::error::{StorageError, decode_error};
use crate::timestamp;

struct Wrapper(Gateway);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let organization_id: String = row.try_get("organization_id")?;
        let last_seen: Option<String> = row.try_get("last_seen")?;

        Ok(Self(Gateway {
            id: GatewayId::from_str(&id).map_err(decode_error)?,
            organization_id: OrganizationId::from_str(&organization_id).map_err(decode_error)?,
            name: row.try_get("name")?,
            serial_number: row.try_get("serial_number")?,
            is_active: row.try_get("is_active")?,
            last_seen: timestamp::decode_opt(last_seen)?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO gateways (id, organization_id, name, serial_number, is_active, last_seen)
    VALUES (?, ?, ?, ?, ?, ?)
";
const SELECT_ACTIVE_BY_ORGANIZATION: &str = r"
    SELECT * FROM gateways
    WHERE is_active = 1 AND organization_id = ?
    ORDER BY name
";
const SELECT_ORGANIZATIONS: &str =
    "SELECT DISTINCT organization_id FROM gateways WHERE is_active = 1 ORDER BY organization_id";

/// `SQLite`-backed gateway repository.
pub struct SqliteGatewayRepository {
    pool: SqlitePool,
}

impl SqliteGatewayRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl GatewayRepository for SqliteGatewayRepository {
    async fn create(&self, gateway: Gateway) -> Result<Gateway, FieldHubError> {
        sqlx::query(INSERT)
            .bind(gateway.id.to_string())
            .bind(gateway.organization_id.to_string())
            .bind(&gateway.name)
            .bind(&gateway.serial_number)
            .bind(gateway.is_active)
            .bind(gateway.last_seen.map(timestamp::encode))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(gateway)
    }

    async fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Gateway>, FieldHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ACTIVE_BY_ORGANIZATION)
            .bind(organization_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn list_organizations(&self) -> Result<Vec<OrganizationId>, FieldHubError> {
        let rows: Vec<(String,)> = sqlx::query_as(SELECT_ORGANIZATIONS)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        rows.iter()
            .map(|(id,)| {
                OrganizationId::from_str(id)
                    .map_err(|err| StorageError::from(decode_error(err)).into())
            })
            .collect()
    }
}
