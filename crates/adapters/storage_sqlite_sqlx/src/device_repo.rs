//! `SQLite` implementation of [`DeviceRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::DeviceRepository;
use fieldhub_domain::device::{Brand, Device};
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::id::{AssetId, DeviceId, GatewayId, OrganizationId};
use fieldhub_domain::time::Timestamp;

use crate::error::{StorageError, decode_error};
use crate::timestamp;

struct Wrapper(Device);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Device> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let organization_id: String = row.try_get("organization_id")?;
        let brand: String = row.try_get("brand")?;
        let asset_id: Option<String> = row.try_get("asset_id")?;
        let gateway_id: Option<String> = row.try_get("gateway_id")?;
        let last_seen: Option<String> = row.try_get("last_seen")?;

        Ok(Self(Device {
            id: DeviceId::from_str(&id).map_err(decode_error)?,
            organization_id: OrganizationId::from_str(&organization_id).map_err(decode_error)?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            brand: Brand::from_tag(&brand),
            device_type: row.try_get("device_type")?,
            asset_id: asset_id
                .as_deref()
                .map(AssetId::from_str)
                .transpose()
                .map_err(decode_error)?,
            gateway_id: gateway_id
                .as_deref()
                .map(GatewayId::from_str)
                .transpose()
                .map_err(decode_error)?,
            is_active: row.try_get("is_active")?,
            online: row.try_get("is_online")?,
            last_seen: timestamp::decode_opt(last_seen)?,
            is_on: row.try_get("is_on")?,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO devices
        (id, organization_id, external_id, name, brand, device_type, asset_id,
         gateway_id, is_active, is_online, last_seen, is_on)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";
const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_BY_EXTERNAL_ID: &str = r"
    SELECT * FROM devices
    WHERE is_active = 1 AND external_id = ?
    ORDER BY name LIMIT 1
";
const SELECT_BY_NORMALIZED_NAME: &str = r"
    SELECT * FROM devices
    WHERE is_active = 1
      AND instr(lower(replace(replace(name, ' ', '_'), '-', '_')), ?) > 0
    ORDER BY name LIMIT 1
";
const SELECT_BY_ASSET: &str = r"
    SELECT * FROM devices
    WHERE is_active = 1 AND asset_id = ?
    ORDER BY name LIMIT 1
";
const SELECT_ACTIVE_BY_ORGANIZATION: &str = r"
    SELECT * FROM devices
    WHERE is_active = 1 AND organization_id = ?
    ORDER BY name
";
const SELECT_ORGANIZATIONS: &str =
    "SELECT DISTINCT organization_id FROM devices WHERE is_active = 1 ORDER BY organization_id";
const MARK_SEEN: &str = "UPDATE devices SET is_online = 1, last_seen = ? WHERE id = ?";
const MARK_OFFLINE: &str = "UPDATE devices SET is_online = 0 WHERE id = ? AND is_online = 1";
const SET_POWER_STATE: &str = "UPDATE devices SET is_on = ? WHERE id = ?";

/// `SQLite`-backed device repository.
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        query: &str,
        value: &str,
    ) -> Result<Option<Device>, FieldHubError> {
        let row: Option<Wrapper> = sqlx::query_as(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    async fn create(&self, device: Device) -> Result<Device, FieldHubError> {
        device.validate()?;
        sqlx::query(INSERT)
            .bind(device.id.to_string())
            .bind(device.organization_id.to_string())
            .bind(&device.external_id)
            .bind(&device.name)
            .bind(device.brand.as_str())
            .bind(&device.device_type)
            .bind(device.asset_id.map(|id| id.to_string()))
            .bind(device.gateway_id.map(|id| id.to_string()))
            .bind(device.is_active)
            .bind(device.online)
            .bind(device.last_seen.map(timestamp::encode))
            .bind(device.is_on)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(device)
    }

    async fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, FieldHubError> {
        self.fetch_one_by(SELECT_BY_ID, &id.to_string()).await
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Device>, FieldHubError> {
        self.fetch_one_by(SELECT_BY_EXTERNAL_ID, external_id).await
    }

    async fn find_by_normalized_name(&self, needle: &str) -> Result<Option<Device>, FieldHubError> {
        self.fetch_one_by(SELECT_BY_NORMALIZED_NAME, needle).await
    }

    async fn find_by_asset(&self, asset_id: AssetId) -> Result<Option<Device>, FieldHubError> {
        self.fetch_one_by(SELECT_BY_ASSET, &asset_id.to_string()).await
    }

    async fn list_active_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Device>, FieldHubError> {
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

    async fn mark_seen(&self, id: DeviceId, at: Timestamp) -> Result<(), FieldHubError> {
        sqlx::query(MARK_SEEN)
            .bind(timestamp::encode(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn mark_offline(&self, id: DeviceId) -> Result<(), FieldHubError> {
        sqlx::query(MARK_OFFLINE)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn set_power_state(&self, id: DeviceId, is_on: bool) -> Result<(), FieldHubError> {
        sqlx::query(SET_POWER_STATE)
            .bind(is_on)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory_pool;

    async fn setup() -> SqliteDeviceRepository {
        SqliteDeviceRepository::new(memory_pool().await)
    }

    fn plug(org: OrganizationId, name: &str, external_id: &str) -> Device {
        Device::builder()
            .organization_id(org)
            .name(name)
            .external_id(external_id)
            .brand(Brand::Shelly)
            .device_type("plug")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_and_retrieve_device() {
        let repo = setup().await;
        let org = OrganizationId::new();
        let device = plug(org, "Washing Machine", "shellyplug-s-1");
        let id = device.id;

        repo.create(device).await.unwrap();
        let fetched = repo.get_by_id(id).await.unwrap().unwrap();

        assert_eq!(fetched.name, "Washing Machine");
        assert_eq!(fetched.brand, Brand::Shelly);
        assert_eq!(fetched.device_type.as_deref(), Some("plug"));
        assert!(fetched.is_active);
        assert!(!fetched.online);
        assert!(fetched.last_seen.is_none());
    }

    #[tokio::test]
    async fn should_find_active_device_by_external_id_only() {
        let repo = setup().await;
        let org = OrganizationId::new();
        let mut retired = plug(org, "Old Plug", "shared-id");
        retired.is_active = false;
        repo.create(retired).await.unwrap();

        assert!(repo.find_by_external_id("shared-id").await.unwrap().is_none());

        let current = plug(org, "New Plug", "shared-id");
        let id = current.id;
        repo.create(current).await.unwrap();
        assert_eq!(repo.find_by_external_id("shared-id").await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn should_match_normalized_name_ignoring_case_spaces_and_dashes() {
        let repo = setup().await;
        let device = plug(OrganizationId::new(), "Living-Room Heater", "x1");
        let id = device.id;
        repo.create(device).await.unwrap();

        let found = repo.find_by_normalized_name("living_room_heater").await.unwrap();
        assert_eq!(found.unwrap().id, id);
        assert!(repo.find_by_normalized_name("kitchen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_update_liveness_fields() {
        let repo = setup().await;
        let device = plug(OrganizationId::new(), "Pump", "pump-1");
        let id = device.id;
        repo.create(device).await.unwrap();

        let at = fieldhub_domain::time::now();
        repo.mark_seen(id, at).await.unwrap();
        repo.set_power_state(id, true).await.unwrap();
        let seen = repo.get_by_id(id).await.unwrap().unwrap();
        assert!(seen.online);
        assert_eq!(seen.is_on, Some(true));
        assert_eq!(
            seen.last_seen.map(timestamp::encode),
            Some(timestamp::encode(at))
        );

        repo.mark_offline(id).await.unwrap();
        let offline = repo.get_by_id(id).await.unwrap().unwrap();
        assert!(!offline.online);
        assert!(offline.last_seen.is_some());
    }

    #[tokio::test]
    async fn should_list_organizations_with_active_devices() {
        let repo = setup().await;
        let a = OrganizationId::new();
        let b = OrganizationId::new();
        repo.create(plug(a, "One", "1")).await.unwrap();
        repo.create(plug(a, "Two", "2")).await.unwrap();
        let mut inactive = plug(b, "Three", "3");
        inactive.is_active = false;
        repo.create(inactive).await.unwrap();

        assert_eq!(repo.list_organizations().await.unwrap(), vec![a]);
        let names: Vec<_> = repo
            .list_active_by_organization(a)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn should_find_device_by_asset() {
        let repo = setup().await;
        let asset = AssetId::new();
        let mut device = plug(OrganizationId::new(), "Boiler", "boiler-1");
        device.asset_id = Some(asset);
        let id = device.id;
        repo.create(device).await.unwrap();

        assert_eq!(repo.find_by_asset(asset).await.unwrap().unwrap().id, id);
    }
}
