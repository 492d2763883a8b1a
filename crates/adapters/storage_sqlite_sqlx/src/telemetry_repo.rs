//! `SQLite` implementation of [`TelemetryRepository`].

use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::{StatsWindow, TelemetryRepository};
use fieldhub_domain::anomaly::DeviceStats;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::id::DeviceId;
use fieldhub_domain::telemetry::{MeasurementKey, TelemetrySample};

use crate::error::{StorageError, decode_error};
use crate::timestamp;

struct Wrapper(TelemetrySample);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device_id: String = row.try_get("device_id")?;
        let recorded_at: String = row.try_get("recorded_at")?;
        let key: String = row.try_get("key")?;
        let quality: i64 = row.try_get("quality")?;

        Ok(Self(TelemetrySample {
            device_id: DeviceId::from_str(&device_id).map_err(decode_error)?,
            recorded_at: timestamp::decode(&recorded_at)?,
            key: MeasurementKey::from(key),
            value: row.try_get("value")?,
            quality: u8::try_from(quality).map_err(decode_error)?,
        }))
    }
}

/// Raw aggregates; variance is derived from the sum of squares.
#[derive(FromRow)]
struct Aggregates {
    count: i64,
    mean: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    sum_sq: Option<f64>,
}

impl Aggregates {
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    fn into_stats(self) -> DeviceStats {
        if self.count == 0 {
            return DeviceStats::default();
        }
        let n = self.count as f64;
        let mean = self.mean.unwrap_or_default();
        let std = if self.count < 2 {
            0.0
        } else {
            let variance = (self.sum_sq.unwrap_or_default() - n * mean * mean) / (n - 1.0);
            variance.max(0.0).sqrt()
        };
        DeviceStats {
            mean,
            std,
            min: self.min.unwrap_or_default(),
            max: self.max.unwrap_or_default(),
            count: self.count as u64,
        }
    }
}

const INSERT: &str = r"
    INSERT INTO telemetry (device_id, recorded_at, key, value, quality)
    VALUES (?, ?, ?, ?, ?)
";
const SELECT_LATEST: &str = r"
    SELECT * FROM telemetry
    WHERE device_id = ? AND key = ?
    ORDER BY recorded_at DESC, id DESC
    LIMIT 1
";
// `recorded_at` is fixed-width RFC 3339, so characters 12-13 are the UTC hour.
const SELECT_STATS: &str = r"
    SELECT
        COUNT(value) AS count,
        AVG(value) AS mean,
        MIN(value) AS min,
        MAX(value) AS max,
        SUM(value * value) AS sum_sq
    FROM telemetry
    WHERE device_id = ? AND key = ?
      AND recorded_at >= ? AND recorded_at < ?
      AND (? IS NULL OR CAST(substr(recorded_at, 12, 2) AS INTEGER) = ?)
";

/// `SQLite`-backed telemetry store.
pub struct SqliteTelemetryRepository {
    pool: SqlitePool,
}

impl SqliteTelemetryRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TelemetryRepository for SqliteTelemetryRepository {
    fn record_batch(
        &self,
        samples: Vec<TelemetrySample>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            if samples.is_empty() {
                return Ok(());
            }
            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            for sample in &samples {
                sqlx::query(INSERT)
                    .bind(sample.device_id.to_string())
                    .bind(timestamp::encode(sample.recorded_at))
                    .bind(sample.key.as_str())
                    .bind(sample.value)
                    .bind(i64::from(sample.quality))
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
            }
            tx.commit().await.map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn latest(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
    ) -> impl Future<Output = Result<Option<TelemetrySample>, FieldHubError>> + Send {
        let pool = self.pool.clone();
        let key = key.as_str().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_LATEST)
                .bind(device_id.to_string())
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(row.map(|w| w.0))
        }
    }

    fn stats(
        &self,
        device_id: DeviceId,
        key: &MeasurementKey,
        window: StatsWindow,
    ) -> impl Future<Output = Result<DeviceStats, FieldHubError>> + Send {
        let pool = self.pool.clone();
        let key = key.as_str().to_string();
        async move {
            let hour = window.hour.map(i64::from);
            let aggregates: Aggregates = sqlx::query_as(SELECT_STATS)
                .bind(device_id.to_string())
                .bind(key)
                .bind(timestamp::encode(window.since))
                .bind(timestamp::encode(window.until))
                .bind(hour)
                .bind(hour)
                .fetch_one(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(aggregates.into_stats())
        }
    }
}
