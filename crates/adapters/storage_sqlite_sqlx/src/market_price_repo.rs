//! `SQLite` reader for the `market_prices` table.
//!
//! An external fetcher fills the table; the core only reads the current price.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use fieldhub_app::ports::MarketPriceSource;
use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::market::MarketPrice;
use fieldhub_domain::time::{Timestamp, now};

use crate::error::StorageError;
use crate::timestamp;

struct Wrapper(MarketPrice);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let valid_at: String = row.try_get("valid_at")?;
        Ok(Self(MarketPrice {
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            valid_at: timestamp::decode(&valid_at)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO market_prices (price, currency, valid_at) VALUES (?, ?, ?)";
const SELECT_CURRENT: &str = r"
    SELECT * FROM market_prices
    WHERE valid_at <= ?
    ORDER BY valid_at DESC, id DESC
    LIMIT 1
";

/// `SQLite`-backed market price feed.
pub struct SqliteMarketPriceRepository {
    pool: SqlitePool,
}

impl SqliteMarketPriceRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a price point.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the insert fails.
    pub async fn record(&self, price: &MarketPrice) -> Result<(), FieldHubError> {
        sqlx::query(INSERT)
            .bind(price.price)
            .bind(&price.currency)
            .bind(timestamp::encode(price.valid_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Latest price already in effect at `at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the query fails.
    pub async fn price_at(&self, at: Timestamp) -> Result<Option<MarketPrice>, FieldHubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_CURRENT)
            .bind(timestamp::encode(at))
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }
}

impl MarketPriceSource for SqliteMarketPriceRepository {
    async fn latest_price(&self) -> Result<Option<MarketPrice>, FieldHubError> {
        self.price_at(now()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::pool::memory_pool;

    fn price(value: f64, valid_at: Timestamp) -> MarketPrice {
        MarketPrice {
            price: value,
            currency: "TRY".to_string(),
            valid_at,
        }
    }

    #[tokio::test]
    async fn should_return_none_when_no_price_recorded() {
        let repo = SqliteMarketPriceRepository::new(memory_pool().await);

        assert!(repo.latest_price().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_ignore_prices_not_yet_in_effect() {
        let repo = SqliteMarketPriceRepository::new(memory_pool().await);
        let noon = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        repo.record(&price(2.4, noon - TimeDelta::hours(2))).await.unwrap();
        repo.record(&price(1.8, noon - TimeDelta::hours(1))).await.unwrap();
        repo.record(&price(3.1, noon + TimeDelta::hours(1))).await.unwrap();

        let current = repo.price_at(noon).await.unwrap().unwrap();

        assert!((current.price - 1.8).abs() < f64::EPSILON);
        assert_eq!(current.currency, "TRY");
        assert_eq!(current.valid_at, noon - TimeDelta::hours(1));
    }
}
