//! # fieldhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `fieldhub-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! Counters and liveness flags are updated with single SQL statements, and a
//! telemetry batch is written inside one transaction.
//!
//! ## Dependency rule
//! Depends on `fieldhub-app` (for port traits) and `fieldhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod automation_repo;
mod device_repo;
mod error;
mod gateway_repo;
mod market_price_repo;
mod notification_repo;
mod pool;
mod telemetry_repo;
mod timestamp;

pub use automation_repo::SqliteAutomationRepository;
pub use device_repo::SqliteDeviceRepository;
pub use error::StorageError;
pub use gateway_repo::SqliteGatewayRepository;
pub use market_price_repo::SqliteMarketPriceRepository;
pub use notification_repo::SqliteNotificationRepository;
pub use pool::{Config, Database};
pub use telemetry_repo::SqliteTelemetryRepository;
