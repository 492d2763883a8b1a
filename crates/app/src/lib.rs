//! # fieldhub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceRepository`, `GatewayRepository`: fleet registry and liveness
//!   - `TelemetryRepository`: sample batches, latest values, window statistics
//!   - `AutomationRepository`: rules, trigger counters, run records
//!   - `NotificationRepository`: deduplicated user alerts
//!   - `MarketPriceSource`: latest energy price
//!   - `CommandPublisher`, `Controllable`: outbound device commands
//!   - `EventPublisher`: live organization events
//! - Define **driving/inbound ports** as use-case structs:
//!   - `IngestionService`: resolve, persist and fan out telemetry
//!   - `AutomationEngine`: evaluate rules, run actions, record runs
//!   - `AnomalyDetector`: z-score verdicts over device history
//!   - `Watchdog`: liveness checks, offline marking, reset commands
//!   - `OrganizationSweep`: the periodic watchdog and anomaly pass
//! - Provide **in-process infrastructure** that doesn't need IO: the event
//!   bus and the periodic scheduler
//!
//! ## Dependency rule
//! Depends on `fieldhub-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod automation_engine;
pub mod event_bus;
pub mod ports;
pub mod scheduler;
pub mod services;

#[cfg(test)]
mod testing;
