//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod anomaly_service;
pub mod device_control;
pub mod ingestion_service;
pub mod sweep_service;
pub mod watchdog_service;
