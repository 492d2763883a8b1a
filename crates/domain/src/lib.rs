//! # fieldhub-domain
//!
//! Pure domain model for the fieldhub telemetry platform.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** and **Gateways** with their liveness fields
//! - Define **Telemetry** samples and the decoded inbound message shape
//! - Define **Automation rules** (trigger + conditions → action) and their run records
//! - Classify **anomalies** from history statistics and **health** from last contact
//! - Define **Events** and **Notifications** emitted by the core
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod anomaly;
pub mod automation;
pub mod device;
pub mod event;
pub mod gateway;
pub mod health;
pub mod market;
pub mod notification;
pub mod telemetry;
