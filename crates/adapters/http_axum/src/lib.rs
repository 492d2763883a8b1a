//! # fieldhub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - `GET /health` liveness check
//! - `GET /api/organizations/{org_id}/events`: Server-Sent Events stream of
//!   one organization's live events (telemetry, device status, anomalies)
//!
//! ## Dependency rule
//! Depends on `fieldhub-app` (for the event bus) and `fieldhub-domain` (for
//! event and identifier types). Never leaks axum types into the domain.

mod error;
pub mod router;
mod sse;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
