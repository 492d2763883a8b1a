//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts them into
//! [`FieldHubError`] through `From` impls, so `?` works across port
//! boundaries.

/// Top-level error shared by the domain, the application layer and the
/// port traits.
#[derive(Debug, thiserror::Error)]
pub enum FieldHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A persistence adapter failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A messaging or device-control transport failed.
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FieldHubError {
    /// Render the error with its full source chain, for audit records.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            text.push_str(": ");
            text.push_str(&err.to_string());
            source = err.source();
        }
        text
    }
}

/// Invariant violations detected on domain types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("unknown trigger type")]
    UnknownTrigger,

    #[error("unknown action type")]
    UnknownAction,

    #[error("invalid time of day `{0}`, expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("invalid weekday {0}, expected 0 (Monday) to 6 (Sunday)")]
    InvalidWeekday(u8),

    #[error("power level {0} is out of range 0..=100")]
    PowerLevelOutOfRange(u8),

    #[error("device has no external identifier")]
    MissingExternalId,

    #[error("power control not supported by this device")]
    PowerControlUnsupported,

    #[error("no device linked to rule")]
    NoLinkedDevice,

    #[error("invalid identifier `{0}`")]
    InvalidId(String),
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
