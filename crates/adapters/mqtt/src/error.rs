//! MQTT adapter error types.

use fieldhub_domain::error::FieldHubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The bridge is disabled or has no live client.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to encode or decode an MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] FieldHubError),
}

impl MqttError {
    /// Convert into a [`FieldHubError::Transport`] for propagation across
    /// port boundaries.
    #[must_use]
    pub fn into_domain(self) -> FieldHubError {
        match self {
            Self::Domain(err) => err,
            other => FieldHubError::Transport(Box::new(other)),
        }
    }
}

impl From<MqttError> for FieldHubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
