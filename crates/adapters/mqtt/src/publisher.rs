//! Outbound command publisher backed by the bridge's client.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rumqttc::{AsyncClient, QoS};

use fieldhub_app::ports::CommandPublisher;
use fieldhub_domain::error::FieldHubError;

use crate::error::MqttError;

/// Publishes device commands with QoS 1.
///
/// Cloning is cheap; every clone shares the same client and session flag.
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: Option<AsyncClient>,
    connected: Arc<AtomicBool>,
}

impl MqttCommandPublisher {
    pub(crate) fn new(client: AsyncClient, connected: Arc<AtomicBool>) -> Self {
        Self {
            client: Some(client),
            connected,
        }
    }

    /// A publisher for a disabled bridge; every publish fails.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Acquire)
    }

    fn try_publish(&self, topic: String, payload: Vec<u8>) -> Result<(), MqttError> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        if !self.connected.load(Ordering::Acquire) {
            return Err(MqttError::NotConnected);
        }
        client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(MqttError::Client)
    }
}

impl CommandPublisher for MqttCommandPublisher {
    fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        let result = self.try_publish(topic, payload).map_err(FieldHubError::from);
        if let Err(err) = &result {
            tracing::warn!(err = %err.describe(), "command not published");
        }
        std::future::ready(result)
    }
}
