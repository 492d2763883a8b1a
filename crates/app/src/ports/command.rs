//! Command port: outbound messages to devices over the broker.

use std::future::Future;

use fieldhub_domain::error::FieldHubError;

pub trait CommandPublisher {
    /// Queue `payload` for delivery on `topic`.
    ///
    /// Fails with [`FieldHubError::Transport`] when no broker session exists.
    fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;
}

impl<T: CommandPublisher + Send + Sync> CommandPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).publish(topic, payload)
    }
}
