//! Event bus port: publish/subscribe for live events.

use std::future::Future;

use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::event::Event;

/// Publishes live events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), FieldHubError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), FieldHubError>> + Send {
        (**self).publish(event)
    }
}
