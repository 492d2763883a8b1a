//! Notification port: downstream sink for user-facing alerts.

use std::future::Future;

use fieldhub_domain::error::FieldHubError;
use fieldhub_domain::notification::Notification;

pub trait NotificationRepository {
    /// Store a notification.
    ///
    /// Returns `false` without writing when a notification with the same
    /// `dedup_key` already exists.
    fn create(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<bool, FieldHubError>> + Send;
}

impl<T: NotificationRepository + Send + Sync> NotificationRepository for std::sync::Arc<T> {
    fn create(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<bool, FieldHubError>> + Send {
        (**self).create(notification)
    }
}
