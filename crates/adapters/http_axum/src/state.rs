//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::watch;

use fieldhub_app::event_bus::InProcessEventBus;

/// Application state shared across all axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Bus the live event stream subscribes to.
    pub event_bus: Arc<InProcessEventBus>,
    /// Flips to `true` when the process shuts down; open streams then end.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create the state shared by every handler.
    #[must_use]
    pub fn new(event_bus: Arc<InProcessEventBus>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            event_bus,
            shutdown,
        }
    }
}
