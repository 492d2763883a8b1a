//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod command;
pub mod control;
pub mod event_bus;
pub mod market;
pub mod notification;
pub mod storage;

pub use command::CommandPublisher;
pub use control::{Controllable, ControlOutcome, DeviceCommand, DeviceController};
pub use event_bus::EventPublisher;
pub use market::MarketPriceSource;
pub use notification::NotificationRepository;
pub use storage::{
    AutomationRepository, DeviceRepository, GatewayRepository, StatsWindow, TelemetryRepository,
};
