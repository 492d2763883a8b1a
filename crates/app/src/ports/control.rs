//! Device control ports.
//!
//! [`Controllable`] is implemented once per hardware brand.
//! [`DeviceController`] is what the automation engine talks to: it routes a
//! command to the right brand and reports brands it cannot drive.

use std::future::Future;

use fieldhub_domain::automation::Action;
use fieldhub_domain::device::Device;
use fieldhub_domain::error::FieldHubError;

/// A device-level command an automation action translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    Toggle,
    SetPower(u8),
}

impl DeviceCommand {
    /// The command an action maps onto, if it drives a device.
    #[must_use]
    pub fn from_action(action: &Action) -> Option<Self> {
        match action {
            Action::TurnOn => Some(Self::TurnOn),
            Action::TurnOff => Some(Self::TurnOff),
            Action::Toggle => Some(Self::Toggle),
            Action::SetPower { value } => Some(Self::SetPower(*value)),
            Action::Notify { .. } | Action::Unknown => None,
        }
    }

    /// Relay state expected after the command succeeds.
    ///
    /// A toggle of a device whose state was never reported has no known
    /// outcome.
    #[must_use]
    pub fn resulting_state(self, current: Option<bool>) -> Option<bool> {
        match self {
            Self::TurnOn => Some(true),
            Self::TurnOff => Some(false),
            Self::Toggle => current.map(|on| !on),
            Self::SetPower(level) => Some(level > 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    /// No controller exists for the device's brand.
    NotSupported,
}

/// Brand-specific control capability.
pub trait Controllable {
    fn turn_on(&self, device: &Device) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    fn turn_off(&self, device: &Device) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    fn toggle(&self, device: &Device) -> impl Future<Output = Result<(), FieldHubError>> + Send;

    fn set_power(
        &self,
        device: &Device,
        level: u8,
    ) -> impl Future<Output = Result<(), FieldHubError>> + Send;
}

/// Dispatches a command to whichever brand controller owns the device.
pub trait DeviceController {
    fn dispatch(
        &self,
        device: &Device,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<ControlOutcome, FieldHubError>> + Send;
}

impl<T: DeviceController + Send + Sync> DeviceController for std::sync::Arc<T> {
    fn dispatch(
        &self,
        device: &Device,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<ControlOutcome, FieldHubError>> + Send {
        (**self).dispatch(device, command)
    }
}
