//! Brand routing for device commands.

use std::future::Future;

use fieldhub_domain::device::{Brand, Device};
use fieldhub_domain::error::FieldHubError;

use crate::ports::{ControlOutcome, Controllable, DeviceCommand, DeviceController};

/// Routes each command to the controller registered for the device's brand.
///
/// Brands without a controller report [`ControlOutcome::NotSupported`].
pub struct BrandRouter<SH> {
    shelly: Option<SH>,
}

impl<SH> BrandRouter<SH> {
    /// Create a router; brands without a controller are not supported.
    pub fn new(shelly: Option<SH>) -> Self {
        Self { shelly }
    }
}

impl<SH: Controllable + Send + Sync> BrandRouter<SH> {
    async fn apply(
        controller: &SH,
        device: &Device,
        command: DeviceCommand,
    ) -> Result<ControlOutcome, FieldHubError> {
        match command {
            DeviceCommand::TurnOn => controller.turn_on(device).await?,
            DeviceCommand::TurnOff => controller.turn_off(device).await?,
            DeviceCommand::Toggle => controller.toggle(device).await?,
            DeviceCommand::SetPower(level) => controller.set_power(device, level).await?,
        }
        Ok(ControlOutcome::Applied)
    }
}

impl<SH: Controllable + Send + Sync> DeviceController for BrandRouter<SH> {
    fn dispatch(
        &self,
        device: &Device,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<ControlOutcome, FieldHubError>> + Send {
        async move {
            match (device.brand, self.shelly.as_ref()) {
                (Brand::Shelly, Some(shelly)) => Self::apply(shelly, device, command).await,
                _ => Ok(ControlOutcome::NotSupported),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use fieldhub_domain::error::ValidationError;
    use fieldhub_domain::id::OrganizationId;

    use super::*;

    #[derive(Default)]
    struct RecordingController {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingController {
        fn record(&self, call: String) -> impl Future<Output = Result<(), FieldHubError>> + Send {
            self.calls.lock().unwrap().push(call);
            async { Ok(()) }
        }
    }

    impl Controllable for RecordingController {
        fn turn_on(
            &self,
            device: &Device,
        ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
            self.record(format!("on:{}", device.name))
        }

        fn turn_off(
            &self,
            device: &Device,
        ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
            self.record(format!("off:{}", device.name))
        }

        fn toggle(
            &self,
            device: &Device,
        ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
            self.record(format!("toggle:{}", device.name))
        }

        fn set_power(
            &self,
            _device: &Device,
            _level: u8,
        ) -> impl Future<Output = Result<(), FieldHubError>> + Send {
            async { Err(ValidationError::PowerControlUnsupported.into()) }
        }
    }

    fn device(brand: Brand) -> Device {
        Device::builder()
            .organization_id(OrganizationId::new())
            .name("Porch")
            .brand(brand)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_route_shelly_commands_to_shelly_controller() {
        let router = BrandRouter::new(Some(RecordingController::default()));

        let outcome = router
            .dispatch(&device(Brand::Shelly), DeviceCommand::Toggle)
            .await
            .unwrap();

        assert_eq!(outcome, ControlOutcome::Applied);
        let calls = router.shelly.as_ref().unwrap().calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["toggle:Porch"]);
    }

    #[tokio::test]
    async fn should_report_not_supported_when_brand_has_no_controller() {
        let router = BrandRouter::new(Some(RecordingController::default()));

        let outcome = router
            .dispatch(&device(Brand::Tapo), DeviceCommand::TurnOn)
            .await
            .unwrap();

        assert_eq!(outcome, ControlOutcome::NotSupported);
    }

    #[tokio::test]
    async fn should_report_not_supported_when_shelly_controller_is_absent() {
        let router: BrandRouter<RecordingController> = BrandRouter::new(None);

        let outcome = router
            .dispatch(&device(Brand::Shelly), DeviceCommand::TurnOn)
            .await
            .unwrap();

        assert_eq!(outcome, ControlOutcome::NotSupported);
    }

    #[tokio::test]
    async fn should_propagate_controller_errors() {
        let router = BrandRouter::new(Some(RecordingController::default()));

        let result = router
            .dispatch(&device(Brand::Shelly), DeviceCommand::SetPower(40))
            .await;

        assert!(matches!(
            result,
            Err(FieldHubError::Validation(
                ValidationError::PowerControlUnsupported
            ))
        ));
    }
}
