//! Platform services the driver relies on but does not implement.

use touchkey_battery_async::BatteryStatus;

use crate::error::RegulatorUnavailable;
use crate::keys::Key;

/// A regulated supply the driver switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rail {
    /// Supply of the touch-sense controller.
    Touch,
    /// Supply of the key backlight and notification LED.
    Led,
}

/// Board glue: regulators, GPIO interrupt setup, the input sink, the
/// wake-lock, battery status and the firmware flasher.
///
/// Every method is called from the driver's deferred context or from a
/// control-plane or power-state call while the hardware lock is held, never
/// from the interrupt top half.
#[allow(async_fn_in_trait)]
pub trait Board {
    /// Switches a rail on or off. Switching off forces the rail down even if
    /// other consumers hold it.
    async fn set_rail(&mut self, rail: Rail, on: bool) -> Result<(), RegulatorUnavailable>;

    /// Programs the LED rail voltage, in millivolts.
    async fn set_led_voltage(&mut self, mv: u32) -> Result<(), RegulatorUnavailable>;

    /// Reads back the programmed LED rail voltage, in millivolts.
    async fn led_voltage(&mut self) -> Result<u32, RegulatorUnavailable>;

    /// Reports a key state to the input sink.
    fn report_key(&mut self, key: Key, pressed: bool);

    /// Flushes reported key states as one input frame.
    fn sync_keys(&mut self);

    /// Whether the primary touch screen currently has a finger on it.
    fn touch_surface_active(&self) -> bool;

    /// Restores interrupt edge and pull configuration after the touch rail
    /// was powered back on.
    fn configure_key_irq(&mut self);

    /// Takes or drops the wake-lock that keeps the platform out of suspend.
    fn set_wake_lock(&mut self, held: bool);

    fn wake_lock_held(&self) -> bool;

    /// Current battery capacity and charger state.
    async fn battery_status(&mut self) -> Result<BatteryStatus, ()>;

    /// Runs one attempt of the controller's firmware re-flash routine.
    async fn flash_firmware(&mut self) -> Result<(), ()>;
}
