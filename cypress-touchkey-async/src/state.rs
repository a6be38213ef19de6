//! Shared state groups. Each group lives behind its own lock in the driver.

use touchkey_bus_async::TOUCHKEY_ADDRESS;

use crate::defs::{BATTERY_LIMIT_PERCENT, BL_ALWAYS_OFF, BL_STANDARD};
use crate::keys::KeyMap;

/// Whether the host display is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Display on, touch hardware fully powered.
    #[default]
    Active,
    /// Display off.
    Suspended,
}

/// Notification LED bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationState {
    /// Master switch. Notifications are shown only while this is positive.
    pub enabled: i32,
    /// Force `enabled` on while a charger is attached.
    pub enabled_while_charging: bool,
    /// `enabled` as it was before the charger forced it on.
    pub saved_enabled: i32,
    /// The notification LED is being displayed.
    pub led_on: bool,
    /// Auto-off delay in milliseconds. Zero or negative never times out.
    pub timeout_ms: i32,
    /// Never time out while charging.
    pub persistent: bool,
    /// Every activation re-arms the timeout, not just the first.
    pub renew: bool,
    /// Activations since the notification was last timed out.
    pub count: u32,
    /// A charger is attached.
    pub on_charger: bool,
}

impl NotificationState {
    pub const fn new() -> Self {
        Self {
            enabled: -1,
            enabled_while_charging: false,
            saved_enabled: -1,
            led_on: false,
            timeout_ms: -1,
            persistent: false,
            renew: true,
            count: 0,
            on_charger: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled > 0
    }

    pub fn has_timeout(&self) -> bool {
        self.timeout_ms > 0
    }
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Key backlight bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklightState {
    /// Last backlight command sent to the chip.
    pub backlight_on: bool,
    /// Rail voltage used for the key backlight, in millivolts.
    pub brightness_mv: u32,
    /// Auto-off delay in milliseconds, or one of the
    /// [`BL_ALWAYS_ON`](crate::BL_ALWAYS_ON)/[`BL_ALWAYS_OFF`] sentinels.
    pub timeout_ms: i32,
    /// Ramp the rail down on timeout instead of cutting it.
    pub fade_out: bool,
    /// The backlight is held off by `blink_control`.
    pub blink_control: bool,
    pub power: PowerState,
}

impl BacklightState {
    pub const fn new(timeout_ms: i32) -> Self {
        Self {
            backlight_on: false,
            brightness_mv: 0,
            timeout_ms,
            fade_out: true,
            blink_control: false,
            power: PowerState::Active,
        }
    }

    pub fn always_off(&self) -> bool {
        self.timeout_ms == BL_ALWAYS_OFF
    }

    pub fn auto_off(&self) -> bool {
        self.timeout_ms > 0
    }

    pub fn is_suspended(&self) -> bool {
        self.power == PowerState::Suspended
    }
}

/// Battery gate configuration and its pending activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryGate {
    pub capacity_limit_pct: u8,
    /// Zero disables the gate.
    pub poll_interval_ms: u32,
    /// An activation is waiting for the battery to drain.
    pub pending: bool,
    /// Capacity seen by the most recent poll.
    pub last_capacity_pct: Option<u8>,
}

impl BatteryGate {
    pub const fn new() -> Self {
        Self {
            capacity_limit_pct: BATTERY_LIMIT_PERCENT,
            poll_interval_ms: 0,
            pending: false,
            last_capacity_pct: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.poll_interval_ms > 0
    }
}

impl Default for BatteryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Firmware re-flash progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
    Pass,
    Downloading,
    Fail,
}

impl FirmwareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FirmwareStatus::Pass => "PASS",
            FirmwareStatus::Downloading => "Downloading",
            FirmwareStatus::Fail => "Fail",
        }
    }
}

/// Firmware and module identification read from the status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub firmware_version: u8,
    pub module_version: u8,
}

/// Raw sensitivity counts of the two touch keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySensitivity {
    pub menu: u8,
    pub back: u8,
}

/// Construction-time configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchkeyConfig {
    /// 7-bit bus address of the controller.
    pub address: u8,
    pub key_map: KeyMap,
    /// Initial key backlight timeout, in milliseconds or a sentinel.
    pub led_timeout_ms: i32,
}

impl Default for TouchkeyConfig {
    fn default() -> Self {
        Self {
            address: TOUCHKEY_ADDRESS,
            key_map: KeyMap::default(),
            led_timeout_ms: BL_STANDARD,
        }
    }
}
