//! An asynchronous, `no_std` driver core for Cypress capacitive touchkeys with
//! backlight notification (BLN) support.
//!
//! The controller reports key presses over I2C and drives the key backlight,
//! which doubles as a notification LED. This crate provides a [`Touchkey`]
//! that services key interrupts, times the key backlight out, shows
//! notifications (steady, breathing or blinking, optionally gated on battery
//! capacity) and follows the display through suspend and resume.
//!
//! Platform services such as regulators, the input sink and the wake-lock are
//! supplied through the [`Board`] trait.
//!
//! # Usage
//!
//! The driver is shared by reference. Two futures must be polled for it to
//! make progress: [`Touchkey::run`] executes deferred work and
//! [`Touchkey::run_timers`] turns timer expiries into work.
//!
//! ```ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use cypress_touchkey_async::{Touchkey, TouchkeyConfig};
//!
//! static TOUCHKEY: StaticCell<Touchkey<CriticalSectionRawMutex, I2c, Delay, MyBoard>> =
//!     StaticCell::new();
//!
//! let touchkey = TOUCHKEY.init(Touchkey::new(i2c, Delay, board, TouchkeyConfig::default()));
//! touchkey.probe().await?;
//!
//! // In the GPIO interrupt handler:
//! touchkey.on_interrupt();
//!
//! // From the control plane:
//! touchkey.store_by_name("enabled", "1").await?;
//! touchkey.store_by_name("led", "1").await?;
//!
//! join(touchkey.run(), touchkey.run_timers()).await;
//! ```

#![no_std]

mod battery_gate;
pub mod board;
pub mod control;
mod defs;
mod device;
pub mod driver;
pub mod effect;
pub mod error;
pub mod keys;
mod pipeline;
mod power;
mod scheduler;
pub mod state;
pub mod timers;

#[cfg(test)]
mod mock;

pub use board::{Board, Rail};
pub use control::{Attribute, AttributeValue};
pub use defs::{
    BATTERY_LIMIT_PERCENT, BLINKING_OFF_MS, BLINKING_ON_MS, BLN_VERSION, BL_ALWAYS_OFF,
    BL_ALWAYS_ON, BL_STANDARD, BREATHING_MAX_MV, BREATHING_MIN_MV, BREATHING_PAUSE_MS,
    BREATHING_STEP_MS, BREATHING_STEP_MV, LED_MAX_MV, MIN_FIRMWARE_VERSION, NOTIFICATION_MV,
};
pub use device::needs_update;
pub use driver::{Touchkey, Work};
pub use effect::{BlinkConfig, BreathingConfig, EffectMode, EffectPhase};
pub use error::{ControlError, Error, RegulatorUnavailable};
pub use keys::{Key, KeyEvent, KeyMap};
pub use state::{
    BacklightState, BatteryGate, FirmwareInfo, FirmwareStatus, KeySensitivity, NotificationState,
    PowerState, TouchkeyConfig,
};
pub use timers::{TimerId, TimerSet};
pub use touchkey_battery_async::{BatteryStatus, ChargingStatus};
