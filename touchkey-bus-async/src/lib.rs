#![no_std]
#![doc = "Retrying register-frame transport for Cypress touchkey controllers."]

//! The touchkey controller does not expose an addressable register file over
//! I2C. Every read returns the status frame starting at offset `0x00`, and
//! every write is a raw command. [`i2c::TouchkeyBus`] wraps an async I2C bus
//! with the device's address, its enabled/probed bookkeeping and the bounded
//! retry policy the controller needs on a noisy bus.

pub mod err;
pub mod i2c;

pub use err::BusError;
pub use i2c::{DeviceHandle, TouchkeyBus};

/// Default 7-bit address of the touchkey controller.
pub const TOUCHKEY_ADDRESS: u8 = 0x20;

/// Number of transfer attempts made per call before giving up.
pub const TRANSFER_ATTEMPTS: u8 = 2;

/// Backoff between two attempts, in milliseconds.
pub const RETRY_BACKOFF_MS: u32 = 10;

/// Longest frame the controller can return in one read.
pub const MAX_FRAME_LEN: usize = 32;
