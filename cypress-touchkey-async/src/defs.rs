//! Register layout, chip commands and module defaults.

// --- Status frame ---
pub(crate) const KEYCODE_REG: u8 = 0x00;
pub(crate) const FIRMWARE_VERSION_OFFSET: usize = 1;
pub(crate) const MODULE_VERSION_OFFSET: usize = 2;
pub(crate) const STATUS_FRAME_LEN: usize = 3;

// --- Sensitivity frame ---
pub(crate) const SENSITIVITY_FRAME_LEN: usize = 10;
pub(crate) const MENU_SENSITIVITY_OFFSET: usize = 7;
pub(crate) const BACK_SENSITIVITY_OFFSET: usize = 9;

pub(crate) const KEYCODE_MASK: u8 = 0x07;
pub(crate) const UPDOWN_EVENT_BIT: u8 = 0x08;

// --- Chip commands (single byte writes) ---
pub(crate) const CMD_BACKLIGHT_ON: u8 = 1;
pub(crate) const CMD_BACKLIGHT_OFF: u8 = 2;
pub(crate) const CMD_RECALIBRATE: u8 = 0x40;

/// Firmware older than this should be re-flashed.
pub const MIN_FIRMWARE_VERSION: u8 = 0x0A;

/// Attempts to read the status frame when servicing a key interrupt.
pub(crate) const KEY_READ_ATTEMPTS: u8 = 3;
/// Attempts at re-flashing the firmware.
pub(crate) const FIRMWARE_FLASH_ATTEMPTS: u8 = 3;

/// Key backlight never times out.
pub const BL_ALWAYS_ON: i32 = -1;
/// Key backlight never lights up on key presses.
pub const BL_ALWAYS_OFF: i32 = -2;
/// Default key backlight timeout in milliseconds.
pub const BL_STANDARD: i32 = 3000;

/// Backlight notification protocol version reported to userspace.
pub const BLN_VERSION: u32 = 10;
/// Rail voltage for a steady notification, in millivolts.
pub const NOTIFICATION_MV: u32 = 3000;
/// Highest voltage the LED rail is ever driven to, in millivolts.
pub const LED_MAX_MV: u32 = 3300;

// --- Fade out of the key backlight ---
pub(crate) const FADE_FLOOR_MV: u32 = 2500;
pub(crate) const FADE_STEP_MV: u32 = 50;
pub(crate) const FADE_STEP_MS: u32 = 50;

// --- Breathing defaults ---
pub const BREATHING_MIN_MV: u32 = 2500;
pub const BREATHING_MAX_MV: u32 = 3300;
pub const BREATHING_STEP_MV: u32 = 50;
pub const BREATHING_STEP_MS: u32 = 100;
pub const BREATHING_PAUSE_MS: u32 = 700;

// --- Blinking defaults ---
pub const BLINKING_ON_MS: u32 = 1000;
pub const BLINKING_OFF_MS: u32 = 1000;

// --- Battery gate defaults ---
pub const BATTERY_LIMIT_PERCENT: u8 = 20;

/// Delay before the first effect step or battery poll after arming.
pub(crate) const KICKOFF_MS: u64 = 10;
/// Settle time after powering the touch rail at probe.
pub(crate) const POWER_ON_SETTLE_MS: u32 = 50;
/// Settle time after a failed firmware flash.
pub(crate) const FLASH_FAIL_SETTLE_MS: u32 = 300;
