//! Text control plane: named attributes holding decimal integers.
//!
//! Values are whitespace separated, the way userspace writes them to the
//! notification attributes. Reads render into a fixed-size string.

use core::fmt::Write;
use core::str::FromStr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use heapless::{String, Vec};
use log::{debug, warn};

use crate::board::Board;
use crate::defs::{BLN_VERSION, LED_MAX_MV};
use crate::driver::Touchkey;
use crate::effect::{BlinkConfig, BreathingConfig, EffectMode};
use crate::error::{ControlError, Error};

/// Rendered attribute value.
pub type AttributeValue = String<32>;

/// A control-plane attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// `led`, also reachable as `notification_led`.
    Led,
    LedTimeout,
    Enabled,
    EnabledCharging,
    NotificationTimeout,
    BreathingEnabled,
    BlinkingEnabled,
    BreathingConfig,
    BlinkingConfig,
    LedFadeout,
    CheckBattery,
    Brightness,
    Version,
    BlinkControl,
    /// Raw sensitivity of the menu key.
    TouchkeyMenu,
    /// Raw sensitivity of the back key.
    TouchkeyBack,
    /// Any write starts a recalibration.
    TouchSensitivity,
    FirmwareUpdateStatus,
    /// Firmware version reported by the controller.
    FirmwareVersionPanel,
}

impl Attribute {
    pub const ALL: [Attribute; 19] = [
        Attribute::Led,
        Attribute::LedTimeout,
        Attribute::Enabled,
        Attribute::EnabledCharging,
        Attribute::NotificationTimeout,
        Attribute::BreathingEnabled,
        Attribute::BlinkingEnabled,
        Attribute::BreathingConfig,
        Attribute::BlinkingConfig,
        Attribute::LedFadeout,
        Attribute::CheckBattery,
        Attribute::Brightness,
        Attribute::Version,
        Attribute::BlinkControl,
        Attribute::TouchkeyMenu,
        Attribute::TouchkeyBack,
        Attribute::TouchSensitivity,
        Attribute::FirmwareUpdateStatus,
        Attribute::FirmwareVersionPanel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Led => "led",
            Attribute::LedTimeout => "led_timeout",
            Attribute::Enabled => "enabled",
            Attribute::EnabledCharging => "enabled_charging",
            Attribute::NotificationTimeout => "notification_timeout",
            Attribute::BreathingEnabled => "breathing_enabled",
            Attribute::BlinkingEnabled => "blinking_enabled",
            Attribute::BreathingConfig => "breathing_config",
            Attribute::BlinkingConfig => "blinking_config",
            Attribute::LedFadeout => "led_fadeout",
            Attribute::CheckBattery => "check_battery",
            Attribute::Brightness => "brightness",
            Attribute::Version => "version",
            Attribute::BlinkControl => "blink_control",
            Attribute::TouchkeyMenu => "touchkey_menu",
            Attribute::TouchkeyBack => "touchkey_back",
            Attribute::TouchSensitivity => "touch_sensitivity",
            Attribute::FirmwareUpdateStatus => "touchkey_firm_update_status",
            Attribute::FirmwareVersionPanel => "touchkey_firm_version_panel",
        }
    }
}

impl FromStr for Attribute {
    type Err = ControlError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name == "notification_led" {
            return Ok(Attribute::Led);
        }
        Attribute::ALL
            .into_iter()
            .find(|attr| attr.name() == name)
            .ok_or(ControlError::UnknownAttribute)
    }
}

fn device_error<E: core::fmt::Debug>(err: Error<E>) -> ControlError {
    warn!("touchkey: control access failed: {err:?}");
    ControlError::Device
}

/// Parses up to `N` whitespace-separated integers. More than `N` values, or
/// none at all, is invalid.
fn parse_ints<const N: usize>(value: &str) -> Result<Vec<i64, N>, ControlError> {
    let mut out = Vec::new();
    for token in value.split_whitespace() {
        let n = token.parse::<i64>().map_err(|_| ControlError::Invalid)?;
        out.push(n).map_err(|_| ControlError::Invalid)?;
    }
    if out.is_empty() {
        return Err(ControlError::Invalid);
    }
    Ok(out)
}

fn parse_exact<const N: usize>(value: &str) -> Result<[i64; N], ControlError> {
    let ints = parse_ints::<N>(value)?;
    if ints.len() != N {
        return Err(ControlError::Invalid);
    }
    let mut out = [0; N];
    out.copy_from_slice(&ints);
    Ok(out)
}

fn parse_one(value: &str) -> Result<i64, ControlError> {
    let [n] = parse_exact::<1>(value)?;
    Ok(n)
}

fn parse_i32(value: &str) -> Result<i32, ControlError> {
    i32::try_from(parse_one(value)?).map_err(|_| ControlError::Invalid)
}

fn parse_u32(n: i64) -> Result<u32, ControlError> {
    u32::try_from(n).map_err(|_| ControlError::Invalid)
}

fn parse_flag(value: &str) -> Result<bool, ControlError> {
    match parse_one(value)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ControlError::Invalid),
    }
}

/// `0`/`1` are taken as the flag value, anything else leaves it alone.
fn optional_flag(n: Option<&i64>) -> Option<bool> {
    match n {
        Some(0) => Some(false),
        Some(1) => Some(true),
        _ => None,
    }
}

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    /// Writes `value` to `attr`.
    pub async fn store(&self, attr: Attribute, value: &str) -> Result<(), ControlError> {
        debug!("touchkey: store {} = {:?}", attr.name(), value.trim());
        match attr {
            Attribute::Led => match parse_one(value)? {
                1 => self.activate().await,
                0 | 2 => self.deactivate().await,
                other => debug!("touchkey: ignoring led command {other}"),
            },
            Attribute::LedTimeout => self.set_led_timeout(parse_i32(value)?).await,
            Attribute::Enabled => self.set_notifications_enabled(parse_i32(value)?),
            Attribute::EnabledCharging => {
                self.set_enabled_while_charging(parse_one(value)? != 0)
            }
            Attribute::NotificationTimeout => {
                let ints = parse_ints::<3>(value)?;
                let timeout_ms = i32::try_from(ints[0]).map_err(|_| ControlError::Invalid)?;
                self.set_notification_timeout(
                    timeout_ms,
                    optional_flag(ints.get(1)),
                    optional_flag(ints.get(2)),
                );
            }
            Attribute::BreathingEnabled => {
                let mode = if parse_flag(value)? {
                    EffectMode::Breathing
                } else {
                    EffectMode::Off
                };
                self.set_effect_mode(mode).await;
            }
            Attribute::BlinkingEnabled => {
                let mode = if parse_flag(value)? {
                    EffectMode::Blinking
                } else {
                    EffectMode::Off
                };
                self.set_effect_mode(mode).await;
            }
            Attribute::BreathingConfig => {
                let [min, max, step, interval, pause] = parse_exact::<5>(value)?;
                let config = BreathingConfig {
                    min_mv: parse_u32(min)?,
                    max_mv: parse_u32(max)?,
                    step_mv: parse_u32(step)?,
                    step_interval_ms: parse_u32(interval)?,
                    pause_ms: parse_u32(pause)?,
                };
                if !config.is_valid() {
                    return Err(ControlError::Invalid);
                }
                self.set_breathing_config(config);
            }
            Attribute::BlinkingConfig => {
                let [on, off] = parse_exact::<2>(value)?;
                let config = BlinkConfig {
                    on_ms: parse_u32(on)?,
                    off_ms: parse_u32(off)?,
                };
                if config.on_ms == 0 || config.off_ms == 0 {
                    return Err(ControlError::Invalid);
                }
                self.set_blink_config(config);
            }
            Attribute::LedFadeout => self.set_fade_out(parse_flag(value)?),
            Attribute::CheckBattery => {
                let [limit, interval] = parse_exact::<2>(value)?;
                let limit = u8::try_from(limit)
                    .ok()
                    .filter(|pct| *pct <= 100)
                    .ok_or(ControlError::Invalid)?;
                self.set_battery_gate(limit, parse_u32(interval)?);
            }
            Attribute::Brightness => {
                let mv = parse_u32(parse_one(value)?)?;
                if mv > LED_MAX_MV {
                    return Err(ControlError::Invalid);
                }
                self.set_brightness(mv).await;
            }
            Attribute::TouchSensitivity => self.recalibrate().await.map_err(device_error)?,
            Attribute::Version
            | Attribute::TouchkeyMenu
            | Attribute::TouchkeyBack
            | Attribute::FirmwareUpdateStatus
            | Attribute::FirmwareVersionPanel => return Err(ControlError::NotSupported),
            Attribute::BlinkControl => match parse_one(value)? {
                1 => self.set_blink_control(true).await,
                0 => self.set_blink_control(false).await,
                other => debug!("touchkey: ignoring blink_control {other}"),
            },
        }
        Ok(())
    }

    /// Looks `name` up and writes `value` to it.
    pub async fn store_by_name(&self, name: &str, value: &str) -> Result<(), ControlError> {
        self.store(name.parse()?, value).await
    }

    /// Renders the current value of `attr`. Diagnostic attributes read the
    /// controller.
    pub async fn show(&self, attr: Attribute) -> Result<AttributeValue, ControlError> {
        let notification = self.notification_state();
        let backlight = self.backlight_state();
        let (mode, breathing, blink) = self.with_effect(|e| (e.mode(), e.breathing(), e.blink()));

        let mut out = AttributeValue::new();
        let res = match attr {
            Attribute::Led => write!(out, "{}", notification.led_on as u8),
            Attribute::LedTimeout => write!(out, "{}", backlight.timeout_ms),
            Attribute::Enabled => write!(out, "{}", notification.enabled),
            Attribute::EnabledCharging => {
                write!(out, "{}", notification.enabled_while_charging as u8)
            }
            Attribute::NotificationTimeout => write!(
                out,
                "{} {} {}",
                notification.timeout_ms, notification.persistent as u8, notification.renew as u8
            ),
            Attribute::BreathingEnabled => {
                write!(out, "{}", (mode == EffectMode::Breathing) as u8)
            }
            Attribute::BlinkingEnabled => write!(out, "{}", (mode == EffectMode::Blinking) as u8),
            Attribute::BreathingConfig => write!(
                out,
                "{} {} {} {} {}",
                breathing.min_mv,
                breathing.max_mv,
                breathing.step_mv,
                breathing.step_interval_ms,
                breathing.pause_ms
            ),
            Attribute::BlinkingConfig => write!(out, "{} {}", blink.on_ms, blink.off_ms),
            Attribute::LedFadeout => write!(out, "{}", backlight.fade_out as u8),
            Attribute::CheckBattery => {
                let gate = self.battery_gate();
                write!(out, "{}% {}ms", gate.capacity_limit_pct, gate.poll_interval_ms)
            }
            Attribute::Brightness => write!(out, "{}", backlight.brightness_mv),
            Attribute::Version => write!(out, "{}", BLN_VERSION),
            Attribute::BlinkControl => write!(out, "{}", backlight.blink_control as u8),
            Attribute::TouchkeyMenu => {
                let sensitivity = self.key_sensitivity().await.map_err(device_error)?;
                write!(out, "{}", sensitivity.menu)
            }
            Attribute::TouchkeyBack => {
                let sensitivity = self.key_sensitivity().await.map_err(device_error)?;
                write!(out, "{}", sensitivity.back)
            }
            Attribute::TouchSensitivity => return Err(ControlError::NotSupported),
            Attribute::FirmwareUpdateStatus => write!(out, "{}", self.firmware_status().as_str()),
            Attribute::FirmwareVersionPanel => {
                let info = self.firmware_version().await.map_err(device_error)?;
                write!(out, "{:#x}", info.firmware_version)
            }
        };
        res.map_err(|_| ControlError::Invalid)?;
        Ok(out)
    }

    pub async fn show_by_name(&self, name: &str) -> Result<AttributeValue, ControlError> {
        self.show(name.parse()?).await
    }
}
