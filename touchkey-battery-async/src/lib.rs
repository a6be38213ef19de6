//! An asynchronous, `no_std` battery status source backed by the BQ25896 charger IC.
//!
//! The touchkey notification feature only needs two facts about the battery:
//! how full it is and whether a charger is attached. This crate provides a
//! `BatteryService` that reads both from the BQ25896 over I2C and condenses
//! them into a [`BatteryStatus`].
//!
//! # Usage
//!
//! To use this driver, you need an I2C peripheral implementation that satisfies the
//! `embedded-hal-async::i2c::I2c` trait.
//!
//! ```ignore
//! use touchkey_battery_async::BatteryService;
//!
//! let mut battery = BatteryService::new(i2c);
//! battery.enable_adc().await?;
//! let status = battery.status().await?;
//! log::info!("Battery at {}% (charger: {})", status.capacity_percent, status.on_charger());
//! ```

#![no_std]

use embassy_time::{Duration, Timer};
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::error;

// --- Register Addresses ---
const BQ25896_I2C_ADDR: u8 = 0x6B;
const ADC_CTRL_REG: u8 = 0x02;
const SYS_STATUS_REG: u8 = 0x0B;
const VOLTAGE_READ_REG: u8 = 0x0E;

// --- ADC Control ---
const ADC_ENABLE_VALUE: u8 = 0xC0;
const ADC_DISABLE_VALUE: u8 = 0x40;
const ADC_SETTLE: Duration = Duration::from_secs(1);

// --- REG0B (System Status) ---
const CHARGE_STATUS_MASK: u8 = 0b0001_1000;
const CHARGE_STATUS_SHIFT: u8 = 3;

// --- REG0E (Battery Voltage) ---
const VBAT_MASK: u8 = 0x7F;
const VBAT_OFFSET_MV: u16 = 2304;
const VBAT_STEP_MV: u16 = 20;

/// Open-circuit voltage to remaining capacity for a single Li-ion cell.
const DISCHARGE_CURVE: [(u16, u8); 10] = [
    (3300, 0),
    (3500, 5),
    (3600, 10),
    (3700, 25),
    (3750, 40),
    (3800, 55),
    (3900, 70),
    (4000, 82),
    (4100, 92),
    (4200, 100),
];

/// Represents the charging status of the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingStatus {
    /// Not charging.
    NotCharging,
    /// Pre-charge phase.
    PreCharge,
    /// Fast charge phase.
    FastCharge,
    /// Charging is complete.
    ChargeDone,
}

impl ChargingStatus {
    fn from_status_byte(status: u8) -> Self {
        match (status & CHARGE_STATUS_MASK) >> CHARGE_STATUS_SHIFT {
            0b00 => ChargingStatus::NotCharging,
            0b01 => ChargingStatus::PreCharge,
            0b10 => ChargingStatus::FastCharge,
            _ => ChargingStatus::ChargeDone,
        }
    }

    /// A charger is attached, whether or not current is flowing.
    pub fn on_charger(self) -> bool {
        !matches!(self, ChargingStatus::NotCharging)
    }
}

/// A snapshot of the battery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// The measured battery voltage in millivolts.
    pub voltage_mv: u16,
    /// Estimated remaining capacity, 0..=100.
    pub capacity_percent: u8,
    /// The current charging status.
    pub charging_status: ChargingStatus,
}

impl BatteryStatus {
    /// Builds a status from an already known capacity, e.g. from a fuel gauge.
    pub fn from_capacity(capacity_percent: u8, charging_status: ChargingStatus) -> Self {
        Self {
            voltage_mv: 0,
            capacity_percent: capacity_percent.min(100),
            charging_status,
        }
    }

    pub fn on_charger(&self) -> bool {
        self.charging_status.on_charger()
    }
}

/// Estimates the remaining capacity from the cell voltage.
///
/// Linear interpolation over a typical Li-ion discharge curve, clamped to
/// 0 % below the first point and 100 % above the last one.
pub fn capacity_from_voltage(voltage_mv: u16) -> u8 {
    let (first_mv, first_pct) = DISCHARGE_CURVE[0];
    if voltage_mv <= first_mv {
        return first_pct;
    }
    for window in DISCHARGE_CURVE.windows(2) {
        let (lo_mv, lo_pct) = window[0];
        let (hi_mv, hi_pct) = window[1];
        if voltage_mv <= hi_mv {
            let span_mv = (hi_mv - lo_mv) as u32;
            let span_pct = (hi_pct - lo_pct) as u32;
            let above = (voltage_mv - lo_mv) as u32;
            return lo_pct + (above * span_pct / span_mv) as u8;
        }
    }
    100
}

/// A service for reading battery status from the BQ25896 charger IC.
pub struct BatteryService<
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
> {
    i2c: I2cType,
    adc_enabled: bool,
}

impl<
        I2cType: I2c<SevenBitAddress, Error = ErrorType>,
        ErrorType: embedded_hal_async::i2c::Error,
    > BatteryService<I2cType, ErrorType>
{
    /// Creates a new `BatteryService`.
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral that implements the `embedded-hal-async::i2c::I2c` trait.
    pub fn new(i2c: I2cType) -> Self {
        Self {
            i2c,
            adc_enabled: false,
        }
    }

    /// Starts continuous ADC conversion.
    ///
    /// [`BatteryService::status`] enables the ADC on first use and waits for
    /// the first conversion; enabling it up front avoids that wait.
    pub async fn enable_adc(&mut self) -> Result<(), ()> {
        if self.adc_enabled {
            return Ok(());
        }
        self.i2c
            .write(BQ25896_I2C_ADDR, &[ADC_CTRL_REG, ADC_ENABLE_VALUE])
            .await
            .map_err(|e| error!("Failed to enable ADC: {e:?}"))?;
        self.adc_enabled = true;
        Ok(())
    }

    /// Stops the ADC to save power.
    pub async fn disable_adc(&mut self) -> Result<(), ()> {
        if !self.adc_enabled {
            return Ok(());
        }
        self.i2c
            .write(BQ25896_I2C_ADDR, &[ADC_CTRL_REG, ADC_DISABLE_VALUE])
            .await
            .map_err(|e| error!("Failed to disable ADC: {e:?}"))?;
        self.adc_enabled = false;
        Ok(())
    }

    /// Reads the battery voltage and charger state.
    pub async fn status(&mut self) -> Result<BatteryStatus, ()> {
        if !self.adc_enabled {
            self.enable_adc().await?;
            Timer::after(ADC_SETTLE).await;
        }

        let mut vbat_buf = [0u8; 1];
        self.i2c
            .write_read(BQ25896_I2C_ADDR, &[VOLTAGE_READ_REG], &mut vbat_buf)
            .await
            .map_err(|e| error!("I2C Error reading VBAT: {e:?}"))?;

        let mut status_buf = [0u8; 1];
        self.i2c
            .write_read(BQ25896_I2C_ADDR, &[SYS_STATUS_REG], &mut status_buf)
            .await
            .map_err(|e| error!("I2C Error reading status: {e:?}"))?;

        let voltage_mv = VBAT_OFFSET_MV + (vbat_buf[0] & VBAT_MASK) as u16 * VBAT_STEP_MV;

        Ok(BatteryStatus {
            voltage_mv,
            capacity_percent: capacity_from_voltage(voltage_mv),
            charging_status: ChargingStatus::from_status_byte(status_buf[0]),
        })
    }

    /// Gives back the I2C peripheral.
    pub fn release(self) -> I2cType {
        self.i2c
    }
}
