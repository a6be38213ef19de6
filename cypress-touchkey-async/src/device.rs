//! Bring-up and firmware maintenance.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error, info, warn};

use crate::board::{Board, Rail};
use crate::defs::{
    BACK_SENSITIVITY_OFFSET, BL_ALWAYS_ON, CMD_RECALIBRATE, FIRMWARE_FLASH_ATTEMPTS,
    FIRMWARE_VERSION_OFFSET, FLASH_FAIL_SETTLE_MS, KEYCODE_REG, MENU_SENSITIVITY_OFFSET,
    MIN_FIRMWARE_VERSION, MODULE_VERSION_OFFSET, POWER_ON_SETTLE_MS, SENSITIVITY_FRAME_LEN,
    STATUS_FRAME_LEN,
};
use crate::driver::{Hardware, Touchkey};
use crate::error::Error;
use crate::state::{FirmwareInfo, FirmwareStatus, KeySensitivity};

/// Firmware older than [`MIN_FIRMWARE_VERSION`] should be re-flashed.
pub fn needs_update(firmware_version: u8) -> bool {
    firmware_version < MIN_FIRMWARE_VERSION
}

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    /// Powers the controller up and checks that it answers.
    ///
    /// A failed version read invalidates the device handle; there is no
    /// automatic re-probe.
    pub async fn probe(&self) -> Result<FirmwareInfo, Error<ErrorType>> {
        let mut hw = self.hw.lock().await;

        self.set_rail(&mut hw, Rail::Touch, true).await;
        hw.bus.delay_ms(POWER_ON_SETTLE_MS).await;
        hw.bus.handle_mut().set_enabled(true);

        let info = match self.read_firmware_info(&mut hw).await {
            Ok(info) => info,
            Err(err) => {
                error!("touchkey: probe failed: {err:?}");
                hw.bus.handle_mut().invalidate();
                return Err(err);
            }
        };

        self.set_rail(&mut hw, Rail::Led, true).await;
        if self.with_backlight(|b| b.timeout_ms) != BL_ALWAYS_ON {
            self.set_backlight(&mut hw, false).await;
        }
        match hw.board.led_voltage().await {
            Ok(mv) => self.with_backlight(|b| b.brightness_mv = mv),
            Err(err) => warn!("touchkey: cannot read LED rail voltage: {err:?}"),
        }

        info!(
            "touchkey: firmware {:#04x}, module {:#04x}",
            info.firmware_version, info.module_version
        );
        Ok(info)
    }

    /// Re-reads firmware and module version.
    pub async fn firmware_version(&self) -> Result<FirmwareInfo, Error<ErrorType>> {
        let mut hw = self.hw.lock().await;
        self.read_firmware_info(&mut hw).await
    }

    /// Reads the sensitivity counts of the menu and back keys.
    pub async fn key_sensitivity(&self) -> Result<KeySensitivity, Error<ErrorType>> {
        let mut hw = self.hw.lock().await;
        let frame = hw
            .bus
            .read_frame::<SENSITIVITY_FRAME_LEN>(KEYCODE_REG)
            .await?;
        Ok(KeySensitivity {
            menu: frame[MENU_SENSITIVITY_OFFSET],
            back: frame[BACK_SENSITIVITY_OFFSET],
        })
    }

    /// Asks the controller to recalibrate its key thresholds.
    pub async fn recalibrate(&self) -> Result<(), Error<ErrorType>> {
        let mut hw = self.hw.lock().await;
        hw.bus.write(&[CMD_RECALIBRATE]).await?;
        debug!("touchkey: sensitivity recalibration requested");
        Ok(())
    }

    /// Re-flashes the controller if its firmware is outdated.
    ///
    /// The key interrupt is masked for the duration. After every attempt
    /// failed the touch rail is left off and
    /// [`Error::FirmwareUpdateFailed`] is returned.
    pub async fn update_firmware(&self) -> Result<FirmwareStatus, Error<ErrorType>> {
        self.disable_irq();
        let result = self.flash_if_outdated().await;
        self.enable_irq();
        result
    }

    async fn flash_if_outdated(&self) -> Result<FirmwareStatus, Error<ErrorType>> {
        let mut hw = self.hw.lock().await;
        let info = self.read_firmware_info(&mut hw).await?;
        if !needs_update(info.firmware_version) {
            info!(
                "touchkey: firmware {:#04x} is up to date",
                info.firmware_version
            );
            return Ok(self.firmware_status());
        }

        self.set_firmware_status(FirmwareStatus::Downloading);
        for attempt in 1..=FIRMWARE_FLASH_ATTEMPTS {
            if hw.board.flash_firmware().await.is_ok() {
                info!("touchkey: firmware updated");
                self.set_firmware_status(FirmwareStatus::Pass);
                hw.board.configure_key_irq();
                return Ok(FirmwareStatus::Pass);
            }
            warn!("touchkey: firmware flash attempt {attempt} failed");
        }

        error!("touchkey: firmware update failed");
        self.set_rail(&mut hw, Rail::Touch, false).await;
        hw.bus.handle_mut().set_enabled(false);
        hw.bus.delay_ms(FLASH_FAIL_SETTLE_MS).await;
        self.set_firmware_status(FirmwareStatus::Fail);
        hw.board.configure_key_irq();
        Err(Error::FirmwareUpdateFailed)
    }

    async fn read_firmware_info(
        &self,
        hw: &mut Hardware<I2cType, D, B>,
    ) -> Result<FirmwareInfo, Error<ErrorType>> {
        let frame = hw
            .bus
            .read_frame::<STATUS_FRAME_LEN>(KEYCODE_REG)
            .await?;
        Ok(FirmwareInfo {
            firmware_version: frame[FIRMWARE_VERSION_OFFSET],
            module_version: frame[MODULE_VERSION_OFFSET],
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::needs_update;
    use crate::board::Rail;
    use crate::error::Error;
    use crate::mock::{new_touchkey, probed, Op};
    use crate::state::{FirmwareInfo, FirmwareStatus, KeySensitivity};

    #[test]
    fn probe_powers_up_and_reads_versions() {
        let (tk, log) = new_touchkey();
        log.set_frame([0x00, 0x0A, 0x03]);

        let info = block_on(tk.probe()).unwrap();

        assert_eq!(
            info,
            FirmwareInfo {
                firmware_version: 0x0A,
                module_version: 0x03
            }
        );
        assert_eq!(
            log.ops(),
            [
                Op::Rail(Rail::Touch, true),
                Op::Delay(50),
                Op::Read,
                Op::Rail(Rail::Led, true),
                Op::Write(2),
            ]
        );
        assert_eq!(tk.backlight_state().brightness_mv, 3100);
    }

    #[test]
    fn failed_probe_invalidates_the_handle() {
        let (tk, log) = new_touchkey();
        log.fail_next_transfers(2);

        let res = block_on(tk.probe());
        assert!(matches!(res, Err(Error::BusTransferFailed(_))));

        // The handle stays unusable even once the bus recovers.
        log.clear();
        assert_eq!(block_on(tk.firmware_version()), Err(Error::NotReady));
        assert!(!log.ops().contains(&Op::Read));
    }

    #[test]
    fn version_threshold() {
        assert!(needs_update(0x09));
        assert!(!needs_update(0x0A));
        assert!(!needs_update(0x10));
    }

    #[test]
    fn current_firmware_is_not_flashed() {
        let (tk, log) = probed();
        let status = block_on(tk.update_firmware()).unwrap();
        assert_eq!(status, FirmwareStatus::Pass);
        assert_eq!(log.flash_attempts(), 0);
        assert!(tk.irq_enabled());
    }

    #[test]
    fn outdated_firmware_is_flashed_with_retries() {
        let (tk, log) = probed();
        log.set_frame([0x00, 0x08, 0x03]);
        log.fail_next_flashes(2);

        let status = block_on(tk.update_firmware()).unwrap();
        assert_eq!(status, FirmwareStatus::Pass);
        assert_eq!(log.flash_attempts(), 3);
    }

    #[test]
    fn exhausted_flash_attempts_power_down() {
        let (tk, log) = probed();
        log.set_frame([0x00, 0x08, 0x03]);
        log.fail_next_flashes(3);
        log.clear();

        let res = block_on(tk.update_firmware());
        assert_eq!(res, Err(Error::FirmwareUpdateFailed));
        assert_eq!(tk.firmware_status(), FirmwareStatus::Fail);
        assert_eq!(log.flash_attempts(), 3);
        assert_eq!(log.rail(Rail::Touch), Some(false));
        assert!(log.ops().contains(&Op::Delay(300)));
        assert!(tk.irq_enabled());
    }

    #[test]
    fn sensitivity_comes_from_the_long_frame() {
        let (tk, log) = probed();
        log.set_sensitivity(42, 17);

        let sensitivity = block_on(tk.key_sensitivity()).unwrap();

        assert_eq!(sensitivity, KeySensitivity { menu: 42, back: 17 });
        assert_eq!(log.ops(), [Op::Read]);
    }

    #[test]
    fn recalibration_is_a_single_command() {
        let (tk, log) = probed();
        block_on(tk.recalibrate()).unwrap();
        assert_eq!(log.ops(), [Op::Write(0x40)]);
    }

    #[test]
    fn diagnostics_need_a_ready_device() {
        let (tk, log) = new_touchkey();
        assert_eq!(block_on(tk.key_sensitivity()), Err(Error::NotReady));
        assert_eq!(block_on(tk.recalibrate()), Err(Error::NotReady));
        assert!(log.ops().is_empty());
    }
}
