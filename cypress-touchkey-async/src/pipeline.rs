//! Key event pipeline: interrupt work to input report.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, warn};

use crate::board::Board;
use crate::defs::{KEYCODE_REG, KEY_READ_ATTEMPTS, STATUS_FRAME_LEN};
use crate::driver::{Hardware, Touchkey};
use crate::error::Error;
use crate::keys::KeyEvent;
use crate::timers::TimerId;

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    pub(crate) async fn handle_key_work(&self) {
        let mut hw = self.hw.lock().await;
        // Suspend may have cancelled the work while it sat in the queue.
        if !self.take_key_work() {
            return;
        }
        if let Err(err) = self.service_key_event(&mut hw).await {
            debug!("touchkey: key event dropped: {err:?}");
        }
        self.enable_irq();
    }

    /// Reads, decodes and reports one key event, then lights the key
    /// backlight and restarts its timeout. The caller unmasks the interrupt.
    async fn service_key_event(
        &self,
        hw: &mut Hardware<I2cType, D, B>,
    ) -> Result<KeyEvent, Error<ErrorType>> {
        let frame = self.read_status_frame(hw).await?;
        let event = self
            .key_map
            .decode(frame[0])
            .map_err(Error::InvalidKeycode)?;

        if hw.board.touch_surface_active() {
            debug!("touchkey: {event:?} suppressed, touch surface active");
        } else {
            hw.board.report_key(event.key, event.pressed);
            hw.board.sync_keys();
        }

        let timer_running = self.with_timers(|t| t.pending(TimerId::KeyBacklight, Instant::now()));
        let backlight = self.backlight_state();
        if timer_running || !backlight.always_off() {
            self.set_voltage(hw, backlight.brightness_mv).await;
            self.set_backlight(hw, true).await;
        }
        if backlight.auto_off() {
            self.arm_timer(TimerId::KeyBacklight, backlight.timeout_ms as u64);
        }

        Ok(event)
    }

    async fn read_status_frame(
        &self,
        hw: &mut Hardware<I2cType, D, B>,
    ) -> Result<[u8; STATUS_FRAME_LEN], Error<ErrorType>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match hw.bus.read_frame::<STATUS_FRAME_LEN>(KEYCODE_REG).await {
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_transfer() && attempt < KEY_READ_ATTEMPTS => {
                    warn!("touchkey: status read failed, attempt {attempt}: {err:?}");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
