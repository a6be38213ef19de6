//! Power-state coordinator: display suspend and resume.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::debug;

use crate::board::{Board, Rail};
use crate::driver::Touchkey;
use crate::state::PowerState;
use crate::timers::TimerId;

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    /// The display is about to turn off.
    ///
    /// Masks the key interrupt, waits for in-flight key work, cancels queued
    /// key work, releases every key and powers the touch hardware down. The
    /// LED rail stays up while a notification is displayed.
    pub async fn suspend(&self) {
        debug!("touchkey: suspend");
        self.disable_irq();

        // Key work holds the hardware lock while it runs.
        let mut hw = self.hw.lock().await;
        if self.take_key_work() {
            debug!("touchkey: cancelled pending key work");
            self.enable_irq();
        }

        for key in self.key_map.keys() {
            hw.board.report_key(key, false);
        }
        hw.board.sync_keys();
        hw.bus.handle_mut().set_enabled(false);

        if !self.led_on() {
            self.set_rail(&mut hw, Rail::Led, false).await;
        }
        self.set_rail(&mut hw, Rail::Touch, false).await;
        self.with_backlight(|b| b.power = PowerState::Suspended);
    }

    /// The display turned back on. Serialized against
    /// [`deactivate`](Self::deactivate).
    ///
    /// A displayed notification is handed over to the key backlight: its
    /// renewable timeout is dropped, the wake-lock released and `led_on`
    /// cleared so that a later `Deactivate` leaves the light alone.
    pub async fn resume(&self) {
        debug!("touchkey: resume");
        let _gate = self.gate.lock().await;
        let mut hw = self.hw.lock().await;

        self.set_rail(&mut hw, Rail::Touch, true).await;
        hw.board.configure_key_irq();
        hw.bus.handle_mut().set_enabled(true);
        self.with_backlight(|b| b.power = PowerState::Active);

        let notification = self.notification_state();
        if notification.led_on {
            if notification.has_timeout() && notification.renew {
                self.cancel_timer(TimerId::NotificationTimeout);
            }
            self.release_wake_lock(&mut hw);
            self.with_notification(|n| n.led_on = false);
        }

        let backlight = self.backlight_state();
        if backlight.always_off() {
            self.set_backlight(&mut hw, false).await;
        } else {
            self.set_rail(&mut hw, Rail::Led, true).await;
            self.set_backlight(&mut hw, true).await;
            self.set_voltage(&mut hw, backlight.brightness_mv).await;
        }
        if backlight.auto_off() {
            self.arm_timer(TimerId::KeyBacklight, backlight.timeout_ms as u64);
        }

        if self.with_effect(|e| e.is_configured()) {
            self.cancel_timer(TimerId::Effect);
            self.with_effect(|e| e.stop());
        }

        drop(hw);
        self.enable_irq();
    }
}
