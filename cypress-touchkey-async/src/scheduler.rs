//! Backlight and notification scheduler.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::debug;

use crate::board::{Board, Rail};
use crate::defs::{
    BL_ALWAYS_OFF, FADE_FLOOR_MV, FADE_STEP_MS, FADE_STEP_MV, KICKOFF_MS, LED_MAX_MV,
    NOTIFICATION_MV,
};
use crate::driver::{Hardware, Touchkey};
use crate::effect::{BlinkConfig, BreathingConfig, EffectMode};
use crate::timers::TimerId;

/// How the notification timeout is armed on activation.
enum TimeoutArm {
    After(u64),
    Forever,
}

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    /// Turns the notification LED on.
    ///
    /// Does nothing unless notifications are enabled. With the battery gate
    /// configured the request is held, with the wake-lock taken, until a poll
    /// finds the capacity at or below the limit.
    pub async fn activate(&self) {
        if !self.with_notification(|n| n.is_enabled()) {
            debug!("touchkey: ENABLE_BL ignored, notifications disabled");
            return;
        }
        debug!("touchkey: ENABLE_BL");

        let mut hw = self.hw.lock().await;
        if !hw.board.wake_lock_held() {
            hw.board.set_wake_lock(true);
        }

        let gated = self.with_battery(|gate| {
            if gate.is_active() {
                gate.pending = true;
            }
            gate.pending
        });
        if gated {
            debug!("touchkey: activation waits for the battery gate");
            self.arm_timer(TimerId::BatteryPoll, KICKOFF_MS);
            return;
        }

        self.light_notification(&mut hw).await;
    }

    /// Powers the LED for a notification and starts its effect and timeout.
    pub(crate) async fn light_notification(&self, hw: &mut Hardware<I2cType, D, B>) {
        if self.with_backlight(|b| b.is_suspended()) {
            self.power_for_notification(hw).await;
        }

        self.set_backlight(hw, true).await;
        self.with_notification(|n| n.led_on = true);

        let effect = self.with_effect(|e| e.is_configured().then(|| e.reset()));
        match effect {
            Some(first) => {
                if let Some(cmd) = first {
                    self.apply(hw, cmd).await;
                }
                self.arm_timer(TimerId::Effect, KICKOFF_MS);
            }
            None => self.set_voltage(hw, NOTIFICATION_MV).await,
        }

        let arm = self.with_notification(|n| {
            if !n.has_timeout() {
                return None;
            }
            n.count += 1;
            if n.persistent && n.on_charger {
                Some(TimeoutArm::Forever)
            } else if n.renew || n.count < 2 {
                Some(TimeoutArm::After(n.timeout_ms as u64))
            } else {
                None
            }
        });
        match arm {
            Some(TimeoutArm::Forever) => self.arm_timer_forever(TimerId::NotificationTimeout),
            Some(TimeoutArm::After(ms)) => self.arm_timer(TimerId::NotificationTimeout, ms),
            None => {}
        }
    }

    /// Brings the controller back up while the display is off, so the
    /// notification can be driven.
    async fn power_for_notification(&self, hw: &mut Hardware<I2cType, D, B>) {
        self.set_rail(hw, Rail::Touch, true).await;
        self.set_rail(hw, Rail::Led, true).await;
        hw.bus.handle_mut().set_enabled(true);
    }

    /// Chip command "backlight off", skipped while suspend has the
    /// controller powered down. The rail cut that follows turns the LED off
    /// in that case.
    async fn notification_backlight_off(&self, hw: &mut Hardware<I2cType, D, B>) {
        if hw.bus.handle().is_enabled() {
            self.set_backlight(hw, false).await;
        } else {
            self.with_backlight(|b| b.backlight_on = false);
        }
    }

    /// Turns the notification LED off. Serialized against resume.
    pub async fn deactivate(&self) {
        debug!("touchkey: DISABLE_BL");
        let _gate = self.gate.lock().await;
        let mut hw = self.hw.lock().await;

        let was_gated = self.with_battery(|gate| core::mem::take(&mut gate.pending));
        if was_gated {
            self.cancel_timer(TimerId::BatteryPoll);
        }

        if !self.led_on() {
            if was_gated {
                self.release_wake_lock(&mut hw);
            }
            return;
        }

        self.notification_backlight_off(&mut hw).await;
        self.with_notification(|n| n.led_on = false);

        if self.with_backlight(|b| b.is_suspended()) {
            self.set_rail(&mut hw, Rail::Led, false).await;
            self.set_rail(&mut hw, Rail::Touch, false).await;
            hw.bus.handle_mut().set_enabled(false);
        }

        if self.with_notification(|n| n.has_timeout()) {
            self.cancel_timer(TimerId::NotificationTimeout);
        }
        if self.with_effect(|e| e.is_configured()) {
            self.cancel_timer(TimerId::Effect);
            self.with_effect(|e| e.stop());
        }
        self.release_wake_lock(&mut hw);
    }

    /// Key backlight timeout: fade or cut the backlight unless a
    /// notification owns the rail.
    pub(crate) async fn key_backlight_off(&self) {
        let mut hw = self.hw.lock().await;
        if self.led_on() || !hw.bus.handle().is_enabled() {
            return;
        }

        let backlight = self.backlight_state();
        if backlight.fade_out {
            let mut mv = backlight.brightness_mv.min(LED_MAX_MV);
            while mv >= FADE_FLOOR_MV {
                self.set_voltage(&mut hw, mv).await;
                hw.bus.delay_ms(FADE_STEP_MS).await;
                mv -= FADE_STEP_MV;
            }
        }
        self.set_backlight(&mut hw, false).await;
    }

    /// Notification timeout: stand the whole device down, whether or not
    /// the display is on.
    pub(crate) async fn notification_off(&self) {
        let mut hw = self.hw.lock().await;
        if !self.led_on() {
            return;
        }
        debug!("touchkey: notification timed out");

        self.notification_backlight_off(&mut hw).await;
        self.set_rail(&mut hw, Rail::Led, false).await;
        self.set_rail(&mut hw, Rail::Touch, false).await;
        hw.bus.handle_mut().set_enabled(false);

        self.with_notification(|n| {
            n.led_on = false;
            n.count = 0;
        });
        self.cancel_timer(TimerId::Effect);
        self.with_effect(|e| e.stop());
        self.release_wake_lock(&mut hw);
    }

    /// One breathing or blinking step. Stops once the notification is off.
    pub(crate) async fn effect_step(&self) {
        let mut hw = self.hw.lock().await;
        if !self.led_on() {
            return;
        }
        let Some(step) = self.with_effect(|e| e.step()) else {
            return;
        };
        if !hw.bus.handle().is_enabled() {
            self.power_for_notification(&mut hw).await;
        }
        for cmd in step.commands {
            self.apply(&mut hw, cmd).await;
        }
        self.arm_timer(TimerId::Effect, step.next_ms as u64);
    }

    // --- Configuration ---

    /// Sets the key backlight timeout. The LED rail is powered down for the
    /// always-off sentinel and up otherwise.
    pub async fn set_led_timeout(&self, timeout_ms: i32) {
        let mut hw = self.hw.lock().await;
        self.with_backlight(|b| b.timeout_ms = timeout_ms);
        self.set_rail(&mut hw, Rail::Led, timeout_ms != BL_ALWAYS_OFF)
            .await;
    }

    /// Drives the LED rail to `mv` and makes it the key backlight level.
    /// Values above [`LED_MAX_MV`] are clamped.
    pub async fn set_brightness(&self, mv: u32) {
        let mv = mv.min(LED_MAX_MV);
        let mut hw = self.hw.lock().await;
        self.set_voltage(&mut hw, mv).await;
        self.with_backlight(|b| b.brightness_mv = mv);
    }

    /// `true` forces the backlight off through the chip, `false` turns it
    /// back on.
    pub async fn set_blink_control(&self, hold_off: bool) {
        let mut hw = self.hw.lock().await;
        self.with_backlight(|b| b.blink_control = hold_off);
        self.set_backlight(&mut hw, !hold_off).await;
    }

    pub fn set_notifications_enabled(&self, enabled: i32) {
        self.with_notification(|n| n.enabled = enabled);
    }

    /// Sets the notification timeout. Flags are left untouched when `None`.
    pub fn set_notification_timeout(
        &self,
        timeout_ms: i32,
        persistent: Option<bool>,
        renew: Option<bool>,
    ) {
        self.with_notification(|n| {
            n.timeout_ms = timeout_ms;
            if let Some(persistent) = persistent {
                n.persistent = persistent;
            }
            if let Some(renew) = renew {
                n.renew = renew;
            }
        });
    }

    /// Selects the notification effect.
    ///
    /// A displayed notification switches over right away: the new animation
    /// starts from its first phase, or the steady notification level is
    /// restored for [`EffectMode::Off`].
    pub async fn set_effect_mode(&self, mode: EffectMode) {
        let mut hw = self.hw.lock().await;
        let changed = self.with_effect(|e| {
            let changed = e.mode() != mode;
            e.set_mode(mode);
            changed
        });
        if !changed || !self.led_on() {
            return;
        }
        debug!("touchkey: notification effect now {mode:?}");

        if !hw.bus.handle().is_enabled() {
            self.power_for_notification(&mut hw).await;
        }
        self.set_backlight(&mut hw, true).await;
        match self.with_effect(|e| e.reset()) {
            Some(first) => {
                self.apply(&mut hw, first).await;
                self.arm_timer(TimerId::Effect, KICKOFF_MS);
            }
            None => {
                self.cancel_timer(TimerId::Effect);
                self.set_voltage(&mut hw, NOTIFICATION_MV).await;
            }
        }
    }

    pub fn set_breathing_config(&self, config: BreathingConfig) {
        self.with_effect(|e| e.set_breathing(config));
    }

    pub fn set_blink_config(&self, config: BlinkConfig) {
        self.with_effect(|e| e.set_blink(config));
    }

    pub fn set_fade_out(&self, fade_out: bool) {
        self.with_backlight(|b| b.fade_out = fade_out);
    }

    pub fn set_battery_gate(&self, capacity_limit_pct: u8, poll_interval_ms: u32) {
        self.with_battery(|gate| {
            gate.capacity_limit_pct = capacity_limit_pct;
            gate.poll_interval_ms = poll_interval_ms;
        });
    }

    /// Charger plugged in or out.
    ///
    /// With charging-enable set, plugging in saves the master switch and
    /// forces it on; unplugging restores it.
    pub fn on_charger_changed(&self, on_charger: bool) {
        self.with_notification(|n| {
            if n.on_charger == on_charger {
                return;
            }
            n.on_charger = on_charger;
            if !n.enabled_while_charging {
                return;
            }
            if on_charger {
                n.saved_enabled = n.enabled;
                n.enabled = 1;
            } else {
                n.enabled = n.saved_enabled;
            }
        });
    }

    /// Sets charging-enable. Applies immediately if a charger is attached.
    pub fn set_enabled_while_charging(&self, enabled: bool) {
        self.with_notification(|n| {
            n.enabled_while_charging = enabled;
            if enabled && n.on_charger {
                n.saved_enabled = n.enabled;
                n.enabled = 1;
            }
        });
    }
}
