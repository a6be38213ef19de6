//! Battery gate: holds an activation until the battery has drained to the
//! configured capacity.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, warn};

use crate::board::Board;
use crate::driver::Touchkey;
use crate::timers::TimerId;

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    pub(crate) async fn battery_poll(&self) {
        let mut hw = self.hw.lock().await;
        let gate = self.battery_gate();
        if !gate.pending {
            return;
        }

        // Gating was switched off while waiting.
        if !gate.is_active() {
            self.with_battery(|g| g.pending = false);
            self.light_notification(&mut hw).await;
            return;
        }

        let status = match hw.board.battery_status().await {
            Ok(status) => status,
            Err(()) => {
                warn!("touchkey: battery status unavailable, polling again");
                self.arm_timer(TimerId::BatteryPoll, gate.poll_interval_ms as u64);
                return;
            }
        };

        self.with_battery(|g| g.last_capacity_pct = Some(status.capacity_percent));
        self.on_charger_changed(status.on_charger());

        if status.capacity_percent <= gate.capacity_limit_pct {
            debug!(
                "touchkey: battery at {}%, releasing notification",
                status.capacity_percent
            );
            self.with_battery(|g| g.pending = false);
            self.light_notification(&mut hw).await;
        } else {
            self.arm_timer(TimerId::BatteryPoll, gate.poll_interval_ms as u64);
        }
    }
}
