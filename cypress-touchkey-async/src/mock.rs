//! Recording bus, delay and board doubles for the driver tests.

extern crate std;

use core::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use touchkey_battery_async::{BatteryStatus, ChargingStatus};

use crate::board::{Board, Rail};
use crate::driver::Touchkey;
use crate::error::RegulatorUnavailable;
use crate::keys::Key;
use crate::state::TouchkeyConfig;

/// One observable side effect, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write(u8),
    Delay(u32),
    Rail(Rail, bool),
    Voltage(u32),
    Key(Key, bool),
    Sync,
    ConfigureIrq,
    WakeLock(bool),
}

struct State {
    ops: Vec<Op>,
    frame: [u8; 10],
    fail_transfers: u32,
    failed_transfers: u32,
    last_write: Option<u8>,
    rails: [Option<bool>; 2],
    voltage: Option<u32>,
    readback_mv: u32,
    touch_active: bool,
    wake_lock: bool,
    capacity: Option<u8>,
    charging: bool,
    fail_flashes: u32,
    flash_attempts: u32,
    yield_on_rail: bool,
}

fn rail_index(rail: Rail) -> usize {
    match rail {
        Rail::Touch => 0,
        Rail::Led => 1,
    }
}

/// Shared view of everything the doubles recorded.
#[derive(Clone)]
pub struct Log(Rc<RefCell<State>>);

impl Log {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(State {
            ops: Vec::new(),
            frame: [0x00, 0x0A, 0x03, 0, 0, 0, 0, 0, 0, 0],
            fail_transfers: 0,
            failed_transfers: 0,
            last_write: None,
            rails: [None; 2],
            voltage: None,
            readback_mv: 3100,
            touch_active: false,
            wake_lock: false,
            capacity: Some(100),
            charging: false,
            fail_flashes: 0,
            flash_attempts: 0,
            yield_on_rail: false,
        })))
    }

    fn push(&self, op: Op) {
        self.0.borrow_mut().ops.push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.borrow().ops.clone()
    }

    /// Forgets recorded operations. Device state is kept.
    pub fn clear(&self) {
        self.0.borrow_mut().ops.clear();
    }

    pub fn keys(&self) -> Vec<(Key, bool)> {
        self.0
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Key(key, pressed) => Some((*key, *pressed)),
                _ => None,
            })
            .collect()
    }

    pub fn voltages(&self) -> Vec<u32> {
        self.0
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Voltage(mv) => Some(*mv),
                _ => None,
            })
            .collect()
    }

    /// Current LED rail voltage.
    pub fn voltage(&self) -> Option<u32> {
        self.0.borrow().voltage
    }

    pub fn rail(&self, rail: Rail) -> Option<bool> {
        self.0.borrow().rails[rail_index(rail)]
    }

    pub fn last_write(&self) -> Option<u8> {
        self.0.borrow().last_write
    }

    pub fn wake_lock(&self) -> bool {
        self.0.borrow().wake_lock
    }

    /// Sets the status bytes: keycode, firmware and module version.
    pub fn set_frame(&self, status: [u8; 3]) {
        self.0.borrow_mut().frame[..3].copy_from_slice(&status);
    }

    pub fn set_sensitivity(&self, menu: u8, back: u8) {
        let mut state = self.0.borrow_mut();
        state.frame[7] = menu;
        state.frame[9] = back;
    }

    pub fn fail_next_transfers(&self, n: u32) {
        self.0.borrow_mut().fail_transfers = n;
    }

    pub fn failed_transfers(&self) -> u32 {
        self.0.borrow().failed_transfers
    }

    pub fn set_touch_active(&self, active: bool) {
        self.0.borrow_mut().touch_active = active;
    }

    /// `None` makes the battery status unavailable.
    pub fn set_capacity(&self, capacity: Option<u8>) {
        self.0.borrow_mut().capacity = capacity;
    }

    pub fn set_charging(&self, charging: bool) {
        self.0.borrow_mut().charging = charging;
    }

    pub fn fail_next_flashes(&self, n: u32) {
        self.0.borrow_mut().fail_flashes = n;
    }

    pub fn flash_attempts(&self) -> u32 {
        self.0.borrow().flash_attempts
    }

    /// Makes every rail switch yield to the executor once.
    pub fn set_yield_on_rail(&self, enabled: bool) {
        self.0.borrow_mut().yield_on_rail = enabled;
    }
}

pub struct MockI2c(Log);

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        assert_eq!(address, touchkey_bus_async::TOUCHKEY_ADDRESS);
        let mut state = self.0 .0.borrow_mut();
        if state.fail_transfers > 0 {
            state.fail_transfers -= 1;
            state.failed_transfers += 1;
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Read(buf) => {
                    buf.fill(0);
                    let len = buf.len().min(state.frame.len());
                    buf[..len].copy_from_slice(&state.frame[..len]);
                    state.ops.push(Op::Read);
                }
                Operation::Write(bytes) => {
                    state.last_write = Some(bytes[0]);
                    state.ops.push(Op::Write(bytes[0]));
                }
            }
        }
        Ok(())
    }
}

pub struct MockDelay(Log);

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, _ns: u32) {}

    async fn delay_ms(&mut self, ms: u32) {
        self.0.push(Op::Delay(ms));
    }
}

pub struct MockBoard(Log);

impl Board for MockBoard {
    async fn set_rail(&mut self, rail: Rail, on: bool) -> Result<(), RegulatorUnavailable> {
        let yield_first = self.0 .0.borrow().yield_on_rail;
        if yield_first {
            embassy_futures::yield_now().await;
        }
        let mut state = self.0 .0.borrow_mut();
        state.rails[rail_index(rail)] = Some(on);
        state.ops.push(Op::Rail(rail, on));
        Ok(())
    }

    async fn set_led_voltage(&mut self, mv: u32) -> Result<(), RegulatorUnavailable> {
        let mut state = self.0 .0.borrow_mut();
        state.voltage = Some(mv);
        state.ops.push(Op::Voltage(mv));
        Ok(())
    }

    async fn led_voltage(&mut self) -> Result<u32, RegulatorUnavailable> {
        Ok(self.0 .0.borrow().readback_mv)
    }

    fn report_key(&mut self, key: Key, pressed: bool) {
        self.0.push(Op::Key(key, pressed));
    }

    fn sync_keys(&mut self) {
        self.0.push(Op::Sync);
    }

    fn touch_surface_active(&self) -> bool {
        self.0 .0.borrow().touch_active
    }

    fn configure_key_irq(&mut self) {
        self.0.push(Op::ConfigureIrq);
    }

    fn set_wake_lock(&mut self, held: bool) {
        let mut state = self.0 .0.borrow_mut();
        state.wake_lock = held;
        state.ops.push(Op::WakeLock(held));
    }

    fn wake_lock_held(&self) -> bool {
        self.0 .0.borrow().wake_lock
    }

    async fn battery_status(&mut self) -> Result<BatteryStatus, ()> {
        let state = self.0 .0.borrow();
        let charging = if state.charging {
            ChargingStatus::FastCharge
        } else {
            ChargingStatus::NotCharging
        };
        state
            .capacity
            .map(|pct| BatteryStatus::from_capacity(pct, charging))
            .ok_or(())
    }

    async fn flash_firmware(&mut self) -> Result<(), ()> {
        let mut state = self.0 .0.borrow_mut();
        state.flash_attempts += 1;
        if state.fail_flashes > 0 {
            state.fail_flashes -= 1;
            return Err(());
        }
        Ok(())
    }
}

pub type MockTouchkey = Touchkey<NoopRawMutex, MockI2c, MockDelay, MockBoard>;

/// A driver that has not been probed yet.
pub fn new_touchkey() -> (MockTouchkey, Log) {
    let log = Log::new();
    let tk = Touchkey::new(
        MockI2c(log.clone()),
        MockDelay(log.clone()),
        MockBoard(log.clone()),
        TouchkeyConfig::default(),
    );
    (tk, log)
}

/// A probed driver with the recorded bring-up cleared.
pub fn probed() -> (MockTouchkey, Log) {
    let (tk, log) = new_touchkey();
    block_on(tk.probe()).unwrap();
    log.clear();
    (tk, log)
}
