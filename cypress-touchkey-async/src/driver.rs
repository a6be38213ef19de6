//! The driver instance: shared state, the deferred-work queue and the timer
//! service.

use core::cell::{Cell, RefCell};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, trace, warn};
use touchkey_bus_async::TouchkeyBus;

use crate::board::{Board, Rail};
use crate::defs::{CMD_BACKLIGHT_OFF, CMD_BACKLIGHT_ON};
use crate::effect::{EffectGenerator, EffectMode, EffectPhase, RailCommand};
use crate::keys::KeyMap;
use crate::state::{
    BacklightState, BatteryGate, FirmwareStatus, NotificationState, TouchkeyConfig,
};
use crate::timers::{TimerId, TimerSet};

/// Capacity of the work queue. Each [`Work`] kind is queued at most once.
const WORK_QUEUE_DEPTH: usize = 8;

/// A unit of deferred work, executed by [`Touchkey::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Work {
    /// Service a key interrupt.
    KeyEvent,
    /// The key backlight timed out.
    KeyBacklightOff,
    /// The notification timed out.
    NotificationOff,
    /// Advance the breathing or blinking animation.
    EffectStep,
    /// Check the battery for a gated activation.
    BatteryPoll,
}

impl Work {
    fn bit(self) -> u8 {
        match self {
            Work::KeyEvent => 1 << 0,
            Work::KeyBacklightOff => 1 << 1,
            Work::NotificationOff => 1 << 2,
            Work::EffectStep => 1 << 3,
            Work::BatteryPoll => 1 << 4,
        }
    }
}

impl From<TimerId> for Work {
    fn from(id: TimerId) -> Self {
        match id {
            TimerId::KeyBacklight => Work::KeyBacklightOff,
            TimerId::NotificationTimeout => Work::NotificationOff,
            TimerId::Effect => Work::EffectStep,
            TimerId::BatteryPoll => Work::BatteryPoll,
        }
    }
}

/// Key interrupt bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct IrqState {
    /// Nesting depth of interrupt masking. The interrupt is live at zero.
    pub(crate) disable_depth: u8,
    /// Set by the top half, taken by whoever services or cancels the work.
    pub(crate) key_work_pending: bool,
}

/// Everything that talks to hardware. Only touched under the hardware lock.
pub(crate) struct Hardware<I2cType, D, B> {
    pub(crate) bus: TouchkeyBus<I2cType, D>,
    pub(crate) board: B,
}

/// Cypress touchkey driver with backlight notification support.
///
/// All methods take `&self`; the instance is meant to be shared (e.g. via a
/// `static`) between the interrupt handler, the control plane, the power
/// state hooks and the two service futures [`run`](Self::run) and
/// [`run_timers`](Self::run_timers).
///
/// Lock order is enable gate, then hardware, then the state groups. State
/// group locks are never held across an `.await`.
pub struct Touchkey<M: RawMutex, I2cType, D, B> {
    pub(crate) hw: Mutex<M, Hardware<I2cType, D, B>>,
    /// Serializes resume against `Deactivate`.
    pub(crate) gate: Mutex<M, ()>,
    pub(crate) key_map: KeyMap,
    notification: BlockingMutex<M, RefCell<NotificationState>>,
    backlight: BlockingMutex<M, RefCell<BacklightState>>,
    effect: BlockingMutex<M, RefCell<EffectGenerator>>,
    battery: BlockingMutex<M, RefCell<BatteryGate>>,
    timers: BlockingMutex<M, RefCell<TimerSet>>,
    irq: BlockingMutex<M, RefCell<IrqState>>,
    firmware_status: BlockingMutex<M, Cell<FirmwareStatus>>,
    queued: BlockingMutex<M, Cell<u8>>,
    work: Channel<M, Work, WORK_QUEUE_DEPTH>,
    rearm: Signal<M, ()>,
}

impl<M, I2cType, ErrorType, D, B> Touchkey<M, I2cType, D, B>
where
    M: RawMutex,
    I2cType: I2c<SevenBitAddress, Error = ErrorType>,
    ErrorType: embedded_hal_async::i2c::Error,
    D: DelayNs,
    B: Board,
{
    /// Creates a driver. Nothing touches the hardware until
    /// [`probe`](Self::probe).
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral that implements `embedded-hal-async::i2c::I2c`.
    /// * `delay` - A delay provider for retry backoff, fades and settle times.
    /// * `board` - Platform services, see [`Board`].
    /// * `config` - Bus address, key map and initial key backlight timeout.
    pub fn new(i2c: I2cType, delay: D, board: B, config: TouchkeyConfig) -> Self {
        Self {
            hw: Mutex::new(Hardware {
                bus: TouchkeyBus::new(i2c, delay, config.address),
                board,
            }),
            gate: Mutex::new(()),
            key_map: config.key_map,
            notification: BlockingMutex::new(RefCell::new(NotificationState::new())),
            backlight: BlockingMutex::new(RefCell::new(BacklightState::new(
                config.led_timeout_ms,
            ))),
            effect: BlockingMutex::new(RefCell::new(EffectGenerator::new())),
            battery: BlockingMutex::new(RefCell::new(BatteryGate::new())),
            timers: BlockingMutex::new(RefCell::new(TimerSet::new())),
            irq: BlockingMutex::new(RefCell::new(IrqState::default())),
            firmware_status: BlockingMutex::new(Cell::new(FirmwareStatus::Pass)),
            queued: BlockingMutex::new(Cell::new(0)),
            work: Channel::new(),
            rearm: Signal::new(),
        }
    }

    // --- State snapshots ---

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    pub fn notification_state(&self) -> NotificationState {
        self.with_notification(|n| *n)
    }

    pub fn backlight_state(&self) -> BacklightState {
        self.with_backlight(|b| *b)
    }

    pub fn battery_gate(&self) -> BatteryGate {
        self.with_battery(|b| *b)
    }

    /// The notification LED is displayed.
    pub fn led_on(&self) -> bool {
        self.with_notification(|n| n.led_on)
    }

    pub fn effect_mode(&self) -> EffectMode {
        self.with_effect(|e| e.mode())
    }

    pub fn effect_phase(&self) -> EffectPhase {
        self.with_effect(|e| e.phase())
    }

    pub fn timer_deadline(&self, id: TimerId) -> Option<Instant> {
        self.with_timers(|t| t.deadline(id))
    }

    /// The key interrupt is unmasked.
    pub fn irq_enabled(&self) -> bool {
        self.with_irq(|irq| irq.disable_depth == 0)
    }

    pub fn firmware_status(&self) -> FirmwareStatus {
        self.firmware_status.lock(|s| s.get())
    }

    pub(crate) fn set_firmware_status(&self, status: FirmwareStatus) {
        self.firmware_status.lock(|s| s.set(status));
    }

    pub(crate) fn with_notification<R>(&self, f: impl FnOnce(&mut NotificationState) -> R) -> R {
        self.notification.lock(|n| f(&mut n.borrow_mut()))
    }

    pub(crate) fn with_backlight<R>(&self, f: impl FnOnce(&mut BacklightState) -> R) -> R {
        self.backlight.lock(|b| f(&mut b.borrow_mut()))
    }

    pub(crate) fn with_effect<R>(&self, f: impl FnOnce(&mut EffectGenerator) -> R) -> R {
        self.effect.lock(|e| f(&mut e.borrow_mut()))
    }

    pub(crate) fn with_battery<R>(&self, f: impl FnOnce(&mut BatteryGate) -> R) -> R {
        self.battery.lock(|b| f(&mut b.borrow_mut()))
    }

    pub(crate) fn with_timers<R>(&self, f: impl FnOnce(&mut TimerSet) -> R) -> R {
        self.timers.lock(|t| f(&mut t.borrow_mut()))
    }

    pub(crate) fn with_irq<R>(&self, f: impl FnOnce(&mut IrqState) -> R) -> R {
        self.irq.lock(|irq| f(&mut irq.borrow_mut()))
    }

    // --- Interrupt top half ---

    /// Key interrupt handler. Never blocks and never touches the bus.
    ///
    /// Masks the interrupt and queues [`Work::KeyEvent`]; the interrupt is
    /// unmasked again when that work finishes, on every path.
    pub fn on_interrupt(&self) {
        let accepted = self.with_irq(|irq| {
            if irq.disable_depth > 0 {
                return false;
            }
            irq.disable_depth += 1;
            irq.key_work_pending = true;
            true
        });
        if accepted {
            self.post(Work::KeyEvent);
        } else {
            trace!("touchkey: interrupt while masked");
        }
    }

    pub(crate) fn disable_irq(&self) {
        self.with_irq(|irq| irq.disable_depth = irq.disable_depth.saturating_add(1));
    }

    pub(crate) fn enable_irq(&self) {
        self.with_irq(|irq| irq.disable_depth = irq.disable_depth.saturating_sub(1));
    }

    /// Takes the pending key work, if any. Whoever gets `true` owns the
    /// interrupt mask the top half took.
    pub(crate) fn take_key_work(&self) -> bool {
        self.with_irq(|irq| core::mem::take(&mut irq.key_work_pending))
    }

    // --- Deferred work ---

    /// Queues `work` unless the same kind is already waiting.
    pub fn post(&self, work: Work) {
        let fresh = self.queued.lock(|queued| {
            let bits = queued.get();
            queued.set(bits | work.bit());
            bits & work.bit() == 0
        });
        if !fresh {
            return;
        }
        if self.work.try_send(work).is_err() {
            self.queued.lock(|queued| queued.set(queued.get() & !work.bit()));
            warn!("touchkey: work queue full, dropping {work:?}");
        }
    }

    /// Worker loop. Executes queued work one item at a time, forever.
    pub async fn run(&self) -> ! {
        loop {
            let work = self.work.receive().await;
            self.process(work).await;
        }
    }

    /// Executes everything queued right now, including work queued while
    /// draining.
    pub async fn run_pending(&self) {
        while let Ok(work) = self.work.try_receive() {
            self.process(work).await;
        }
    }

    /// Executes one work item.
    pub async fn process(&self, work: Work) {
        self.queued.lock(|queued| queued.set(queued.get() & !work.bit()));
        trace!("touchkey: running {work:?}");
        match work {
            Work::KeyEvent => self.handle_key_work().await,
            Work::KeyBacklightOff => self.key_backlight_off().await,
            Work::NotificationOff => self.notification_off().await,
            Work::EffectStep => self.effect_step().await,
            Work::BatteryPoll => self.battery_poll().await,
        }
    }

    // --- Timer service ---

    /// Timer loop. Sleeps until the earliest armed deadline and posts the
    /// work of every expired timer, forever.
    pub async fn run_timers(&self) -> ! {
        loop {
            match self.with_timers(|t| t.next_deadline()) {
                Some(deadline) => {
                    if let Either::First(()) = select(Timer::at(deadline), self.rearm.wait()).await
                    {
                        self.fire_expired(Instant::now());
                    }
                }
                None => self.rearm.wait().await,
            }
        }
    }

    /// Disarms every timer due at `now` and posts its work. Returns how many
    /// fired.
    pub fn fire_expired(&self, now: Instant) -> usize {
        let expired = self.with_timers(|t| t.take_expired(now));
        for id in &expired {
            debug!("touchkey: {id:?} timer expired");
            self.post(Work::from(*id));
        }
        expired.len()
    }

    pub(crate) fn arm_timer(&self, id: TimerId, after_ms: u64) {
        self.with_timers(|t| t.arm(id, Instant::now(), Duration::from_millis(after_ms)));
        self.rearm.signal(());
    }

    pub(crate) fn arm_timer_forever(&self, id: TimerId) {
        self.with_timers(|t| t.arm_forever(id));
        self.rearm.signal(());
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        if self.with_timers(|t| t.cancel(id)) {
            self.rearm.signal(());
        }
    }

    // --- Hardware helpers. Failures are logged and swallowed. ---

    pub(crate) async fn set_backlight(&self, hw: &mut Hardware<I2cType, D, B>, on: bool) {
        let cmd = if on { CMD_BACKLIGHT_ON } else { CMD_BACKLIGHT_OFF };
        match hw.bus.write(&[cmd]).await {
            Ok(()) => self.with_backlight(|b| b.backlight_on = on),
            Err(err) => warn!("touchkey: backlight {} failed: {err:?}", if on { "on" } else { "off" }),
        }
    }

    pub(crate) async fn set_voltage(&self, hw: &mut Hardware<I2cType, D, B>, mv: u32) {
        if let Err(err) = hw.board.set_led_voltage(mv).await {
            warn!("touchkey: cannot set LED rail to {mv} mV: {err:?}");
        }
    }

    pub(crate) async fn set_rail(&self, hw: &mut Hardware<I2cType, D, B>, rail: Rail, on: bool) {
        if let Err(err) = hw.board.set_rail(rail, on).await {
            warn!("touchkey: cannot switch {rail:?} rail: {err:?}");
        }
    }

    pub(crate) async fn apply(&self, hw: &mut Hardware<I2cType, D, B>, cmd: RailCommand) {
        match cmd {
            RailCommand::Voltage(mv) => self.set_voltage(hw, mv).await,
            RailCommand::BacklightOn => self.set_backlight(hw, true).await,
            RailCommand::BacklightOff => self.set_backlight(hw, false).await,
        }
    }

    pub(crate) fn release_wake_lock(&self, hw: &mut Hardware<I2cType, D, B>) {
        if hw.board.wake_lock_held() {
            hw.board.set_wake_lock(false);
        }
    }

    /// Tears the driver down: stops every timer, drops the wake-lock and
    /// invalidates the device handle. Queued work that still runs finds the
    /// device not ready.
    pub async fn shutdown(&self) {
        let mut hw = self.hw.lock().await;
        self.with_timers(|t| t.cancel_all());
        self.rearm.signal(());
        self.with_effect(|e| e.stop());
        self.release_wake_lock(&mut hw);
        hw.bus.handle_mut().invalidate();
        debug!("touchkey: shut down");
    }
}
