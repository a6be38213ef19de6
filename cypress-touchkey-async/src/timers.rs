//! The four logical timers of the backlight and notification scheduler.
//!
//! A [`TimerSet`] only stores deadlines. Sleeping until the earliest one and
//! turning expiries into work items is done by the driver's timer service.

use embassy_time::{Duration, Instant};
use heapless::Vec;

/// Identifies one of the logical timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Key-press backlight auto-off.
    KeyBacklight,
    /// Notification auto-off.
    NotificationTimeout,
    /// Next breathing or blinking step.
    Effect,
    /// Next battery capacity check.
    BatteryPoll,
}

impl TimerId {
    pub const ALL: [TimerId; 4] = [
        TimerId::KeyBacklight,
        TimerId::NotificationTimeout,
        TimerId::Effect,
        TimerId::BatteryPoll,
    ];

    fn index(self) -> usize {
        match self {
            TimerId::KeyBacklight => 0,
            TimerId::NotificationTimeout => 1,
            TimerId::Effect => 2,
            TimerId::BatteryPoll => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogicalTimer {
    armed: bool,
    deadline: Instant,
}

impl LogicalTimer {
    const IDLE: Self = Self {
        armed: false,
        deadline: Instant::MIN,
    };
}

/// Independent one-shot timers. Arming one never touches another, and
/// re-arming replaces the previous deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSet {
    timers: [LogicalTimer; 4],
}

impl TimerSet {
    pub const fn new() -> Self {
        Self {
            timers: [LogicalTimer::IDLE; 4],
        }
    }

    /// Arms `id` to expire `after` from `now`.
    ///
    /// Deadlines past the end of the clock saturate to [`Instant::MAX`].
    pub fn arm(&mut self, id: TimerId, now: Instant, after: Duration) {
        let deadline = now.checked_add(after).unwrap_or(Instant::MAX);
        self.timers[id.index()] = LogicalTimer {
            armed: true,
            deadline,
        };
    }

    /// Arms `id` with a deadline that is never reached in practice.
    pub fn arm_forever(&mut self, id: TimerId) {
        self.timers[id.index()] = LogicalTimer {
            armed: true,
            deadline: Instant::MAX,
        };
    }

    /// Disarms `id`. Returns whether it was armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let timer = &mut self.timers[id.index()];
        let was_armed = timer.armed;
        timer.armed = false;
        was_armed
    }

    pub fn cancel_all(&mut self) {
        self.timers = [LogicalTimer::IDLE; 4];
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers[id.index()].armed
    }

    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        let timer = self.timers[id.index()];
        timer.armed.then_some(timer.deadline)
    }

    /// Armed with a deadline still in the future.
    pub fn pending(&self, id: TimerId, now: Instant) -> bool {
        let timer = self.timers[id.index()];
        timer.armed && timer.deadline > now
    }

    /// The earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .iter()
            .filter(|t| t.armed)
            .map(|t| t.deadline)
            .min()
    }

    /// Disarms and returns every timer whose deadline is at or before `now`,
    /// in [`TimerId::ALL`] order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TimerId, 4> {
        let mut expired = Vec::new();
        for id in TimerId::ALL {
            let timer = &mut self.timers[id.index()];
            if timer.armed && timer.deadline <= now {
                timer.armed = false;
                let _ = expired.push(id);
            }
        }
        expired
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}
