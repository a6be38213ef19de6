//! Breathing and blinking animations of the LED rail.
//!
//! The generator is pure: each [`EffectGenerator::step`] returns the rail
//! commands to apply and the delay until the next step. The driver applies
//! the commands under the hardware lock and re-arms the effect timer.

use heapless::Vec;

use crate::defs::{
    BLINKING_OFF_MS, BLINKING_ON_MS, BREATHING_MAX_MV, BREATHING_MIN_MV, BREATHING_PAUSE_MS,
    BREATHING_STEP_MS, BREATHING_STEP_MV, LED_MAX_MV, NOTIFICATION_MV,
};

/// Voltage ramp parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreathingConfig {
    pub min_mv: u32,
    pub max_mv: u32,
    pub step_mv: u32,
    pub step_interval_ms: u32,
    pub pause_ms: u32,
}

impl BreathingConfig {
    /// All fields positive, `min_mv < max_mv` and the peak within
    /// [`LED_MAX_MV`].
    pub fn is_valid(&self) -> bool {
        self.min_mv > 0
            && self.max_mv > 0
            && self.step_mv > 0
            && self.step_interval_ms > 0
            && self.pause_ms > 0
            && self.min_mv < self.max_mv
            && self.max_mv <= LED_MAX_MV
    }
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            min_mv: BREATHING_MIN_MV,
            max_mv: BREATHING_MAX_MV,
            step_mv: BREATHING_STEP_MV,
            step_interval_ms: BREATHING_STEP_MS,
            pause_ms: BREATHING_PAUSE_MS,
        }
    }
}

/// On/off durations of the blink animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkConfig {
    pub on_ms: u32,
    pub off_ms: u32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            on_ms: BLINKING_ON_MS,
            off_ms: BLINKING_OFF_MS,
        }
    }
}

/// Which animation, if any, runs while a notification is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectMode {
    /// Steady notification voltage.
    #[default]
    Off,
    Breathing,
    Blinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectPhase {
    #[default]
    Idle,
    BreathingRising,
    BreathingFalling,
    BreathingPause,
    BlinkOn,
    BlinkOff,
}

impl EffectPhase {
    pub fn is_breathing(self) -> bool {
        matches!(
            self,
            EffectPhase::BreathingRising | EffectPhase::BreathingFalling | EffectPhase::BreathingPause
        )
    }

    pub fn is_blinking(self) -> bool {
        matches!(self, EffectPhase::BlinkOn | EffectPhase::BlinkOff)
    }
}

/// A single change to the LED output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RailCommand {
    /// Program the LED rail to this many millivolts.
    Voltage(u32),
    /// Chip command: backlight on.
    BacklightOn,
    /// Chip command: backlight off.
    BacklightOff,
}

/// Output of one generator step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectStep {
    pub commands: Vec<RailCommand, 2>,
    /// Delay until the next step, in milliseconds.
    pub next_ms: u32,
}

/// Breathing/blinking state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectGenerator {
    mode: EffectMode,
    phase: EffectPhase,
    breathing: BreathingConfig,
    blink: BlinkConfig,
    voltage_mv: u32,
}

impl EffectGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> EffectMode {
        self.mode
    }

    pub fn phase(&self) -> EffectPhase {
        self.phase
    }

    pub fn breathing(&self) -> BreathingConfig {
        self.breathing
    }

    pub fn blink(&self) -> BlinkConfig {
        self.blink
    }

    /// An animation is configured.
    pub fn is_configured(&self) -> bool {
        self.mode != EffectMode::Off
    }

    /// Selects the animation. Selecting one mode always clears the other.
    /// A change of mode parks the generator until the next
    /// [`reset`](Self::reset); reselecting the running mode keeps it going.
    pub fn set_mode(&mut self, mode: EffectMode) {
        if self.mode != mode {
            self.mode = mode;
            self.phase = EffectPhase::Idle;
        }
    }

    pub fn set_breathing(&mut self, config: BreathingConfig) {
        self.breathing = config;
    }

    pub fn set_blink(&mut self, config: BlinkConfig) {
        self.blink = config;
    }

    /// Returns the generator to the start of its animation.
    ///
    /// Breathing restarts rising from `min_mv`, blinking restarts with the
    /// on phase. Returns the rail voltage to apply right away, if any.
    pub fn reset(&mut self) -> Option<RailCommand> {
        self.voltage_mv = self.breathing.min_mv;
        match self.mode {
            EffectMode::Off => {
                self.phase = EffectPhase::Idle;
                None
            }
            EffectMode::Breathing => {
                self.phase = EffectPhase::BreathingRising;
                Some(RailCommand::Voltage(self.breathing.min_mv))
            }
            EffectMode::Blinking => {
                self.phase = EffectPhase::BlinkOn;
                Some(RailCommand::Voltage(NOTIFICATION_MV))
            }
        }
    }

    /// Advances one step. `None` when no animation is running.
    pub fn step(&mut self) -> Option<EffectStep> {
        let mut commands = Vec::new();
        let next_ms = match self.phase {
            EffectPhase::Idle => return None,
            EffectPhase::BreathingRising | EffectPhase::BreathingPause => {
                let _ = commands.push(RailCommand::Voltage(self.voltage_mv));
                self.voltage_mv = self.voltage_mv.saturating_add(self.breathing.step_mv);
                if self.voltage_mv >= self.breathing.max_mv {
                    self.voltage_mv = self.breathing.max_mv;
                    self.phase = EffectPhase::BreathingFalling;
                } else {
                    self.phase = EffectPhase::BreathingRising;
                }
                self.breathing.step_interval_ms
            }
            EffectPhase::BreathingFalling => {
                let _ = commands.push(RailCommand::Voltage(self.voltage_mv));
                self.voltage_mv = self.voltage_mv.saturating_sub(self.breathing.step_mv);
                if self.voltage_mv <= self.breathing.min_mv {
                    self.voltage_mv = self.breathing.min_mv;
                    let _ = commands.push(RailCommand::Voltage(self.breathing.min_mv));
                    self.phase = EffectPhase::BreathingPause;
                    self.breathing.pause_ms
                } else {
                    self.breathing.step_interval_ms
                }
            }
            EffectPhase::BlinkOn => {
                let _ = commands.push(RailCommand::BacklightOn);
                self.phase = EffectPhase::BlinkOff;
                self.blink.on_ms
            }
            EffectPhase::BlinkOff => {
                let _ = commands.push(RailCommand::BacklightOff);
                self.phase = EffectPhase::BlinkOn;
                self.blink.off_ms
            }
        };
        Some(EffectStep { commands, next_ms })
    }

    /// Parks the generator without changing the mode.
    pub fn stop(&mut self) {
        self.phase = EffectPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec as StdVec;

    fn voltages(step: &EffectStep) -> impl Iterator<Item = u32> + '_ {
        step.commands.iter().filter_map(|c| match c {
            RailCommand::Voltage(mv) => Some(*mv),
            _ => None,
        })
    }

    #[test]
    fn breathing_cycle_ramps_up_down_then_pauses() {
        let mut effect = EffectGenerator::new();
        effect.set_mode(EffectMode::Breathing);
        assert_eq!(effect.reset(), Some(RailCommand::Voltage(2500)));

        let mut shown = StdVec::new();
        let mut delays = StdVec::new();
        loop {
            let step = effect.step().unwrap();
            shown.extend(voltages(&step));
            delays.push(step.next_ms);
            if effect.phase() == EffectPhase::BreathingPause {
                break;
            }
        }

        let rising: StdVec<u32> = (2500..=3250).step_by(50).collect();
        let falling: StdVec<u32> = (2550..=3300).rev().step_by(50).collect();
        let mut expected = rising;
        expected.extend(falling);
        expected.push(2500);
        assert_eq!(shown, expected);

        assert_eq!(delays.last(), Some(&700));
        assert!(delays[..delays.len() - 1].iter().all(|d| *d == 100));
        assert!(shown.iter().all(|mv| (2500..=3300).contains(mv)));

        // After the pause the ramp restarts from the floor.
        let step = effect.step().unwrap();
        assert_eq!(voltages(&step).collect::<StdVec<_>>(), [2500]);
        assert_eq!(step.next_ms, 100);
        assert_eq!(effect.phase(), EffectPhase::BreathingRising);
    }

    #[test]
    fn uneven_steps_clamp_to_the_bounds() {
        let mut effect = EffectGenerator::new();
        effect.set_breathing(BreathingConfig {
            min_mv: 2500,
            max_mv: 2600,
            step_mv: 70,
            step_interval_ms: 20,
            pause_ms: 50,
        });
        effect.set_mode(EffectMode::Breathing);
        effect.reset();

        for _ in 0..40 {
            let step = effect.step().unwrap();
            assert!(voltages(&step).all(|mv| (2500..=2600).contains(&mv)));
        }
    }

    #[test]
    fn blink_alternates_on_and_off() {
        let mut effect = EffectGenerator::new();
        effect.set_blink(BlinkConfig {
            on_ms: 200,
            off_ms: 800,
        });
        effect.set_mode(EffectMode::Blinking);
        assert_eq!(effect.reset(), Some(RailCommand::Voltage(NOTIFICATION_MV)));

        let on = effect.step().unwrap();
        assert_eq!(on.commands.as_slice(), &[RailCommand::BacklightOn]);
        assert_eq!(on.next_ms, 200);
        let off = effect.step().unwrap();
        assert_eq!(off.commands.as_slice(), &[RailCommand::BacklightOff]);
        assert_eq!(off.next_ms, 800);
        assert_eq!(effect.phase(), EffectPhase::BlinkOn);
    }

    #[test]
    fn selecting_a_mode_clears_the_other() {
        let mut effect = EffectGenerator::new();
        effect.set_mode(EffectMode::Blinking);
        effect.reset();
        assert!(effect.phase().is_blinking());

        effect.set_mode(EffectMode::Breathing);
        assert_eq!(effect.mode(), EffectMode::Breathing);
        assert!(!effect.phase().is_blinking());
        effect.reset();
        assert!(effect.phase().is_breathing());
        assert!(!effect.phase().is_blinking());

        effect.set_mode(EffectMode::Off);
        assert_eq!(effect.reset(), None);
        assert_eq!(effect.step(), None);
    }

    #[test]
    fn reselecting_the_running_mode_keeps_its_phase() {
        let mut effect = EffectGenerator::new();
        effect.set_mode(EffectMode::Blinking);
        effect.reset();
        effect.step();
        assert_eq!(effect.phase(), EffectPhase::BlinkOff);

        effect.set_mode(EffectMode::Blinking);
        assert_eq!(effect.phase(), EffectPhase::BlinkOff);
    }

    #[test]
    fn config_validation() {
        assert!(BreathingConfig::default().is_valid());
        let mut config = BreathingConfig::default();
        config.max_mv = config.min_mv;
        assert!(!config.is_valid());
        config.max_mv = LED_MAX_MV + 1;
        assert!(!config.is_valid());
        config.max_mv = 3300;
        config.step_mv = 0;
        assert!(!config.is_valid());
    }
}
