//! Floppy drive mechanism.
//!
//! The drive spins at 300 rpm off an 8 MHz clock and produces one index
//! pulse per revolution. It tells its proxy how urgently it needs time:
//!
//! - motor off: nothing to do, so time may be discarded;
//! - motor on, head unloaded: only the index position matters, clock lazily;
//! - head loaded: data is flowing, clock on every tick.

use emu_core::{ClockingHint, Component, Cycle, Cycles, Observable, Preference, Value};

/// 8 MHz drive ticks per revolution at 300 rpm.
pub const TICKS_PER_REVOLUTION: u64 = 1_600_000;

/// A single drive.
#[derive(Debug)]
pub struct Floppy {
    motor_on: bool,
    head_loaded: bool,
    rotation: u64,
    index_pulses: u64,
    ticks_spun: u64,
    hint: ClockingHint,
}

impl Default for Floppy {
    fn default() -> Self {
        Self::new()
    }
}

impl Floppy {
    /// A drive with the motor off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            motor_on: false,
            head_loaded: false,
            rotation: 0,
            index_pulses: 0,
            ticks_spun: 0,
            hint: ClockingHint::new(Preference::None),
        }
    }

    /// Applies the drive control lines. A loaded head implies a running
    /// motor.
    pub fn set_control(&mut self, motor: bool, head_loaded: bool) {
        self.motor_on = motor || head_loaded;
        self.head_loaded = head_loaded;

        let preference = match (self.motor_on, self.head_loaded) {
            (false, _) => Preference::None,
            (true, false) => Preference::JustInTime,
            (true, true) => Preference::RealTime,
        };
        self.hint.set_preference(preference);
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    #[must_use]
    pub fn head_loaded(&self) -> bool {
        self.head_loaded
    }

    /// Position within the current revolution, in drive ticks.
    #[must_use]
    pub fn rotation(&self) -> u64 {
        self.rotation
    }

    #[must_use]
    pub fn index_pulses(&self) -> u64 {
        self.index_pulses
    }

    /// Drive ticks received while the motor was on.
    #[must_use]
    pub fn ticks_spun(&self) -> u64 {
        self.ticks_spun
    }
}

impl Component for Floppy {
    type Scale = Cycle;

    fn run_for(&mut self, duration: Cycles) {
        if !self.motor_on {
            return;
        }
        let ticks = duration.get() as u64;
        self.ticks_spun += ticks;
        let position = self.rotation + ticks;
        self.index_pulses += position / TICKS_PER_REVOLUTION;
        self.rotation = position % TICKS_PER_REVOLUTION;
    }

    fn clocking_hint(&mut self) -> Option<&mut ClockingHint> {
        Some(&mut self.hint)
    }
}

impl Observable for Floppy {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "motor" => Some(self.motor_on.into()),
            "head_loaded" => Some(self.head_loaded.into()),
            "rotation" => Some(self.rotation.into()),
            "index_pulses" => Some(self.index_pulses.into()),
            "preference" => Some(format!("{:?}", self.hint.current_preference()).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["motor", "head_loaded", "rotation", "index_pulses", "preference"]
    }
}
