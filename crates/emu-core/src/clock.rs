//! Master clock configuration.

use crate::Cycles;

/// The driving clock of a machine.
///
/// Each machine has a master crystal from which every component's rate is
/// derived by integer division. Time handed to proxies is counted in cycles
/// of this crystal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Crystal frequency in Hz (e.g., `24_000_000`).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Crystal cycles per frame at the given frame rate (integer division).
    #[must_use]
    pub const fn cycles_per_frame(&self, frames_per_second: u64) -> Cycles {
        Cycles::new((self.frequency_hz / frames_per_second) as i64)
    }

    /// Whole bursts of `burst_length` crystal cycles per second.
    #[must_use]
    pub const fn bursts_per_second(&self, burst_length: u64) -> u64 {
        self.frequency_hz / burst_length
    }
}
