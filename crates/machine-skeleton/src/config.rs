//! Configuration for the skeleton machine.

use thiserror::Error;

use crate::schedule::{BURST_LENGTH, VideoDivider};
use crate::timers::TIMER_COUNT;

/// When the CPU takes an interrupt relative to the line being raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptLatency {
    /// Taken at the CPU's next step.
    #[default]
    Immediate,
    /// One more instruction completes before the interrupt is taken.
    OneInstruction,
}

/// A bus write the scripted CPU performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BusWrite {
    /// Video control register; the low two bits select the clock divider.
    VideoControl(u32),
    /// Clears the video frame interrupt.
    VideoAcknowledge,
    /// Loads a timer's reload latch and counter.
    TimerReload { timer: usize, value: u16 },
    /// Clears the timer interrupt bits set in the mask.
    TimerAcknowledge(u8),
    FloppyControl { motor: bool, head_loaded: bool },
    /// Queues the next sound DMA buffer.
    SoundBuffer { start: u32, end: u32 },
}

/// A write issued once the machine has run for `at` crystal ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledWrite {
    pub at: u64,
    pub write: BusWrite,
}

impl ScheduledWrite {
    #[must_use]
    pub const fn new(at: u64, write: BusWrite) -> Self {
        Self { at, write }
    }
}

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("crystal frequency must be non-zero")]
    ZeroCrystal,
    #[error("crystal frequency {0} Hz is not a whole number of 24-tick bursts")]
    PartialBurst(u64),
    #[error("sound threshold must be positive, got {0}")]
    SoundThreshold(i64),
    #[error("timer index {0} out of range (0-3)")]
    TimerIndex(usize),
    #[error("script entry {index} at tick {at} is earlier than the one before it")]
    UnorderedScript { index: usize, at: u64 },
}

/// Configuration for creating a [`Skeleton`](crate::Skeleton).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SkeletonConfig {
    /// Master crystal in Hz.
    pub crystal_hz: u64,
    /// Video divider at power-on.
    pub video_divider: VideoDivider,
    /// Sound DMA ticks batched per worker task.
    pub sound_threshold: i64,
    /// Step sound on a worker thread rather than at access time.
    pub sound_worker: bool,
    pub interrupt_latency: InterruptLatency,
    /// Bus writes for the CPU to perform, ordered by tick.
    pub cpu_script: Vec<ScheduledWrite>,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            crystal_hz: 24_000_000,
            video_divider: VideoDivider::default(),
            sound_threshold: 256,
            sound_worker: true,
            interrupt_latency: InterruptLatency::default(),
            cpu_script: Vec::new(),
        }
    }
}

impl SkeletonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crystal_hz == 0 {
            return Err(ConfigError::ZeroCrystal);
        }
        if self.crystal_hz % BURST_LENGTH as u64 != 0 {
            return Err(ConfigError::PartialBurst(self.crystal_hz));
        }
        if self.sound_threshold <= 0 {
            return Err(ConfigError::SoundThreshold(self.sound_threshold));
        }

        let mut previous = 0;
        for (index, entry) in self.cpu_script.iter().enumerate() {
            if entry.at < previous {
                return Err(ConfigError::UnorderedScript {
                    index,
                    at: entry.at,
                });
            }
            previous = entry.at;
            if let BusWrite::TimerReload { timer, .. } = entry.write {
                if timer >= TIMER_COUNT {
                    return Err(ConfigError::TimerIndex(timer));
                }
            }
        }
        Ok(())
    }
}
