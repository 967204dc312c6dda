//! Fixed visitation tables for one scheduling burst.
//!
//! A burst is 24 crystal ticks. The CPU is visited on every tick; the other
//! chips run at integer divisions of the crystal and are visited at fixed
//! offsets within the burst:
//!
//! | Chip   | Rate (24 MHz crystal) | Offsets            |
//! |--------|-----------------------|--------------------|
//! | Video  | crystal / divider     | multiples of divider |
//! | Floppy | 8 MHz                 | multiples of 3     |
//! | Timers | 2 MHz                 | 0 and 12           |
//! | Sound  | 1 MHz                 | 0                  |
//!
//! Within an offset the order is always CPU, video, floppy, timers, sound,
//! so a chip sees the CPU's bus activity from the same tick.

use std::fmt;

/// Crystal ticks per burst.
pub const BURST_LENGTH: usize = 24;

/// Set of chips visited at one offset of a burst.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Visits(u8);

impl Visits {
    pub const CPU: Self = Self(1 << 0);
    pub const VIDEO: Self = Self(1 << 1);
    pub const FLOPPY: Self = Self(1 << 2);
    pub const TIMERS: Self = Self(1 << 3);
    pub const SOUND: Self = Self(1 << 4);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Debug for Visits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::CPU, "cpu"),
            (Self::VIDEO, "video"),
            (Self::FLOPPY, "floppy"),
            (Self::TIMERS, "timers"),
            (Self::SOUND, "sound"),
        ];
        f.debug_set()
            .entries(
                names
                    .iter()
                    .filter(|(visit, _)| self.contains(*visit))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}

/// One burst's worth of visits, indexed by crystal offset.
pub type Table = [Visits; BURST_LENGTH];

const fn build_table(divider: usize) -> Table {
    let mut table = [Visits(0); BURST_LENGTH];
    let mut offset = 0;
    while offset < BURST_LENGTH {
        let mut visits = Visits::CPU;
        if offset % divider == 0 {
            visits = visits.union(Visits::VIDEO);
        }
        if offset % 3 == 0 {
            visits = visits.union(Visits::FLOPPY);
        }
        if offset % 12 == 0 {
            visits = visits.union(Visits::TIMERS);
        }
        if offset == 0 {
            visits = visits.union(Visits::SOUND);
        }
        table[offset] = visits;
        offset += 1;
    }
    table
}

static DIVIDE_BY_TWO: Table = build_table(2);
static DIVIDE_BY_THREE: Table = build_table(3);
static DIVIDE_BY_FOUR: Table = build_table(4);
static DIVIDE_BY_SIX: Table = build_table(6);

/// Crystal divider feeding the video pixel counter.
///
/// Only dividers of the burst length are representable, so every case has a
/// whole number of video ticks per burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VideoDivider {
    /// 12 MHz video clock.
    Two,
    /// 8 MHz video clock.
    #[default]
    Three,
    /// 6 MHz video clock.
    Four,
    /// 4 MHz video clock.
    Six,
}

impl VideoDivider {
    /// Decodes the two rate bits of the video control register.
    #[must_use]
    pub const fn from_control(value: u32) -> Self {
        match value & 0b11 {
            0b00 => Self::Six,
            0b01 => Self::Four,
            0b10 => Self::Three,
            _ => Self::Two,
        }
    }

    #[must_use]
    pub const fn control_bits(self) -> u32 {
        match self {
            Self::Six => 0b00,
            Self::Four => 0b01,
            Self::Three => 0b10,
            Self::Two => 0b11,
        }
    }

    #[must_use]
    pub const fn divisor(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Six => 6,
        }
    }

    /// Visitation table for a burst run at this divider.
    #[must_use]
    pub fn table(self) -> &'static Table {
        match self {
            Self::Two => &DIVIDE_BY_TWO,
            Self::Three => &DIVIDE_BY_THREE,
            Self::Four => &DIVIDE_BY_FOUR,
            Self::Six => &DIVIDE_BY_SIX,
        }
    }

    #[must_use]
    pub const fn video_ticks_per_burst(self) -> u32 {
        BURST_LENGTH as u32 / self.divisor()
    }
}

/// Notification that the video clock divider was reprogrammed.
///
/// Raised by the video chip and consumed by the machine at the end of the
/// burst in which it happened; the next burst uses the new table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateChange {
    pub from: VideoDivider,
    pub to: VideoDivider,
}
