//! Raster timing generator with a programmable pixel clock.
//!
//! Counts video ticks (crystal / divider) across a 312-line, 50 Hz frame and
//! latches a frame interrupt each time the beam returns to the top. Pixel
//! generation is not modelled.

use emu_core::{Component, Cycle, Cycles, Observable, Value};
use tracing::debug;

use crate::schedule::{RateChange, VideoDivider};

pub const LINES_PER_FRAME: u64 = 312;
pub const FRAMES_PER_SECOND: u64 = 50;

/// The video timing generator.
#[derive(Debug)]
pub struct Video {
    crystal_hz: u64,
    divider: VideoDivider,
    ticks_per_line: u64,
    line: u64,
    column: u64,
    frames: u64,
    frame_interrupt: bool,
    rate_change: Option<RateChange>,
}

impl Video {
    #[must_use]
    pub fn new(crystal_hz: u64, divider: VideoDivider) -> Self {
        Self {
            crystal_hz,
            divider,
            ticks_per_line: ticks_per_line(crystal_hz, divider),
            line: 0,
            column: 0,
            frames: 0,
            frame_interrupt: false,
            rate_change: None,
        }
    }

    /// Writes the control register. A change of rate bits reprograms the
    /// divider and leaves a [`RateChange`] for the machine to collect.
    pub fn write_control(&mut self, value: u32) {
        let divider = VideoDivider::from_control(value);
        if divider == self.divider {
            return;
        }

        let from = self.rate_change.map_or(self.divider, |pending| pending.from);
        debug!(?from, to = ?divider, "video clock divider changed");
        self.divider = divider;
        self.ticks_per_line = ticks_per_line(self.crystal_hz, divider);
        self.column = self.column.min(self.ticks_per_line - 1);
        // Switching back before the machine collects the change cancels it.
        self.rate_change = (from != divider).then_some(RateChange { from, to: divider });
    }

    /// Collects the pending rate change, if any.
    pub fn take_rate_change(&mut self) -> Option<RateChange> {
        self.rate_change.take()
    }

    pub fn acknowledge(&mut self) {
        self.frame_interrupt = false;
    }

    #[must_use]
    pub fn frame_interrupt(&self) -> bool {
        self.frame_interrupt
    }

    #[must_use]
    pub fn divider(&self) -> VideoDivider {
        self.divider
    }

    #[must_use]
    pub fn ticks_per_line(&self) -> u64 {
        self.ticks_per_line
    }

    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u64 {
        self.column
    }

    /// Frames completed since power-on.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn ticks_per_frame(&self) -> u64 {
        self.ticks_per_line * LINES_PER_FRAME
    }

    fn frame_position(&self) -> u64 {
        self.line * self.ticks_per_line + self.column
    }
}

fn ticks_per_line(crystal_hz: u64, divider: VideoDivider) -> u64 {
    (crystal_hz / (u64::from(divider.divisor()) * LINES_PER_FRAME * FRAMES_PER_SECOND)).max(1)
}

impl Component for Video {
    type Scale = Cycle;

    fn run_for(&mut self, duration: Cycles) {
        let position = self.frame_position() + duration.get() as u64;
        let frame_length = self.ticks_per_frame();
        let completed = position / frame_length;
        if completed > 0 {
            self.frames += completed;
            self.frame_interrupt = true;
        }

        let position = position % frame_length;
        self.line = position / self.ticks_per_line;
        self.column = position % self.ticks_per_line;
    }

    fn next_sequence_point(&self) -> Option<Cycles> {
        Some(Cycles::new(
            (self.ticks_per_frame() - self.frame_position()) as i64,
        ))
    }
}

impl Observable for Video {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "line" => Some(self.line.into()),
            "column" => Some(self.column.into()),
            "frames" => Some(self.frames.into()),
            "divider" => Some(self.divider.divisor().into()),
            "frame_interrupt" => Some(self.frame_interrupt.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["line", "column", "frames", "divider", "frame_interrupt"]
    }
}
