//! Double-buffered sound DMA.
//!
//! The channel walks a buffer one byte per sound tick. At the end of a buffer
//! it swaps to the queued one, or halts if none is queued. The "next buffer
//! empty" condition is the sound interrupt.

use emu_core::{Component, Cycle, Cycles, Observable, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Buffer {
    start: u32,
    end: u32,
}

/// The sound DMA channel.
#[derive(Debug)]
pub struct Sound {
    current: Buffer,
    next: Buffer,
    next_valid: bool,
    halted: bool,
    bytes_fetched: u64,
    buffers_completed: u64,
}

impl Default for Sound {
    fn default() -> Self {
        Self::new()
    }
}

impl Sound {
    /// A halted channel with no buffer queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Buffer::default(),
            next: Buffer::default(),
            next_valid: false,
            halted: true,
            bytes_fetched: 0,
            buffers_completed: 0,
        }
    }

    /// Queues the buffer `start..end`. A halted channel starts on it at once.
    pub fn queue_buffer(&mut self, start: u32, end: u32) {
        self.next = Buffer { start, end };
        self.next_valid = true;
        if self.halted {
            self.swap();
        }
    }

    /// Set while no next buffer is queued.
    #[must_use]
    pub fn interrupt(&self) -> bool {
        !self.next_valid
    }

    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Address of the next byte to fetch.
    #[must_use]
    pub fn address(&self) -> u32 {
        self.current.start
    }

    #[must_use]
    pub fn bytes_fetched(&self) -> u64 {
        self.bytes_fetched
    }

    #[must_use]
    pub fn buffers_completed(&self) -> u64 {
        self.buffers_completed
    }

    fn swap(&mut self) {
        self.current = self.next;
        self.next_valid = false;
        self.halted = self.current.start >= self.current.end;
    }
}

impl Component for Sound {
    type Scale = Cycle;

    fn run_for(&mut self, duration: Cycles) {
        let mut ticks = duration.get() as u64;
        while ticks > 0 && !self.halted {
            let remaining = u64::from(self.current.end - self.current.start);
            let step = ticks.min(remaining);
            self.current.start += step as u32;
            self.bytes_fetched += step;
            ticks -= step;

            if self.current.start == self.current.end {
                self.buffers_completed += 1;
                if self.next_valid {
                    self.swap();
                } else {
                    self.halted = true;
                }
            }
        }
    }
}

impl Observable for Sound {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "address" => Some(self.current.start.into()),
            "halted" => Some(self.halted.into()),
            "interrupt" => Some(self.interrupt().into()),
            "bytes_fetched" => Some(self.bytes_fetched.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["address", "halted", "interrupt", "bytes_fetched"]
    }
}
