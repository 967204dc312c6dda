//! Four reloading countdown timers.
//!
//! Each timer counts down from its reload value at the timer clock (2 MHz)
//! and raises its interrupt bit when it reaches zero, reloading in the same
//! tick. A timer whose reload value is zero is stopped.
//!
//! Because underflow times are known in advance, the block declares the
//! earliest one as its sequence point and is otherwise advanced in bulk.

use emu_core::{Component, Cycle, Cycles, Observable, Value};

pub const TIMER_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    value: u16,
    reload: u16,
}

impl Counter {
    fn is_running(self) -> bool {
        self.reload != 0
    }

    /// Advances by `ticks`, returning how many times the counter hit zero.
    fn advance(&mut self, ticks: u64) -> u64 {
        if !self.is_running() {
            return 0;
        }
        let until_zero = u64::from(self.value);
        if ticks < until_zero {
            self.value -= ticks as u16;
            return 0;
        }

        let reload = u64::from(self.reload);
        let beyond = ticks - until_zero;
        self.value = (reload - beyond % reload) as u16;
        1 + beyond / reload
    }
}

/// The timer block.
#[derive(Debug, Default)]
pub struct Timers {
    counters: [Counter; TIMER_COUNT],
    irq_status: u8,
    underflows: [u64; TIMER_COUNT],
}

impl Timers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `value` into timer `index`'s latch and counter. Zero stops it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`TIMER_COUNT`].
    pub fn set_reload(&mut self, index: usize, value: u16) {
        self.counters[index] = Counter {
            value,
            reload: value,
        };
    }

    /// Clears the interrupt bits set in `mask`.
    pub fn acknowledge(&mut self, mask: u8) {
        self.irq_status &= !mask;
    }

    /// One bit per timer that has underflowed since it was last acknowledged.
    #[must_use]
    pub fn irq_status(&self) -> u8 {
        self.irq_status
    }

    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.irq_status != 0
    }

    #[must_use]
    pub fn value(&self, index: usize) -> u16 {
        self.counters[index].value
    }

    /// Total underflows of timer `index` since power-on.
    #[must_use]
    pub fn underflows(&self, index: usize) -> u64 {
        self.underflows[index]
    }
}

impl Component for Timers {
    type Scale = Cycle;

    fn run_for(&mut self, duration: Cycles) {
        let ticks = duration.get() as u64;
        for (index, counter) in self.counters.iter_mut().enumerate() {
            let wrapped = counter.advance(ticks);
            if wrapped > 0 {
                self.underflows[index] += wrapped;
                self.irq_status |= 1 << index;
            }
        }
    }

    fn next_sequence_point(&self) -> Option<Cycles> {
        let soonest = self
            .counters
            .iter()
            .filter(|counter| counter.is_running())
            .map(|counter| Cycles::new(i64::from(counter.value)))
            .min()
            .unwrap_or(Cycles::MAX);
        Some(soonest)
    }
}

impl Observable for Timers {
    fn query(&self, path: &str) -> Option<Value> {
        if path == "irq_status" {
            return Some(self.irq_status.into());
        }
        let (field, index) = path.split_once('.')?;
        let index: usize = index.parse().ok().filter(|&i| i < TIMER_COUNT)?;
        match field {
            "value" => Some(self.counters[index].value.into()),
            "reload" => Some(self.counters[index].reload.into()),
            "underflows" => Some(self.underflows[index].into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["irq_status", "value.<n>", "reload.<n>", "underflows.<n>"]
    }
}
