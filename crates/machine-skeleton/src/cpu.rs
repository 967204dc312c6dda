//! A bus master that replays a script of writes.
//!
//! Stands in for a real instruction set: each step is one instruction, which
//! either performs the next due scripted write or does nothing. Interrupts
//! are taken on the rising edge of the interrupt line and recorded.

use std::collections::VecDeque;

use crate::config::{BusWrite, InterruptLatency, ScheduledWrite};

/// An interrupt the CPU has taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakenInterrupt {
    /// Crystal tick at which the line was raised.
    pub raised_at: u64,
    /// Crystal tick at which the CPU entered the handler.
    pub taken_at: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingInterrupt {
    raised_at: u64,
    instructions_left: u32,
}

#[derive(Debug)]
pub struct ScriptedCpu {
    script: VecDeque<ScheduledWrite>,
    latency: InterruptLatency,
    line: bool,
    pending: Option<PendingInterrupt>,
    taken: Vec<TakenInterrupt>,
    instructions: u64,
}

impl ScriptedCpu {
    #[must_use]
    pub fn new(script: Vec<ScheduledWrite>, latency: InterruptLatency) -> Self {
        Self {
            script: script.into(),
            latency,
            line: false,
            pending: None,
            taken: Vec::new(),
            instructions: 0,
        }
    }

    /// Updates the interrupt input as of crystal tick `now`.
    pub fn set_interrupt_line(&mut self, level: bool, now: u64) {
        if level && !self.line {
            let instructions_left = match self.latency {
                InterruptLatency::Immediate => 0,
                InterruptLatency::OneInstruction => 1,
            };
            self.pending = Some(PendingInterrupt {
                raised_at: now,
                instructions_left,
            });
        } else if !level {
            self.pending = None;
        }
        self.line = level;
    }

    /// Executes one step at crystal tick `now`, returning the bus write it
    /// performed, if any.
    pub fn step(&mut self, now: u64) -> Option<BusWrite> {
        if let Some(pending) = &mut self.pending {
            if pending.instructions_left == 0 {
                self.taken.push(TakenInterrupt {
                    raised_at: pending.raised_at,
                    taken_at: now,
                });
                self.pending = None;
                return None;
            }
            pending.instructions_left -= 1;
        }

        self.instructions += 1;
        if self.script.front().is_some_and(|entry| entry.at <= now) {
            self.script.pop_front().map(|entry| entry.write)
        } else {
            None
        }
    }

    #[must_use]
    pub fn interrupt_line(&self) -> bool {
        self.line
    }

    #[must_use]
    pub fn taken_interrupts(&self) -> &[TakenInterrupt] {
        &self.taken
    }

    /// Instructions executed, not counting interrupt entry.
    #[must_use]
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Scripted writes not yet performed.
    #[must_use]
    pub fn remaining_script(&self) -> usize {
        self.script.len()
    }
}
