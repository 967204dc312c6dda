//! Lazy time distribution for multi-chip emulation.
//!
//! A machine advances by telling each chip how much time has passed. Most
//! chips don't need to act on that immediately, so each one sits behind a
//! proxy that accumulates owed time and only runs the chip when its state is
//! observed, when it reaches a point it has declared interesting, or when it
//! has asked to be clocked eagerly.
//!
//! Time is counted in typed [`Quantum`]s. Everything derives from the master
//! crystal; each chip's own rate is an integer division of it.

mod async_just_in_time;
mod clock;
mod clocking_hint;
mod component;
mod error;
mod just_in_time;
mod observable;
mod quantum;
mod task_queue;

pub use async_just_in_time::AsyncJustInTime;
pub use clock::MasterClock;
pub use clocking_hint::{ClockingHint, ClockingHintObserver, Preference, PreferenceLatch};
pub use component::Component;
pub use error::TaskQueueError;
pub use just_in_time::{Access, JustInTime};
pub use observable::{Observable, Value};
pub use quantum::{
    ConvertsTo, Cycle, Cycles, Granularity, HalfCycle, HalfCycles, Quantum, ScaledConversion,
};
pub use task_queue::TaskQueue;
