//! A reference machine for the deferred-clocking core.
//!
//! A 24 MHz crystal feeds a scripted CPU and four chips at different integer
//! divisions of it: a video timing generator whose divider can be
//! reprogrammed, a floppy drive that asks to be clocked more or less eagerly,
//! a timer block with known underflow times, and a sound DMA channel stepped
//! on a worker thread. Each chip sits behind a proxy from `emu-core`; the
//! machine only distributes time, in fixed per-burst visitation tables.

pub mod config;
pub mod cpu;
mod error;
pub mod floppy;
mod machine;
pub mod schedule;
pub mod sound;
pub mod timers;
pub mod video;

pub use config::{BusWrite, ConfigError, InterruptLatency, ScheduledWrite, SkeletonConfig};
pub use error::SkeletonError;
pub use machine::Skeleton;
pub use schedule::{BURST_LENGTH, RateChange, VideoDivider};
