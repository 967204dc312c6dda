//! The machine: one CPU, four deferred chips and the burst schedule.

use emu_core::{
    Access, AsyncJustInTime, Cycle, Cycles, JustInTime, MasterClock, Observable,
    ScaledConversion, TaskQueue, Value,
};
use parking_lot::MutexGuard;
use tracing::debug;

use crate::config::{BusWrite, SkeletonConfig};
use crate::cpu::ScriptedCpu;
use crate::error::SkeletonError;
use crate::floppy::Floppy;
use crate::schedule::{BURST_LENGTH, RateChange, VideoDivider, Visits};
use crate::sound::Sound;
use crate::timers::Timers;
use crate::video::{FRAMES_PER_SECOND, Video};

type Deferred<C> = JustInTime<C, Cycle>;

const ONE: Cycles = Cycles::new(1);

/// The skeleton machine.
pub struct Skeleton {
    clock: MasterClock,
    cpu: ScriptedCpu,
    video: Deferred<Video>,
    floppy: Deferred<Floppy>,
    timers: Deferred<Timers>,
    sound: AsyncJustInTime<Sound, Cycle>,
    divider: VideoDivider,
    bursts_owed: ScaledConversion<Cycle, Cycle>,
    ticks: u64,
    bursts: u64,
    rate_changes: Vec<RateChange>,
}

impl Skeleton {
    pub fn new(config: &SkeletonConfig) -> Result<Self, SkeletonError> {
        config.validate()?;

        let sound_threshold = Cycles::new(config.sound_threshold);
        let sound = if config.sound_worker {
            AsyncJustInTime::with_worker(sound_threshold, Sound::new(), "skeleton-sound")?
        } else {
            AsyncJustInTime::new(sound_threshold, Sound::new(), TaskQueue::manual())
        };

        let clock = MasterClock::new(config.crystal_hz);
        debug!(
            crystal_hz = config.crystal_hz,
            bursts_per_second = clock.bursts_per_second(BURST_LENGTH as u64),
            divider = ?config.video_divider,
            sound_worker = config.sound_worker,
            "skeleton machine created"
        );

        Ok(Self {
            clock,
            cpu: ScriptedCpu::new(config.cpu_script.clone(), config.interrupt_latency),
            video: JustInTime::new(Video::new(config.crystal_hz, config.video_divider)),
            floppy: JustInTime::new(Floppy::new()),
            timers: JustInTime::new(Timers::new()),
            sound,
            divider: config.video_divider,
            bursts_owed: ScaledConversion::new(1, BURST_LENGTH as i64),
            ticks: 0,
            bursts: 0,
            rate_changes: Vec::new(),
        })
    }

    /// Runs one burst of [`BURST_LENGTH`] crystal ticks.
    ///
    /// The visitation table is chosen once, up front; a divider change made
    /// during the burst takes effect from the next one.
    pub fn run_burst(&mut self) {
        for &visits in self.divider.table() {
            self.visit(visits);
            self.ticks += 1;
        }
        self.bursts += 1;

        if let Some(change) = self.video.peek_mut().take_rate_change() {
            debug!(
                from = ?change.from,
                to = ?change.to,
                burst = self.bursts,
                "switching visitation table"
            );
            self.divider = change.to;
            self.rate_changes.push(change);
        }
    }

    /// Runs for `duration` crystal ticks. Time short of a whole burst is
    /// carried to the next call.
    pub fn run_for(&mut self, duration: Cycles) {
        let bursts = self.bursts_owed.convert(duration);
        for _ in 0..bursts.get() {
            self.run_burst();
        }
    }

    /// Runs one 50 Hz frame's worth of crystal ticks.
    pub fn run_frame(&mut self) {
        self.run_for(self.clock.cycles_per_frame(FRAMES_PER_SECOND));
    }

    /// Brings every chip up to date.
    pub fn flush(&mut self) {
        self.video.flush();
        self.floppy.flush();
        self.timers.flush();
        self.sound.flush();
    }

    fn visit(&mut self, visits: Visits) {
        if visits.contains(Visits::CPU) {
            if let Some(write) = self.cpu.step(self.ticks) {
                self.perform(write);
            }
        }
        if visits.contains(Visits::VIDEO) && self.video.add(ONE) {
            self.update_interrupts();
        }
        if visits.contains(Visits::FLOPPY) {
            self.floppy.add(ONE);
        }
        if visits.contains(Visits::TIMERS) && self.timers.add(ONE) {
            self.update_interrupts();
        }
        if visits.contains(Visits::SOUND) {
            self.sound.add(ONE);
        }
    }

    fn perform(&mut self, write: BusWrite) {
        match write {
            BusWrite::VideoControl(value) => self.video.access().write_control(value),
            BusWrite::VideoAcknowledge => self.video.access().acknowledge(),
            BusWrite::TimerReload { timer, value } => {
                self.timers.access().set_reload(timer, value);
            }
            BusWrite::TimerAcknowledge(mask) => self.timers.access().acknowledge(mask),
            BusWrite::FloppyControl { motor, head_loaded } => {
                self.floppy.access().set_control(motor, head_loaded);
            }
            BusWrite::SoundBuffer { start, end } => self.sound.access().queue_buffer(start, end),
        }
        self.update_interrupts();
    }

    /// Interrupt sources only change at a flush, so the last-flushed state is
    /// current here.
    fn update_interrupts(&mut self) {
        let level = self.video.peek().frame_interrupt() || self.timers.peek().irq_active();
        self.cpu.set_interrupt_line(level, self.ticks);
    }

    #[must_use]
    pub fn cpu(&self) -> &ScriptedCpu {
        &self.cpu
    }

    pub fn video(&mut self) -> Access<'_, Video, Cycle, 1, 1> {
        self.video.access()
    }

    pub fn floppy(&mut self) -> Access<'_, Floppy, Cycle, 1, 1> {
        self.floppy.access()
    }

    pub fn timers(&mut self) -> Access<'_, Timers, Cycle, 1, 1> {
        self.timers.access()
    }

    /// Waits for queued sound work and returns the channel.
    pub fn sound(&mut self) -> MutexGuard<'_, Sound> {
        self.sound.access()
    }

    /// The video divider the current table is built for.
    #[must_use]
    pub fn divider(&self) -> VideoDivider {
        self.divider
    }

    /// Crystal ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    /// Rate changes applied so far, oldest first.
    #[must_use]
    pub fn rate_changes(&self) -> &[RateChange] {
        &self.rate_changes
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        self.clock
    }
}

impl Observable for Skeleton {
    /// Chip paths are `<chip>.<field>`. Proxy fields (`time_owed`, `flushed`,
    /// ...) are tried first, then the chip's own state as of its last flush.
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "ticks" => return Some(self.ticks.into()),
            "bursts" => return Some(self.bursts.into()),
            "divider" => return Some(self.divider.divisor().into()),
            "cpu.interrupt_line" => return Some(self.cpu.interrupt_line().into()),
            "cpu.instructions" => return Some(self.cpu.instructions().into()),
            _ => {}
        }

        let (chip, field) = path.split_once('.')?;
        match chip {
            "video" => self
                .video
                .query(field)
                .or_else(|| self.video.peek().query(field)),
            "floppy" => self
                .floppy
                .query(field)
                .or_else(|| self.floppy.peek().query(field)),
            "timers" => self
                .timers
                .query(field)
                .or_else(|| self.timers.peek().query(field)),
            "sound" => self
                .sound
                .query(field)
                .or_else(|| self.sound.peek().query(field)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "ticks",
            "bursts",
            "divider",
            "cpu.interrupt_line",
            "cpu.instructions",
            "video.<field>",
            "floppy.<field>",
            "timers.<field>",
            "sound.<field>",
        ]
    }
}
