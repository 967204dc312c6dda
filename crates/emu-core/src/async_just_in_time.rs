//! Deferred clocking on a worker thread.
//!
//! [`AsyncJustInTime`] trades the fine-grained control of
//! [`JustInTime`](crate::JustInTime) for throughput: each time a full
//! threshold of owed time has built up, a `run_for(threshold)` is queued on a
//! [`TaskQueue`] and the caller moves on. Access drains the queue before
//! applying whatever time is left, so the component is exactly current
//! whenever it is observed.
//!
//! There are no sequence points here; they need synchronous flushing.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    Component, ConvertsTo, Granularity, HalfCycle, Observable, Quantum, TaskQueue,
    TaskQueueError, Value,
};

/// A component whose bulk work happens on a [`TaskQueue`].
pub struct AsyncJustInTime<C: Component, L: Granularity = HalfCycle> {
    component: Arc<Mutex<C>>,
    time_owed: Quantum<L>,
    threshold: Quantum<L>,
    /// Time handed off but not yet a whole unit of `C::Scale`.
    undelivered: Quantum<L>,
    is_flushed: bool,
    task_queue: TaskQueue,
}

impl<C, L> AsyncJustInTime<C, L>
where
    C: Component + Send + 'static,
    L: ConvertsTo<C::Scale>,
{
    /// Wraps `component`, queueing work on `task_queue` every `threshold` of
    /// owed time.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is not positive.
    #[must_use]
    pub fn new(threshold: Quantum<L>, component: C, task_queue: TaskQueue) -> Self {
        assert!(threshold.is_positive(), "threshold must be positive");
        Self {
            component: Arc::new(Mutex::new(component)),
            time_owed: Quantum::ZERO,
            threshold,
            undelivered: Quantum::ZERO,
            is_flushed: true,
            task_queue,
        }
    }

    /// As [`new`](Self::new), with a dedicated worker thread called `name`.
    pub fn with_worker(
        threshold: Quantum<L>,
        component: C,
        name: &str,
    ) -> Result<Self, TaskQueueError> {
        Ok(Self::new(threshold, component, TaskQueue::with_worker(name)?))
    }

    /// Adds time, queueing one `run_for` per whole threshold now owed.
    pub fn add(&mut self, duration: Quantum<L>) {
        debug_assert!(duration >= Quantum::ZERO, "negative duration {duration:?}");
        self.time_owed += duration;
        while self.time_owed >= self.threshold {
            self.time_owed -= self.threshold;
            self.undelivered += self.threshold;
            let step = self.undelivered.flush::<C::Scale>();
            let component = Arc::clone(&self.component);
            self.task_queue
                .enqueue(move || component.lock().run_for(step));
        }
        self.is_flushed = false;
    }

    /// Waits for queued work, applies the remaining owed time, and returns
    /// the component.
    pub fn access(&mut self) -> MutexGuard<'_, C> {
        self.flush();
        self.component.lock()
    }

    /// The component without applying owed time.
    ///
    /// Blocks while a queued step is running on the worker.
    pub fn peek(&self) -> MutexGuard<'_, C> {
        self.component.lock()
    }

    /// Drains the queue, then applies the remaining owed time on the calling
    /// thread.
    pub fn flush(&mut self) {
        if self.is_flushed {
            return;
        }
        self.task_queue.flush();

        self.undelivered += self.time_owed;
        self.time_owed = Quantum::ZERO;
        let remaining = self.undelivered.flush::<C::Scale>();
        if !remaining.is_zero() {
            self.component.lock().run_for(remaining);
        }
        self.is_flushed = true;
    }

    /// Time owed but not yet queued.
    #[must_use]
    pub fn time_owed(&self) -> Quantum<L> {
        self.time_owed
    }

    #[must_use]
    pub fn threshold(&self) -> Quantum<L> {
        self.threshold
    }

    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.is_flushed
    }

    /// The queue this proxy schedules onto.
    #[must_use]
    pub fn task_queue(&self) -> &TaskQueue {
        &self.task_queue
    }
}

impl<C, L> Observable for AsyncJustInTime<C, L>
where
    C: Component + Send + 'static,
    L: ConvertsTo<C::Scale>,
{
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "time_owed" => Some(self.time_owed.into()),
            "threshold" => Some(self.threshold.into()),
            "flushed" => Some(self.is_flushed.into()),
            "queued" => Some((self.task_queue.pending() as u64).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["time_owed", "threshold", "flushed", "queued"]
    }
}

impl<C: Component, L: Granularity> Drop for AsyncJustInTime<C, L> {
    fn drop(&mut self) {
        // Queued steps must finish before the worker is joined.
        self.task_queue.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cycle, Cycles, HalfCycles};

    #[derive(Default)]
    struct Recorder {
        runs: Vec<i64>,
        threads: Vec<std::thread::ThreadId>,
    }

    impl Component for Recorder {
        type Scale = Cycle;

        fn run_for(&mut self, duration: Cycles) {
            self.runs.push(duration.get());
            self.threads.push(std::thread::current().id());
        }
    }

    #[test]
    fn threshold_scenario() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::new(100), Recorder::default(), TaskQueue::manual());

        proxy.add(Cycles::new(60));
        assert_eq!(proxy.task_queue().pending(), 0);
        proxy.add(Cycles::new(60));
        assert_eq!(proxy.task_queue().pending(), 1);
        assert_eq!(proxy.time_owed(), Cycles::new(20));
        assert!(proxy.peek().runs.is_empty(), "queued work has not run yet");

        proxy.flush();
        assert_eq!(proxy.peek().runs, vec![100, 20]);
        assert_eq!(proxy.time_owed(), Cycles::ZERO);
    }

    #[test]
    fn large_addition_queues_every_whole_threshold() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::new(10), Recorder::default(), TaskQueue::manual());
        proxy.add(Cycles::new(35));
        assert_eq!(proxy.task_queue().pending(), 3);
        assert_eq!(proxy.access().runs, vec![10, 10, 10, 5]);
    }

    #[test]
    fn flush_without_additions_does_nothing() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::new(10), Recorder::default(), TaskQueue::manual());
        proxy.flush();
        proxy.add(Cycles::new(10));
        proxy.flush();
        proxy.flush();
        assert_eq!(proxy.peek().runs, vec![10]);
    }

    #[test]
    fn worker_runs_thresholds_and_caller_runs_remainder() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::with_worker(Cycles::new(50), Recorder::default(), "audio-test")
                .expect("spawn worker");
        for _ in 0..7 {
            proxy.add(Cycles::new(30));
        }

        let caller = std::thread::current().id();
        let recorder = proxy.access();
        assert_eq!(recorder.runs, vec![50, 50, 50, 50, 10]);
        assert!(recorder.threads[..4].iter().all(|id| *id != caller));
        assert_eq!(recorder.threads[4], caller);
    }

    #[test]
    fn half_cycle_driver_feeds_cycle_component() {
        let mut proxy: AsyncJustInTime<Recorder> =
            AsyncJustInTime::new(HalfCycles::new(8), Recorder::default(), TaskQueue::manual());
        proxy.add(HalfCycles::new(9));
        proxy.add(HalfCycles::new(2));
        assert_eq!(proxy.access().runs, vec![4, 1]);
        assert_eq!(proxy.time_owed(), HalfCycles::ZERO);
    }

    #[test]
    fn odd_half_cycle_threshold_carries_into_next_step() {
        let mut proxy: AsyncJustInTime<Recorder> =
            AsyncJustInTime::new(HalfCycles::new(3), Recorder::default(), TaskQueue::manual());
        proxy.add(HalfCycles::new(6));
        proxy.add(HalfCycles::new(1));
        assert_eq!(proxy.access().runs, vec![1, 2]);

        proxy.add(HalfCycles::new(1));
        assert_eq!(proxy.access().runs, vec![1, 2, 1]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "negative duration")]
    fn negative_addition_is_rejected() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::new(10), Recorder::default(), TaskQueue::manual());
        proxy.add(Cycles::new(-1));
    }

    #[test]
    #[should_panic(expected = "threshold must be positive")]
    fn zero_threshold_is_rejected() {
        let _proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::ZERO, Recorder::default(), TaskQueue::manual());
    }

    #[test]
    fn observable_reports_queue_depth() {
        let mut proxy: AsyncJustInTime<Recorder, Cycle> =
            AsyncJustInTime::new(Cycles::new(4), Recorder::default(), TaskQueue::manual());
        proxy.add(Cycles::new(9));
        assert_eq!(proxy.query("queued"), Some(Value::U64(2)));
        assert_eq!(proxy.query("time_owed"), Some(Value::I64(1)));
        assert_eq!(proxy.query("flushed"), Some(Value::Bool(false)));
    }
}
