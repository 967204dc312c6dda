//! Strictly ordered deferred execution across threads.
//!
//! One thread enqueues closures; they run in enqueue order either on a worker
//! thread owned by the queue or on whichever thread calls
//! [`perform`](TaskQueue::perform). [`flush`](TaskQueue::flush) is a one-way
//! barrier: it returns once everything enqueued before the call has run.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::TaskQueueError;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct State {
    pending: VecDeque<Task>,
    enqueued: u64,
    completed: u64,
    stopping: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    work_available: Condvar,
    work_completed: Condvar,
}

impl Shared {
    fn run_worker(&self) {
        loop {
            let task = {
                let mut state = self.state.lock();
                loop {
                    if let Some(task) = state.pending.pop_front() {
                        break task;
                    }
                    if state.stopping {
                        return;
                    }
                    self.work_available.wait(&mut state);
                }
            };
            self.execute(task);
        }
    }

    fn execute(&self, task: Task) {
        // A panicking task still counts as completed, or flush() would wait
        // forever.
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("queued task panicked; continuing with the next task");
        }
        self.state.lock().completed += 1;
        self.work_completed.notify_all();
    }
}

/// A FIFO of closures, drained by a worker thread or by explicit calls.
///
/// Tasks must not panic. A task whose work can fail records the failure in
/// the state it touches, for inspection after the next barrier.
pub struct TaskQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
}

impl TaskQueue {
    /// A queue with no worker; tasks run inside [`perform`](Self::perform),
    /// [`perform_one`](Self::perform_one) or [`flush`](Self::flush).
    #[must_use]
    pub fn manual() -> Self {
        Self {
            shared: Arc::default(),
            worker: None,
            worker_id: None,
        }
    }

    /// A queue drained continuously by a new thread called `name`.
    pub fn with_worker(name: &str) -> Result<Self, TaskQueueError> {
        let shared = Arc::<Shared>::default();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || worker_shared.run_worker())
            .map_err(|source| TaskQueueError::Spawn {
                name: name.to_owned(),
                source,
            })?;
        debug!(name, "task queue worker started");

        Ok(Self {
            shared,
            worker_id: Some(worker.thread().id()),
            worker: Some(worker),
        })
    }

    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Appends `task`. Safe to call while another thread is draining.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.shared.state.lock();
            state.pending.push_back(Box::new(task));
            state.enqueued += 1;
        }
        if self.worker.is_some() {
            self.shared.work_available.notify_one();
        }
    }

    /// Number of tasks enqueued but not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Total tasks ever enqueued.
    #[must_use]
    pub fn enqueued(&self) -> u64 {
        self.shared.state.lock().enqueued
    }

    /// Total tasks that have finished running.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.shared.state.lock().completed
    }

    /// Runs the oldest pending task on the calling thread.
    ///
    /// Returns `false` if there was nothing to run. On a queue with a worker
    /// this does nothing; the worker owns execution order there.
    pub fn perform_one(&self) -> bool {
        if self.worker.is_some() {
            return false;
        }
        let task = self.shared.state.lock().pending.pop_front();
        match task {
            Some(task) => {
                self.shared.execute(task);
                true
            }
            None => false,
        }
    }

    /// Runs every pending task, in order, on the calling thread. On a queue
    /// with a worker, waits for the worker to catch up instead.
    ///
    /// Returns the number of tasks run by this call.
    pub fn perform(&self) -> usize {
        if self.worker.is_some() {
            self.flush();
            return 0;
        }
        let mut performed = 0;
        while self.perform_one() {
            performed += 1;
        }
        performed
    }

    /// Blocks until every task enqueued before this call has completed.
    ///
    /// Must not be called from the queue's own worker.
    pub fn flush(&self) {
        if self.worker.is_none() {
            self.perform();
            return;
        }
        debug_assert_ne!(
            Some(thread::current().id()),
            self.worker_id,
            "TaskQueue::flush called from its own worker"
        );

        let mut state = self.shared.state.lock();
        let target = state.enqueued;
        while state.completed < target {
            self.shared.work_completed.wait(&mut state);
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::manual()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            self.perform();
            return;
        };

        self.shared.state.lock().stopping = true;
        self.shared.work_available.notify_all();
        let name = worker.thread().name().map(str::to_owned);
        if worker.join().is_err() {
            error!(?name, "task queue worker exited abnormally");
        } else {
            debug!(?name, "task queue worker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_queue_runs_in_enqueue_order() {
        let queue = TaskQueue::manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            queue.enqueue(move || log.lock().push(i));
        }
        assert_eq!(queue.pending(), 5);
        assert!(log.lock().is_empty(), "nothing runs until asked");

        assert!(queue.perform_one());
        assert_eq!(*log.lock(), vec![0]);
        assert_eq!(queue.perform(), 4);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert!(!queue.perform_one());
        assert_eq!(queue.completed(), 5);
    }

    #[test]
    fn worker_queue_preserves_order() {
        let queue = TaskQueue::with_worker("order-test").expect("spawn worker");
        assert!(queue.has_worker());
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..1_000 {
            let log = Arc::clone(&log);
            queue.enqueue(move || log.lock().push(i));
        }
        queue.flush();
        assert_eq!(*log.lock(), (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn flush_waits_for_slow_tasks() {
        let queue = TaskQueue::with_worker("slow-test").expect("spawn worker");
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            queue.enqueue(move || {
                thread::sleep(std::time::Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.flush();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(queue.completed(), queue.enqueued());
    }

    #[test]
    fn flush_on_idle_queue_returns() {
        let queue = TaskQueue::with_worker("idle-test").expect("spawn worker");
        queue.flush();
        queue.flush();
        assert_eq!(queue.completed(), 0);
    }

    #[test]
    fn panicking_task_does_not_wedge_the_queue() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let queue = TaskQueue::with_worker("panic-test").expect("spawn worker");
        let ran = Arc::new(AtomicUsize::new(0));
        queue.enqueue(|| panic!("task failure"));
        let after = Arc::clone(&ran);
        queue.enqueue(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        queue.flush();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.completed(), 2);
    }

    #[test]
    fn dropping_a_queue_runs_outstanding_work() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let queue = TaskQueue::with_worker("drop-test").expect("spawn worker");
            for _ in 0..10 {
                let ran = Arc::clone(&ran);
                queue.enqueue(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 10);

        {
            let queue = TaskQueue::manual();
            let ran = Arc::clone(&ran);
            queue.enqueue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(ran.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn enqueue_from_another_thread() {
        let queue = Arc::new(TaskQueue::manual());
        let total = Arc::new(AtomicUsize::new(0));
        let producer = {
            let queue = Arc::clone(&queue);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                for _ in 0..100 {
                    let total = Arc::clone(&total);
                    queue.enqueue(move || {
                        total.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };
        producer.join().expect("producer thread");
        queue.flush();
        assert_eq!(total.load(Ordering::SeqCst), 100);
    }
}
