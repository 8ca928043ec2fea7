//! Priority-aware task scheduler
//!
//! # Architecture
//!
//! ```text
//! submit(priority, task) ──> BinaryHeap (priority, sequence) ──> N worker threads
//!                                   │                               │
//!                             Condvar wakeup               catch_unwind(task)
//!                                                                   │
//!                                        TaskHandle <── bounded(1) result channel
//! ```
//!
//! Workers always take the highest-priority queued task; tasks of equal
//! priority run in submission order. A panicking task is isolated: its handle
//! resolves to `TaskPanicked` and the worker keeps servicing the queue.

use crate::core::priority::{Priority, QueuedTask};
use crate::traits::{Result, WorkPoolError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce(&TaskContext) -> bool + Send + 'static>;

/// Granularity of cooperative sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Execution context handed to every task
///
/// Carries the id of the worker running the task (used for session affinity)
/// and the scheduler's cancellation flag.
#[derive(Debug, Clone)]
pub struct TaskContext {
    worker_id: usize,
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    /// Context not bound to a scheduler, for driving tasks directly
    pub fn standalone(worker_id: usize) -> Self {
        Self {
            worker_id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// True once the scheduler has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Handle to the eventual result of a submitted task
///
/// The result is delivered once: after a successful `wait*`/`try_wait`
/// further calls report `Cancelled`.
pub struct TaskHandle<T> {
    priority: Priority,
    rx: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Block until the task finishes
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(WorkPoolError::Cancelled))
    }

    /// Block up to `timeout`; `None` means the task is still pending
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(WorkPoolError::Cancelled)),
        }
    }

    /// Non-blocking poll; `None` means the task is still pending
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(WorkPoolError::Cancelled)),
        }
    }
}

/// Scheduler counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub panicked: u64,
    pub discarded: u64,
}

#[derive(Default)]
struct AtomicSchedulerStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl AtomicSchedulerStats {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedTask<Job>>,
    accepting: bool,
    terminate: bool,
    active: usize,
    next_sequence: u64,
    live_workers: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when work is pushed or the scheduler stops
    work_available: Condvar,
    /// Signalled when the queue is empty and no task is running
    idle: Condvar,
    /// Signalled when a worker thread exits
    worker_exit: Condvar,
    cancelled: Arc<AtomicBool>,
    stats: AtomicSchedulerStats,
}

struct Inner {
    shared: Arc<Shared>,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone: release the worker threads
        let dropped = {
            let mut state = self.shared.state.lock();
            state.accepting = false;
            state.terminate = true;
            std::mem::take(&mut state.heap)
        };
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.work_available.notify_all();
        drop(dropped);
    }
}

/// Fixed-size pool of worker threads executing tasks by priority
///
/// Cloning is cheap; all clones share the same queue and workers. Workers are
/// released once the last clone is dropped.
#[derive(Clone)]
pub struct PriorityScheduler {
    inner: Arc<Inner>,
}

impl PriorityScheduler {
    /// Start a scheduler with `workers` threads
    pub fn new(workers: usize) -> Result<Self> {
        Self::with_thread_name(workers, "render-worker")
    }

    /// Start a scheduler naming its threads `<prefix>-<index>`
    pub fn with_thread_name(workers: usize, prefix: &str) -> Result<Self> {
        if workers == 0 {
            return Err(WorkPoolError::Configuration(
                "scheduler needs at least one worker".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                accepting: true,
                terminate: false,
                active: 0,
                next_sequence: 0,
                live_workers: 0,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
            worker_exit: Condvar::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: AtomicSchedulerStats::default(),
        });

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker_shared = Arc::clone(&shared);
            shared.state.lock().live_workers += 1;
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{}", prefix, worker_id))
                .spawn(move || worker_loop(worker_id, worker_shared));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.state.lock().live_workers -= 1;
                    let scheduler = Self {
                        inner: Arc::new(Inner {
                            shared,
                            workers: handles.len(),
                            handles: Mutex::new(handles),
                        }),
                    };
                    scheduler.cancel_now();
                    return Err(WorkPoolError::Other(format!(
                        "failed to spawn worker {}: {}",
                        worker_id, e
                    )));
                }
            }
        }

        info!("Started priority scheduler with {} workers", workers);

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                workers,
                handles: Mutex::new(handles),
            }),
        })
    }

    /// Queue `task` at `priority`
    ///
    /// Fails with `ShutDown` once shutdown or cancellation has started.
    pub fn submit<T, F>(&self, priority: Priority, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&TaskContext) -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);

        let job: Job = Box::new(move |ctx: &TaskContext| {
            match catch_unwind(AssertUnwindSafe(|| task(ctx))) {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    true
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        worker = ctx.worker_id(),
                        %priority,
                        "Task panicked: {}",
                        message
                    );
                    let _ = tx.send(Err(WorkPoolError::TaskPanicked(message)));
                    false
                }
            }
        });

        let shared = &self.inner.shared;
        {
            let mut state = shared.state.lock();
            if !state.accepting {
                return Err(WorkPoolError::ShutDown);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.heap.push(QueuedTask {
                priority,
                sequence,
                job,
            });
        }
        shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        shared.work_available.notify_one();

        Ok(TaskHandle { priority, rx })
    }

    /// Stop accepting work and wait for queued and running tasks to finish
    ///
    /// Returns `true` if the scheduler became idle before `timeout`.
    pub fn shutdown_and_drain(&self, timeout: Duration) -> bool {
        let shared = &self.inner.shared;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();
        if state.accepting {
            debug!("Scheduler draining ({} queued)", state.heap.len());
            state.accepting = false;
            shared.work_available.notify_all();
        }

        while !(state.heap.is_empty() && state.active == 0) {
            if shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.heap.is_empty() && state.active == 0;
            }
        }
        true
    }

    /// Stop accepting work, discard everything queued and flag running tasks
    ///
    /// Discarded handles resolve to `Cancelled`. Returns the number of
    /// discarded tasks.
    pub fn cancel_now(&self) -> usize {
        let shared = &self.inner.shared;
        let discarded = {
            let mut state = shared.state.lock();
            state.accepting = false;
            state.terminate = true;
            std::mem::take(&mut state.heap)
        };
        shared.cancelled.store(true, Ordering::Release);
        shared.work_available.notify_all();
        shared.idle.notify_all();

        let count = discarded.len();
        drop(discarded);
        if count > 0 {
            shared
                .stats
                .discarded
                .fetch_add(count as u64, Ordering::Relaxed);
            warn!("Scheduler cancelled, discarded {} queued tasks", count);
        } else {
            debug!("Scheduler cancelled with an empty queue");
        }
        count
    }

    /// Wait for every worker thread to exit, then join them
    ///
    /// Only meaningful after `shutdown_and_drain` or `cancel_now`.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let shared = &self.inner.shared;
        let deadline = Instant::now() + timeout;
        {
            let mut state = shared.state.lock();
            while state.live_workers > 0 {
                if shared.worker_exit.wait_until(&mut state, deadline).timed_out()
                    && state.live_workers > 0
                {
                    return false;
                }
            }
        }

        let current = std::thread::current().id();
        let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }
        true
    }

    /// True once cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.shared.cancelled.load(Ordering::Acquire)
    }

    /// True while new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.shared.state.lock().accepting
    }

    /// Number of tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.inner.shared.state.lock().heap.len()
    }

    /// Number of tasks currently running
    pub fn active(&self) -> usize {
        self.inner.shared.state.lock().active
    }

    /// Size of the worker pool
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.shared.stats.snapshot()
    }
}

fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    let ctx = TaskContext {
        worker_id,
        cancelled: Arc::clone(&shared.cancelled),
    };
    debug!(worker = worker_id, "Worker started");

    loop {
        let next = {
            let mut state = shared.state.lock();
            loop {
                if state.terminate {
                    break None;
                }
                if let Some(task) = state.heap.pop() {
                    state.active += 1;
                    break Some(task);
                }
                if !state.accepting {
                    break None;
                }
                shared.work_available.wait(&mut state);
            }
        };

        let Some(task) = next else { break };

        let completed = (task.job)(&ctx);
        if completed {
            shared.stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.stats.panicked.fetch_add(1, Ordering::Relaxed);
        }

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.heap.is_empty() && state.active == 0 {
            shared.idle.notify_all();
        }
    }

    let mut state = shared.state.lock();
    state.live_workers -= 1;
    if state.active == 0 && state.heap.is_empty() {
        shared.idle.notify_all();
    }
    shared.worker_exit.notify_all();
    debug!(worker = worker_id, "Worker stopped");
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            PriorityScheduler::new(0),
            Err(WorkPoolError::Configuration(_))
        ));
    }

    #[test]
    fn test_submit_and_wait() {
        let scheduler = PriorityScheduler::new(2).unwrap();
        let handle = scheduler.submit(Priority::Default, |_| 21 * 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
        assert!(scheduler.shutdown_and_drain(Duration::from_secs(5)));
        assert!(scheduler.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_context_carries_worker_id() {
        let scheduler = PriorityScheduler::new(3).unwrap();
        let ids: Vec<usize> = (0..12)
            .map(|_| scheduler.submit(Priority::High, |ctx| ctx.worker_id()).unwrap())
            .map(|h| h.wait().unwrap())
            .collect();
        assert!(ids.iter().all(|id| *id < 3));
        scheduler.cancel_now();
        assert!(scheduler.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let scheduler = PriorityScheduler::new(1).unwrap();
        assert!(scheduler.shutdown_and_drain(Duration::from_secs(1)));
        assert!(matches!(
            scheduler.submit(Priority::Low, |_| ()),
            Err(WorkPoolError::ShutDown)
        ));
    }

    #[test]
    fn test_standalone_context_sleep() {
        let ctx = TaskContext::standalone(7);
        assert_eq!(ctx.worker_id(), 7);
        assert!(!ctx.is_cancelled());
        assert!(ctx.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn test_cancelled_sleep_returns_early() {
        let ctx = TaskContext::standalone(0);
        ctx.cancelled.store(true, Ordering::Release);
        let start = Instant::now();
        assert!(!ctx.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
