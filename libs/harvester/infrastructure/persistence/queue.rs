//! Bounded multi-producer queue in front of a single store writer
//!
//! # Architecture
//!
//! ```text
//! worker 0 ──┐
//! worker 1 ──┼──> bounded(capacity) ──> "store-writer" thread ──> Store::write
//! worker N ──┘        (blocks when full)          │
//!                                                 └──> StoreErrorListener on failure
//! ```
//!
//! Exactly one write is in flight at any time and records are written in
//! enqueue order. A failed write is reported and the writer moves on; a
//! panicking write is reported as [`StoreError::Panicked`] the same way.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use workpool::panic_message;

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Producers are warned once free slots drop below this
pub const DEFAULT_LOW_WATER: usize = 16;

/// Failure reported by a [`Store`]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store closed")]
    Closed,

    #[error("Store panicked: {0}")]
    Panicked(String),
}

/// Durable sink, driven only from the writer thread
pub trait Store<R>: Send {
    fn write(&mut self, record: &R) -> Result<(), StoreError>;

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Receives every failed write
pub trait StoreErrorListener<R>: Send + Sync {
    fn on_write_error(&self, record: &R, error: &StoreError);
}

/// Listener that only logs
pub struct LogWriteErrors;

impl<R: fmt::Display> StoreErrorListener<R> for LogWriteErrors {
    fn on_write_error(&self, record: &R, error: &StoreError) {
        error!("Failed to store {}: {}", record, error);
    }
}

/// Rejected enqueue; the record is handed back
pub enum PersistenceError<R> {
    /// Queue at capacity (non-blocking enqueue only)
    Full(R),
    /// Queue closed
    Closed(R),
}

impl<R> PersistenceError<R> {
    pub fn into_record(self) -> R {
        match self {
            PersistenceError::Full(record) | PersistenceError::Closed(record) => record,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PersistenceError::Full(_))
    }
}

impl<R> fmt::Debug for PersistenceError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Full(_) => f.write_str("Full(..)"),
            PersistenceError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<R> fmt::Display for PersistenceError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Full(_) => f.write_str("persistence queue is full"),
            PersistenceError::Closed(_) => f.write_str("persistence queue is closed"),
        }
    }
}

impl<R> std::error::Error for PersistenceError<R> {}

/// Queue sizing
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub capacity: usize,
    pub low_water: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            low_water: DEFAULT_LOW_WATER,
        }
    }
}

/// Queue counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub written: u64,
    pub failed: u64,
    pub discarded: u64,
    /// Records refused by `store`/`try_store` (closed or full)
    pub rejected: u64,
}

#[derive(Default)]
struct AtomicQueueStats {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
}

/// Single-writer persistence queue
pub struct PersistenceQueue<R: Send + 'static> {
    sender: RwLock<Option<Sender<R>>>,
    receiver: Receiver<R>,
    config: QueueConfig,
    writer: Mutex<Option<JoinHandle<()>>>,
    writer_id: ThreadId,
    abort: Arc<AtomicBool>,
    stats: Arc<AtomicQueueStats>,
}

impl<R: Send + 'static> PersistenceQueue<R> {
    /// Start the writer thread
    pub fn start<S, L>(store: S, listener: Arc<L>, config: QueueConfig) -> std::io::Result<Self>
    where
        S: Store<R> + 'static,
        L: StoreErrorListener<R> + ?Sized + 'static,
    {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let abort = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(AtomicQueueStats::default());

        let handle = {
            let receiver = receiver.clone();
            let abort = Arc::clone(&abort);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name("store-writer".to_string())
                .spawn(move || writer_loop(store, listener, receiver, abort, stats))?
        };

        info!("Persistence queue started (capacity {})", capacity);

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            config: QueueConfig {
                capacity,
                low_water: config.low_water,
            },
            writer_id: handle.thread().id(),
            writer: Mutex::new(Some(handle)),
            abort,
            stats,
        })
    }

    /// Enqueue `record`, blocking while the queue is full
    pub fn store(&self, record: R) -> Result<(), PersistenceError<R>> {
        let Some(sender) = self.sender.read().clone() else {
            return Err(self.reject(PersistenceError::Closed(record)));
        };
        self.warn_if_backed_up(&sender);
        sender
            .send(record)
            .map_err(|e| self.reject(PersistenceError::Closed(e.into_inner())))?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Enqueue `record` without blocking
    pub fn try_store(&self, record: R) -> Result<(), PersistenceError<R>> {
        let Some(sender) = self.sender.read().clone() else {
            return Err(self.reject(PersistenceError::Closed(record)));
        };
        match sender.try_send(record) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(record)) => Err(self.reject(PersistenceError::Full(record))),
            Err(TrySendError::Disconnected(record)) => {
                Err(self.reject(PersistenceError::Closed(record)))
            }
        }
    }

    fn reject(&self, error: PersistenceError<R>) -> PersistenceError<R> {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        error
    }

    fn warn_if_backed_up(&self, sender: &Sender<R>) {
        let remaining = self.config.capacity.saturating_sub(sender.len());
        if remaining < self.config.low_water {
            warn!(
                "Persistence can't keep up: {} of {} slots left",
                remaining, self.config.capacity
            );
        }
    }

    /// Write everything already queued, then stop the writer
    ///
    /// Calling this from the writer thread itself does nothing.
    pub fn close(&self) {
        if std::thread::current().id() == self.writer_id {
            debug!("close() called from the store writer, ignoring");
            return;
        }
        let pending = self.receiver.len();
        if self.sender.write().take().is_some() {
            info!("Closing persistence queue ({} pending writes)", pending);
        }
        self.join_writer();
    }

    /// Stop after the in-flight write and discard the rest
    ///
    /// Returns the number of discarded records.
    pub fn close_now(&self) -> usize {
        if std::thread::current().id() == self.writer_id {
            self.abort.store(true, Ordering::Release);
            return 0;
        }
        self.abort.store(true, Ordering::Release);
        self.sender.write().take();
        self.join_writer();

        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            self.stats
                .discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!("Persistence queue aborted, {} records discarded", discarded);
        }
        discarded
    }

    fn join_writer(&self) {
        if let Some(handle) = self.writer.lock().take() {
            if handle.join().is_err() {
                error!("Store writer panicked");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Records waiting to be written
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            written: self.stats.written.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }
}

impl<R: Send + 'static> Drop for PersistenceQueue<R> {
    fn drop(&mut self) {
        self.close();
    }
}

fn writer_loop<R, S, L>(
    mut store: S,
    listener: Arc<L>,
    receiver: Receiver<R>,
    abort: Arc<AtomicBool>,
    stats: Arc<AtomicQueueStats>,
) where
    S: Store<R>,
    L: StoreErrorListener<R> + ?Sized,
{
    debug!("Store writer started");
    while !abort.load(Ordering::Acquire) {
        let Ok(record) = receiver.recv() else { break };
        let written = catch_unwind(AssertUnwindSafe(|| store.write(&record)))
            .unwrap_or_else(|payload| Err(StoreError::Panicked(panic_message(payload.as_ref()))));
        match written {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let notified = catch_unwind(AssertUnwindSafe(|| listener.on_write_error(&record, &e)));
                if let Err(payload) = notified {
                    error!("Store error listener panicked: {}", panic_message(payload.as_ref()));
                }
            }
        }
    }

    if let Err(e) = store.close() {
        warn!("Error closing store: {}", e);
    }
    debug!("Store writer stopped");
}
