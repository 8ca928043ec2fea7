//! Integration tests for the single-writer persistence queue

mod common;

use crossbeam_channel::{unbounded, Receiver};
use harvester::infrastructure::persistence::{
    LogWriteErrors, PersistenceQueue, QueueConfig, Store, StoreError, StoreErrorListener,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store that parks on a gate before every write
struct GatedStore {
    gate: Receiver<()>,
    written: Arc<Mutex<Vec<u32>>>,
    fail_odd: bool,
    closed: Arc<AtomicBool>,
}

impl GatedStore {
    fn new(gate: Receiver<()>) -> (Self, Arc<Mutex<Vec<u32>>>, Arc<AtomicBool>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                gate,
                written: Arc::clone(&written),
                fail_odd: false,
                closed: Arc::clone(&closed),
            },
            written,
            closed,
        )
    }
}

impl Store<u32> for GatedStore {
    fn write(&mut self, record: &u32) -> Result<(), StoreError> {
        let _ = self.gate.recv();
        if self.fail_odd && record % 2 == 1 {
            return Err(StoreError::Database(format!("constraint failed for {}", record)));
        }
        self.written.lock().push(*record);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FailureLog {
    failed: Mutex<Vec<u32>>,
    queue: Mutex<Option<Arc<PersistenceQueue<u32>>>>,
}

impl StoreErrorListener<u32> for FailureLog {
    fn on_write_error(&self, record: &u32, _error: &StoreError) {
        self.failed.lock().push(*record);
        // Closing from the writer thread must be a no-op, not a deadlock
        let queue = self.queue.lock().clone();
        if let Some(queue) = queue {
            queue.close();
        }
    }
}

fn wait_until_empty(queue: &PersistenceQueue<u32>) {
    assert!(common::wait_until(Duration::from_secs(5), || queue.is_empty()));
}

#[test]
fn test_store_blocks_at_capacity() {
    let (gate_tx, gate_rx) = unbounded();
    let (store, written, _) = GatedStore::new(gate_rx);
    let queue = Arc::new(
        PersistenceQueue::start(store, Arc::new(LogWriteErrors), QueueConfig { capacity: 2, low_water: 1 })
            .unwrap(),
    );

    queue.store(0).unwrap();
    wait_until_empty(&queue);
    queue.store(1).unwrap();
    queue.store(2).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || queue.store(3).is_ok())
    };
    std::thread::sleep(Duration::from_millis(100));
    assert!(!producer.is_finished(), "producer should block while the queue is full");
    verbose_println!("producer blocked with {} queued", queue.len());

    drop(gate_tx);
    assert!(producer.join().unwrap());
    queue.close();
    assert_eq!(*written.lock(), vec![0, 1, 2, 3]);
    assert_eq!(queue.stats().written, 4);
}

#[test]
fn test_failed_writes_do_not_stop_the_writer() {
    let (gate_tx, gate_rx) = unbounded();
    drop(gate_tx);
    let (mut store, written, _) = GatedStore::new(gate_rx);
    store.fail_odd = true;
    let listener = Arc::new(FailureLog::default());
    let queue = PersistenceQueue::start(store, Arc::clone(&listener), QueueConfig::default()).unwrap();

    for record in 0..6 {
        queue.store(record).unwrap();
    }
    queue.close();

    assert_eq!(*written.lock(), vec![0, 2, 4]);
    assert_eq!(*listener.failed.lock(), vec![1, 3, 5]);
    let stats = queue.stats();
    assert_eq!(stats.enqueued, 6);
    assert_eq!(stats.written, 3);
    assert_eq!(stats.failed, 3);
}

#[test]
fn test_close_flushes_in_order() {
    let (gate_tx, gate_rx) = unbounded();
    let (store, written, closed) = GatedStore::new(gate_rx);
    let queue = PersistenceQueue::start(store, Arc::new(LogWriteErrors), QueueConfig::default()).unwrap();

    for record in 10..15 {
        queue.store(record).unwrap();
    }
    drop(gate_tx);
    queue.close();

    assert_eq!(*written.lock(), vec![10, 11, 12, 13, 14]);
    assert!(closed.load(Ordering::SeqCst));
    assert!(queue.store(99).is_err());
}

#[test]
fn test_close_now_discards_pending() {
    let (gate_tx, gate_rx) = unbounded();
    let (store, written, closed) = GatedStore::new(gate_rx);
    let queue = PersistenceQueue::start(store, Arc::new(LogWriteErrors), QueueConfig::default()).unwrap();

    queue.store(1).unwrap();
    wait_until_empty(&queue);
    queue.store(2).unwrap();
    queue.store(3).unwrap();

    // Let the in-flight write finish once close_now is waiting on it
    let opener = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        drop(gate_tx);
    });
    let discarded = queue.close_now();
    opener.join().unwrap();

    assert_eq!(discarded, 2);
    assert_eq!(*written.lock(), vec![1]);
    assert_eq!(queue.stats().discarded, 2);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_close_from_writer_thread_is_ignored() {
    let (gate_tx, gate_rx) = unbounded();
    drop(gate_tx);
    let (mut store, written, _) = GatedStore::new(gate_rx);
    store.fail_odd = true;
    let listener = Arc::new(FailureLog::default());
    let queue = Arc::new(
        PersistenceQueue::start(store, Arc::clone(&listener), QueueConfig::default()).unwrap(),
    );
    *listener.queue.lock() = Some(Arc::clone(&queue));

    queue.store(1).unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || listener.failed.lock().len() == 1));
    assert!(!queue.is_closed());

    queue.store(2).unwrap();
    listener.queue.lock().take();
    queue.close();
    assert_eq!(*written.lock(), vec![2]);
}

/// Store whose write panics for odd records
struct PanickingStore {
    written: Arc<Mutex<Vec<u32>>>,
}

impl Store<u32> for PanickingStore {
    fn write(&mut self, record: &u32) -> Result<(), StoreError> {
        if record % 2 == 1 {
            panic!("driver crashed on {}", record);
        }
        self.written.lock().push(*record);
        Ok(())
    }
}

#[derive(Default)]
struct ErrorTexts(Mutex<Vec<(u32, String)>>);

impl StoreErrorListener<u32> for ErrorTexts {
    fn on_write_error(&self, record: &u32, error: &StoreError) {
        self.0.lock().push((*record, error.to_string()));
    }
}

#[test]
fn test_panicking_write_keeps_the_writer_draining() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let store = PanickingStore {
        written: Arc::clone(&written),
    };
    let listener = Arc::new(ErrorTexts::default());
    let queue = Arc::new(
        PersistenceQueue::start(store, Arc::clone(&listener), QueueConfig { capacity: 2, low_water: 1 })
            .unwrap(),
    );

    // More records than capacity: producers only finish if the writer survives
    let producer = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || (0..8).all(|record| queue.store(record).is_ok()))
    };
    assert!(
        common::wait_until(Duration::from_secs(5), || producer.is_finished()),
        "producer still blocked after a panicking write"
    );
    assert!(producer.join().unwrap());

    queue.close();
    assert_eq!(*written.lock(), vec![0, 2, 4, 6]);
    let errors = listener.0.lock().clone();
    verbose_println!("write errors: {:?}", errors);
    assert_eq!(errors.iter().map(|(r, _)| *r).collect::<Vec<_>>(), vec![1, 3, 5, 7]);
    assert!(errors[0].1.contains("driver crashed on 1"));

    let stats = queue.stats();
    assert_eq!(stats.written, 4);
    assert_eq!(stats.failed, 4);
}
