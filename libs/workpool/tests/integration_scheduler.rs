//! Integration tests for the priority scheduler
//!
//! These tests verify ordering, panic isolation and shutdown behavior.

mod common;

use crossbeam_channel::{bounded, unbounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use workpool::{Priority, PriorityScheduler, WorkPoolError};

/// Occupy the only worker until the returned sender is dropped or signalled
fn block_single_worker(scheduler: &PriorityScheduler) -> crossbeam_channel::Sender<()> {
    let (release_tx, release_rx) = bounded::<()>(1);
    let (started_tx, started_rx) = bounded::<()>(1);
    scheduler
        .submit(Priority::High, move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    release_tx
}

#[test]
fn test_priority_ordering_single_worker() {
    verbose_println!("Testing priority ordering...");

    let scheduler = PriorityScheduler::new(1).unwrap();
    let gate = block_single_worker(&scheduler);
    let order = Arc::new(Mutex::new(Vec::new()));

    let plan = [
        ("low-1", Priority::Low),
        ("default-1", Priority::Default),
        ("high-1", Priority::High),
        ("medium-1", Priority::Medium),
        ("low-2", Priority::Low),
        ("high-2", Priority::High),
    ];

    let handles: Vec<_> = plan
        .iter()
        .map(|(name, priority)| {
            let order = Arc::clone(&order);
            let name = name.to_string();
            scheduler
                .submit(*priority, move |_| order.lock().push(name))
                .unwrap()
        })
        .collect();

    assert_eq!(scheduler.queued(), plan.len());
    gate.send(()).unwrap();

    for handle in handles {
        handle.wait().unwrap();
    }

    let order = order.lock().clone();
    verbose_println!("  Execution order: {:?}", order);
    assert_eq!(
        order,
        vec!["high-1", "high-2", "medium-1", "default-1", "low-1", "low-2"]
    );
}

#[test]
fn test_panicking_task_is_isolated() {
    verbose_println!("Testing panic isolation...");

    let scheduler = PriorityScheduler::new(1).unwrap();

    let bad = scheduler
        .submit(Priority::High, |_| -> u32 { panic!("extractor exploded") })
        .unwrap();
    let good = scheduler.submit(Priority::Low, |_| 7u32).unwrap();

    match bad.wait() {
        Err(WorkPoolError::TaskPanicked(message)) => {
            assert!(message.contains("extractor exploded"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(good.wait().unwrap(), 7);

    let stats = scheduler.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_drain_runs_queued_tasks() {
    verbose_println!("Testing shutdown_and_drain...");

    let scheduler = PriorityScheduler::new(2).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let counter = Arc::clone(&counter);
        scheduler
            .submit(Priority::Default, move |_| {
                std::thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert!(scheduler.shutdown_and_drain(Duration::from_secs(10)));
    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert!(!scheduler.is_accepting());
    assert!(scheduler.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_drain_times_out_on_stuck_task() {
    let scheduler = PriorityScheduler::new(1).unwrap();
    let gate = block_single_worker(&scheduler);

    assert!(!scheduler.shutdown_and_drain(Duration::from_millis(100)));
    drop(gate);
    assert!(scheduler.shutdown_and_drain(Duration::from_secs(5)));
}

#[test]
fn test_cancel_now_discards_queue() {
    verbose_println!("Testing cancel_now...");

    let scheduler = PriorityScheduler::new(1).unwrap();
    let (seen_tx, seen_rx) = unbounded::<bool>();

    // Running task observes the cancellation flag
    let running = scheduler
        .submit(Priority::High, move |ctx| {
            let completed = ctx.sleep(Duration::from_secs(30));
            let _ = seen_tx.send(ctx.is_cancelled());
            completed
        })
        .unwrap();

    let queued: Vec<_> = (0..5)
        .map(|i| scheduler.submit(Priority::Low, move |_| i).unwrap())
        .collect();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(scheduler.cancel_now(), 5);

    assert_eq!(running.wait().unwrap(), false);
    assert!(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap());

    for handle in queued {
        assert!(matches!(handle.wait(), Err(WorkPoolError::Cancelled)));
    }

    assert!(matches!(
        scheduler.submit(Priority::High, |_| ()),
        Err(WorkPoolError::ShutDown)
    ));
    assert!(scheduler.await_termination(Duration::from_secs(5)));
    assert_eq!(scheduler.stats().discarded, 5);
}

#[test]
fn test_handle_polling() {
    let scheduler = PriorityScheduler::new(1).unwrap();
    let gate = block_single_worker(&scheduler);

    let handle = scheduler.submit(Priority::Medium, |_| "done").unwrap();
    assert_eq!(handle.priority(), Priority::Medium);
    assert!(handle.try_wait().is_none());
    assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());

    gate.send(()).unwrap();
    let result = handle
        .wait_timeout(Duration::from_secs(5))
        .expect("task should complete");
    assert_eq!(result.unwrap(), "done");
}

#[test]
fn test_tasks_can_submit_follow_up_work() {
    verbose_println!("Testing nested submission...");

    let scheduler = PriorityScheduler::new(2).unwrap();
    let inner = scheduler.clone();

    let outer = scheduler
        .submit(Priority::High, move |_| {
            inner
                .submit(Priority::Low, |ctx| ctx.worker_id() < 2)
                .unwrap()
        })
        .unwrap();

    let nested = outer.wait().unwrap();
    assert!(nested.wait().unwrap());
}
