//! Fixed-rate trigger threads

use crossbeam_channel::{after, bounded, select, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Runs a job at a fixed rate on its own thread
///
/// The job runs on the trigger thread, so runs of one trigger never overlap.
/// Ticks missed while a run was still in progress are skipped, not queued.
pub struct PeriodicTrigger {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    /// Start `job` after `initial_delay`, then every `interval`
    pub fn spawn<F>(
        name: &str,
        initial_delay: Duration,
        interval: Duration,
        mut job: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let interval = interval.max(Duration::from_millis(1));
        let thread_name = format!("trigger-{}", name);
        let trigger = name.to_string();

        let handle = std::thread::Builder::new().name(thread_name).spawn(move || {
            let mut next = Instant::now() + initial_delay;
            loop {
                let wait = next.saturating_duration_since(Instant::now());
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(after(wait)) -> _ => {}
                }

                if catch_unwind(AssertUnwindSafe(&mut job)).is_err() {
                    error!("Trigger {} job panicked", trigger);
                }

                next += interval;
                let now = Instant::now();
                if next <= now {
                    let behind = now.duration_since(next).as_nanos() / interval.as_nanos() + 1;
                    let skipped = u32::try_from(behind).unwrap_or(u32::MAX);
                    debug!("Trigger {} skipped {} missed runs", trigger, skipped);
                    next += interval.saturating_mul(skipped);
                }
            }
            debug!("Trigger {} stopped", trigger);
        })?;

        info!(
            "Trigger {} scheduled (first run in {:?}, every {:?})",
            name, initial_delay, interval
        );

        Ok(Self {
            name: name.to_string(),
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prevent further runs; a run in progress completes
    pub fn stop(&mut self) {
        self.stop.take();
    }

    /// Wait for the trigger thread to exit
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Trigger {} thread panicked", self.name);
            }
        }
    }
}

impl Drop for PeriodicTrigger {
    fn drop(&mut self) {
        self.join();
    }
}
