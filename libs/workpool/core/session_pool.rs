//! Per-worker rendering sessions with transparent recovery
//!
//! The pool owns one slot per scheduler worker. A slot's session is created
//! on first use and only ever touched by tasks running on that worker, so the
//! slot mutex is uncontended except while the pool is closing.

use crate::core::config::PoolConfig;
use crate::core::scheduler::TaskContext;
use crate::traits::{RenderedPage, RenderingSession, Result, SessionFactory, WorkPoolError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Session lifecycle counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub discarded: u64,
    pub logins: u64,
    pub closed: u64,
}

#[derive(Default)]
struct AtomicPoolStats {
    created: AtomicU64,
    discarded: AtomicU64,
    logins: AtomicU64,
    closed: AtomicU64,
}

/// Pool of rendering sessions indexed by worker id
pub struct RenderingPool<F: SessionFactory> {
    factory: F,
    slots: Vec<Mutex<Option<F::Session>>>,
    config: PoolConfig,
    closed: AtomicBool,
    stats: AtomicPoolStats,
}

impl<F: SessionFactory> RenderingPool<F> {
    /// Create a pool sized and tuned from `config`
    pub fn new(factory: F, config: &PoolConfig) -> Self {
        let slots = (0..config.workers).map(|_| Mutex::new(None)).collect();
        Self {
            factory,
            slots,
            config: config.clone(),
            closed: AtomicBool::new(false),
            stats: AtomicPoolStats::default(),
        }
    }

    /// Navigate the calling worker's session to `url`
    pub fn fetch(&self, ctx: &TaskContext, url: &str) -> Result<RenderedPage> {
        self.navigate(ctx, Some(url))
    }

    /// Re-read the calling worker's current page without navigating
    pub fn current(&self, ctx: &TaskContext) -> Result<RenderedPage> {
        self.navigate(ctx, None)
    }

    fn navigate(&self, ctx: &TaskContext, url: Option<&str>) -> Result<RenderedPage> {
        if self.is_closed() {
            return Err(WorkPoolError::ShutDown);
        }
        let worker = ctx.worker_id();
        let mut slot = self.slot(worker)?.lock();
        let mut failures = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(WorkPoolError::Cancelled);
            }
            if self.is_closed() {
                self.release_if_closed(&mut slot, worker);
                return Err(WorkPoolError::ShutDown);
            }

            let result = self
                .ensure_session(&mut slot, worker)
                .and_then(|session| self.fetch_authenticated(session, url));

            match result {
                Ok(page) => {
                    self.release_if_closed(&mut slot, worker);
                    return Ok(page);
                }
                Err(e) if e.is_session_fatal() => {
                    failures += 1;
                    warn!(worker, failures, "Session broken: {}", e);
                    self.discard(&mut slot, worker);

                    match self.config.recovery_delay(failures) {
                        Some(delay) => {
                            if !ctx.sleep(delay) {
                                return Err(WorkPoolError::Cancelled);
                            }
                        }
                        None => {
                            return Err(WorkPoolError::SessionRecoveryFailed {
                                attempts: failures,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_authenticated(
        &self,
        session: &mut F::Session,
        url: Option<&str>,
    ) -> Result<RenderedPage> {
        let page = session.fetch(url)?;
        if session.is_authenticated(&page) {
            return Ok(page);
        }

        info!("Session not authenticated at {}, logging in", page.url);
        self.stats.logins.fetch_add(1, Ordering::Relaxed);
        session.login()?;

        let page = session.fetch(url)?;
        if !session.is_authenticated(&page) {
            warn!("Still not authenticated after login at {}", page.url);
        }
        Ok(page)
    }

    fn ensure_session<'a>(
        &self,
        slot: &'a mut Option<F::Session>,
        worker: usize,
    ) -> Result<&'a mut F::Session> {
        if slot.is_none() {
            let session = self.factory.create(worker).map_err(|e| {
                if e.is_session_fatal() {
                    e
                } else {
                    WorkPoolError::SessionUnavailable(e.to_string())
                }
            })?;
            self.stats.created.fetch_add(1, Ordering::Relaxed);
            debug!(worker, "Rendering session created");
            *slot = Some(session);
        }
        slot.as_mut()
            .ok_or_else(|| WorkPoolError::SessionUnavailable("empty session slot".to_string()))
    }

    fn discard(&self, slot: &mut Option<F::Session>, worker: usize) {
        if let Some(mut session) = slot.take() {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = session.close() {
                debug!(worker, "Ignoring close error on broken session: {}", e);
            }
        }
    }

    fn release_if_closed(&self, slot: &mut Option<F::Session>, worker: usize) {
        if self.is_closed() {
            self.close_slot(slot, worker);
        }
    }

    fn close_slot(&self, slot: &mut Option<F::Session>, worker: usize) -> bool {
        match slot.take() {
            Some(mut session) => {
                if let Err(e) = session.close() {
                    warn!(worker, "Error closing session: {}", e);
                }
                self.stats.closed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn slot(&self, worker: usize) -> Result<&Mutex<Option<F::Session>>> {
        self.slots.get(worker).ok_or(WorkPoolError::WorkerOutOfRange {
            worker_id: worker,
            workers: self.slots.len(),
        })
    }

    /// Close every created session exactly once
    ///
    /// Sessions busy in a fetch are closed by their worker when the fetch
    /// returns. Returns the number of sessions closed here.
    pub fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut closed = 0;
        for (worker, slot) in self.slots.iter().enumerate() {
            match slot.try_lock_for(self.config.close_wait) {
                Some(mut guard) => {
                    if self.close_slot(&mut guard, worker) {
                        closed += 1;
                    }
                }
                None => debug!(worker, "Session busy, its worker will close it"),
            }
        }
        info!("Rendering pool closed ({} sessions)", closed);
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of session slots
    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    /// Number of sessions currently alive (busy slots are not counted)
    pub fn live_sessions(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.try_lock().map_or(false, |s| s.is_some()))
            .count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.stats.created.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            logins: self.stats.logins.load(Ordering::Relaxed),
            closed: self.stats.closed.load(Ordering::Relaxed),
        }
    }
}

impl<F: SessionFactory> Drop for RenderingPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}
