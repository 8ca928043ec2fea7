//! Common test utilities for workpool integration tests
//!
//! Provides a scripted session factory so that failure sequences can be
//! replayed deterministically.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use workpool::{RenderedPage, RenderingSession, Result, SessionFactory, WorkPoolError};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the next fetch on any session should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Return a page
    Page,
    /// Return a page showing the login form
    LoggedOut,
    /// Fail with a transport error (session broken)
    Broken,
    /// Fail with a timeout (session broken)
    Stall,
    /// Fail with a request-level error
    NotFound,
}

/// Shared bookkeeping across every session of one factory
#[derive(Default)]
pub struct Recorder {
    pub script: Mutex<VecDeque<Step>>,
    pub created: AtomicUsize,
    pub fetches: AtomicUsize,
    pub logins: AtomicUsize,
    pub closed: Mutex<Vec<usize>>,
    pub failing_creates: AtomicUsize,
    pub failing_closes: Mutex<Vec<usize>>,
    pub logged_in: Mutex<Vec<usize>>,
}

impl Recorder {
    pub fn push(&self, steps: &[Step]) {
        self.script.lock().extend(steps.iter().copied());
    }

    pub fn close_count(&self, session_id: usize) -> usize {
        self.closed.lock().iter().filter(|id| **id == session_id).count()
    }
}

pub struct ScriptedFactory {
    pub recorder: Arc<Recorder>,
}

impl ScriptedFactory {
    pub fn new() -> (Self, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Self {
                recorder: Arc::clone(&recorder),
            },
            recorder,
        )
    }
}

impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    fn create(&self, worker_id: usize) -> Result<ScriptedSession> {
        let pending = self.recorder.failing_creates.load(Ordering::SeqCst);
        if pending > 0 {
            self.recorder
                .failing_creates
                .store(pending - 1, Ordering::SeqCst);
            return Err(WorkPoolError::Other("renderer failed to start".to_string()));
        }
        let id = self.recorder.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            id,
            worker_id,
            current: "about:blank".to_string(),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

pub struct ScriptedSession {
    pub id: usize,
    pub worker_id: usize,
    current: String,
    recorder: Arc<Recorder>,
}

impl RenderingSession for ScriptedSession {
    fn fetch(&mut self, url: Option<&str>) -> Result<RenderedPage> {
        if let Some(url) = url {
            self.current = url.to_string();
        }
        self.recorder.fetches.fetch_add(1, Ordering::SeqCst);
        let step = self.recorder.script.lock().pop_front().unwrap_or(Step::Page);
        match step {
            Step::Page => Ok(RenderedPage::new(
                self.current.clone(),
                format!("<html><body data-session=\"{}\"></body></html>", self.id),
            )),
            Step::LoggedOut => Ok(RenderedPage::new(
                self.current.clone(),
                "<html><form id=\"login\"></form></html>",
            )),
            Step::Broken => Err(WorkPoolError::Transport("connection reset".to_string())),
            Step::Stall => Err(WorkPoolError::Timeout("render took too long".to_string())),
            Step::NotFound => Err(WorkPoolError::Other("404".to_string())),
        }
    }

    fn is_authenticated(&self, page: &RenderedPage) -> bool {
        !page.html.contains("id=\"login\"")
    }

    fn login(&mut self) -> Result<()> {
        self.recorder.logins.fetch_add(1, Ordering::SeqCst);
        self.recorder.logged_in.lock().push(self.id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.recorder.closed.lock().push(self.id);
        if self.recorder.failing_closes.lock().contains(&self.id) {
            return Err(WorkPoolError::Transport("already dead".to_string()));
        }
        Ok(())
    }
}
