use std::time::Duration;

/// Default number of session recreation attempts
pub const DEFAULT_SESSION_ATTEMPTS: usize = 5;

/// Default pause between session recreation attempts
pub const DEFAULT_SESSION_RETRY_DELAY: Duration = Duration::from_secs(10);

/// `max(2, available cores)`
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

/// Configuration shared by the scheduler and the rendering pool
///
/// Both must be sized identically: the pool keeps one session slot per
/// scheduler worker.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers (and session slots)
    pub workers: usize,

    /// Total attempts to obtain a working session for one fetch
    pub session_attempts: usize,

    /// Pause between attempts
    pub session_retry_delay: Duration,

    /// How long `close()` waits for a busy session before leaving it to its worker
    pub close_wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            session_attempts: DEFAULT_SESSION_ATTEMPTS,
            session_retry_delay: DEFAULT_SESSION_RETRY_DELAY,
            close_wait: Duration::from_millis(500),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_session_attempts(mut self, attempts: usize) -> Self {
        self.session_attempts = attempts;
        self
    }

    pub fn with_session_retry_delay(mut self, delay: Duration) -> Self {
        self.session_retry_delay = delay;
        self
    }

    pub fn with_close_wait(mut self, wait: Duration) -> Self {
        self.close_wait = wait;
        self
    }

    /// Pause before recreating a session after `failures` broken attempts,
    /// or `None` once the attempt budget is spent
    ///
    /// `session_attempts` counts the first try.
    pub fn recovery_delay(&self, failures: usize) -> Option<Duration> {
        (failures < self.session_attempts).then_some(self.session_retry_delay)
    }
}
