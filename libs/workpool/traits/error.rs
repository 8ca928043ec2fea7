use thiserror::Error;

/// Main error type for workpool
#[derive(Error, Debug, Clone)]
pub enum WorkPoolError {
    /// Network or rendering transport failure (session is considered broken)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Fetch did not complete in time (session is considered broken)
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Session could not be created or has become unusable
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// Session recovery gave up
    #[error("Session recovery failed after {attempts} attempts: {reason}")]
    SessionRecoveryFailed { attempts: usize, reason: String },

    /// Login was attempted and failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The task panicked while running on a worker
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The task was discarded or interrupted before producing a result
    #[error("Task cancelled")]
    Cancelled,

    /// The scheduler or pool no longer accepts work
    #[error("Shut down")]
    ShutDown,

    /// A task context referenced a worker slot that does not exist
    #[error("Worker {worker_id} out of range (pool has {workers} workers)")]
    WorkerOutOfRange { worker_id: usize, workers: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl WorkPoolError {
    /// Whether this error means the session must be discarded and recreated
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            WorkPoolError::Transport(_)
                | WorkPoolError::Timeout(_)
                | WorkPoolError::SessionUnavailable(_)
        )
    }
}

/// Result type for workpool operations
pub type Result<T> = std::result::Result<T, WorkPoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WorkPoolError::Transport("reset".into()).is_session_fatal());
        assert!(WorkPoolError::Timeout("30s".into()).is_session_fatal());
        assert!(WorkPoolError::SessionUnavailable("gone".into()).is_session_fatal());
        assert!(!WorkPoolError::Other("404".into()).is_session_fatal());
        assert!(!WorkPoolError::Cancelled.is_session_fatal());
    }

    #[test]
    fn test_recovery_message() {
        let err = WorkPoolError::SessionRecoveryFailed {
            attempts: 5,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Session recovery failed after 5 attempts: connection refused"
        );
    }
}
