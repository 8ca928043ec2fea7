use thiserror::Error;
use workpool::WorkPoolError;

/// Orchestrator-level failures
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Scheduler rejected work: {0}")]
    Scheduler(#[from] WorkPoolError),

    #[error("Discovery interrupted before completion")]
    Interrupted,

    #[error("Discovery found no matches, keeping previous snapshot")]
    EmptyCatalog,

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Failed to start trigger {name}: {reason}")]
    Trigger { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, HarvestError>;
