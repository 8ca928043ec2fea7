//! Process-level helpers for the daemon binary

pub mod heartbeat;
pub mod shutdown;

pub use heartbeat::Heartbeat;
pub use shutdown::ShutdownManager;
