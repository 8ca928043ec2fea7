//! # Workpool
//!
//! A fixed pool of worker threads that run tasks by priority, paired with one
//! stateful rendering session per worker.
//!
//! ## Features
//!
//! - **Priority scheduling**: Four tiers, FIFO within a tier
//! - **Panic isolation**: A panicking task fails its own handle only
//! - **Worker affinity**: Each worker owns exactly one session, created lazily
//! - **Session recovery**: Broken sessions are discarded and recreated after a fixed pause
//! - **Ordered shutdown**: Drain, cancel and join, then close every session once

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    config, priority, scheduler, session_pool,
    config::{default_workers, PoolConfig},
    priority::Priority,
    scheduler::{panic_message, PriorityScheduler, SchedulerStats, TaskContext, TaskHandle},
    session_pool::{PoolStats, RenderingPool},
};
