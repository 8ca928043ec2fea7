//! Scheduler and rendering pool
//!
//! ## Example
//!
//! ```rust,ignore
//! use workpool::*;
//!
//! let config = PoolConfig::default().with_workers(4);
//! let scheduler = PriorityScheduler::new(config.workers)?;
//! let pool = Arc::new(RenderingPool::new(MyFactory, &config));
//!
//! let handle = scheduler.submit(Priority::High, {
//!     let pool = Arc::clone(&pool);
//!     move |ctx| pool.fetch(ctx, "https://example.com/")
//! })?;
//! let page = handle.wait()??;
//! ```

pub mod config;
pub mod priority;
pub mod scheduler;
pub mod session_pool;

// Re-export main types
pub use config::{default_workers, PoolConfig};
pub use priority::Priority;
pub use scheduler::{panic_message, PriorityScheduler, SchedulerStats, TaskContext, TaskHandle};
pub use session_pool::{PoolStats, RenderingPool};
