//! # Workpool Traits
//!
//! Core traits and types shared by the scheduler and the rendering pool:
//!
//! - **RenderingSession**: A stateful page renderer owned by one worker
//! - **SessionFactory**: Creates sessions lazily, one per worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use workpool::*;
//!
//! struct MySession;
//!
//! impl RenderingSession for MySession {
//!     fn fetch(&mut self, url: Option<&str>) -> Result<RenderedPage> {
//!         Ok(RenderedPage::new(url.unwrap_or("about:blank"), "<html></html>"))
//!     }
//!
//!     fn close(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

pub mod error;
pub mod page;
pub mod session;

// Re-export commonly used types
pub use error::{Result, WorkPoolError};
pub use page::RenderedPage;
pub use session::{RenderingSession, SessionFactory};
