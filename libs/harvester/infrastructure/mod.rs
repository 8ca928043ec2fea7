//! Infrastructure Layer
//!
//! Concrete adapters: HTTP sessions, HTML extraction, the SQLite store,
//! the persistence queue, configuration, logging and error reports.

pub mod config;
pub mod database;
pub mod extractor;
pub mod http;
pub mod logging;
pub mod persistence;
pub mod reports;

pub use config::{ConfigError, HarvesterConfig, LogLevel};
pub use database::{DatabaseError, SqliteStore};
pub use extractor::{ExtractorError, HtmlPageExtractor};
pub use http::{HttpSession, HttpSessionConfig, HttpSessionFactory};
pub use logging::init_tracing;
pub use persistence::{
    LogWriteErrors, PersistenceError, PersistenceQueue, QueueConfig, QueueStats, Store, StoreError,
    StoreErrorListener,
};
pub use reports::ErrorReportWriter;
