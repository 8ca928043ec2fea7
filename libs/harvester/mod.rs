//! # Harvester
//!
//! Odds harvesting core built on the `workpool` scheduler and session pool.
//!
//! ## Architecture
//!
//! - **domain**: Catalog entities, price observations, extraction status
//! - **application**: Parse steps, notification bus, retries, discovery and
//!   extraction waves, periodic triggers
//! - **infrastructure**: HTTP sessions, HTML extraction, SQLite store,
//!   persistence queue, configuration, logging, error reports
//! - **utils**: Shutdown and heartbeat helpers for the daemon binary

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod utils;

pub use application::{
    DataQualityChecker, HarvestError, HarvestPhase, Harvester, NotificationBus, Orchestrator,
    OrchestratorConfig, PageExtractor, ParseObserver, PersistingObserver, Propagation, WaveKind,
};
pub use domain::{
    CatalogSnapshot, Country, League, Match, MatchObservationSet, ObservationTime, OddKey,
    RequestStatus, ScrapError, SnapshotCell, Sport,
};
pub use infrastructure::{
    ErrorReportWriter, HarvesterConfig, HtmlPageExtractor, HttpSessionFactory, PersistenceQueue,
    SqliteStore,
};
