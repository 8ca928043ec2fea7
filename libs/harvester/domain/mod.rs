//! Domain Layer
//!
//! Contains pure entities: the sport/league/match catalog, price
//! observations and extraction status.
//! This layer has no dependencies on infrastructure or application layers.

pub mod models;
pub mod odds;
pub mod snapshot;
pub mod status;

// Re-export domain models
pub use models::{web_key_from_url, Country, League, Match, Sport};

// Re-export observation types
pub use odds::{parse_price, MarketSection, MatchObservationSet, ObservationTime, OddKey, PriceSeries};

pub use snapshot::{CatalogSnapshot, SnapshotCell};
pub use status::{PageContext, RequestStatus, ScrapError};
