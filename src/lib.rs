//! Odds Harvester - Main Library
//!
//! This crate provides the main library for the odds harvesting daemon,
//! following Clean Architecture principles.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **harvester**: Discovery, extraction waves and persistence (re-exported from workspace)
//! - **workpool**: Priority scheduler and rendering session pool (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use odds_harvester::bin_common::{load_config_from_env, ConfigType};
//! use odds_harvester::harvester::infrastructure::HarvesterConfig;
//! ```

// Re-export workspace libraries for convenience
pub use harvester;
pub use workpool;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables
    //!
    //! Provides shared functionality for the presentation layer (binaries)
    //! following Clean Architecture principles.

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig, ShutdownStages};
}
