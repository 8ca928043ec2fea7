//! CLI utilities for binaries
//!
//! Handles configuration path resolution and command line arguments
//! for the binary executables.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Harvester daemon configuration (config/harvester.yaml)
    Harvester,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Harvester => "config/harvester.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable overriding the path, if any
    pub fn env_var_name(&self) -> Option<&str> {
        match self {
            ConfigType::Harvester => Some("HARVESTER_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use odds_harvester::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("harvester.yaml".to_string()));
/// assert_eq!(path.to_str(), Some("harvester.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
