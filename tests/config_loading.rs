//! Integration test: Configuration utilities
//!
//! Tests config path resolution and loading of the shipped harvester config.

use odds_harvester::bin_common::{load_config_from_env, ConfigType};
use odds_harvester::harvester::infrastructure::{HarvesterConfig, LogLevel};
use std::env;
use std::time::Duration;

#[test]
fn test_harvester_config_default() {
    // Clear env var to test default
    env::remove_var("HARVESTER_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Harvester);
    assert_eq!(config_path.to_str().unwrap(), "config/harvester.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/harvester.yaml");
    let yaml = std::fs::read_to_string(path).unwrap();
    let config = HarvesterConfig::from_yaml(&yaml).unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.retry.limit, 3);

    let cadence = config.orchestrator_config().cadence;
    assert_eq!(cadence.discovery_interval, Duration::from_secs(30 * 60));
    assert_eq!(cadence.live_interval, Duration::from_secs(30 * 60));
    assert_eq!(cadence.nonlive_initial_delay, Duration::from_secs(30 * 60));
    assert_eq!(cadence.nonlive_interval, Duration::from_secs(120 * 60));
}

#[test]
fn test_config_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvester.yaml");
    std::fs::write(
        &path,
        "database:\n  path: /var/lib/odds/odds.db\npersistence:\n  capacity: 64\n  low_water: 8\n",
    )
    .unwrap();

    let config = HarvesterConfig::load(&path).unwrap();
    assert_eq!(config.persistence.capacity, 64);
    assert_eq!(config.queue_config().low_water, 8);
}
