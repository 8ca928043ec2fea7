use crate::application::{Cadence, OrchestratorConfig};
use crate::infrastructure::http::HttpSessionConfig;
use crate::infrastructure::persistence::{QueueConfig, DEFAULT_CAPACITY, DEFAULT_LOW_WATER};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use workpool::PoolConfig;

pub const DB_PATH_ENV: &str = "HARVESTER_DB_PATH";
pub const USERNAME_ENV: &str = "HARVESTER_USERNAME";
pub const PASSWORD_ENV: &str = "HARVESTER_PASSWORD";
pub const BASE_URL_ENV: &str = "HARVESTER_BASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Harvester daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub sessions: SessionsConfig,
    pub cadence: CadenceConfig,
    pub retry: RetryConfig,
    pub persistence: PersistenceConfig,
    pub source: SourceConfig,
    pub log_level: LogLevel,
    /// Directory for JSON/PNG error reports; reports are off when unset
    pub error_report_dir: Option<String>,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/odds.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Defaults to `max(2, available cores)`
    pub workers: Option<usize>,
    /// How long shutdown waits for running tasks
    pub termination_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            termination_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub attempts: usize,
    pub retry_delay_secs: u64,
    pub close_wait_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            attempts: workpool::config::DEFAULT_SESSION_ATTEMPTS,
            retry_delay_secs: workpool::config::DEFAULT_SESSION_RETRY_DELAY.as_secs(),
            close_wait_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub discovery_interval_mins: u64,
    pub live_interval_mins: u64,
    pub nonlive_initial_delay_mins: u64,
    pub nonlive_interval_mins: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            discovery_interval_mins: 30,
            live_interval_mins: 30,
            nonlive_initial_delay_mins: 30,
            nonlive_interval_mins: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per match and wave after the first attempt
    pub limit: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { limit: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub capacity: usize,
    pub low_water: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            low_water: DEFAULT_LOW_WATER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub login_path: String,
    pub login_marker: String,

    /// Username from .env (not in YAML)
    #[serde(skip)]
    pub username: Option<String>,

    /// Password from .env (not in YAML)
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let http = HttpSessionConfig::default();
        Self {
            base_url: http.base_url,
            timeout_secs: http.timeout.as_secs(),
            connect_timeout_secs: http.connect_timeout.as_secs(),
            user_agent: http.user_agent,
            login_path: http.login_path,
            login_marker: http.login_marker,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl HarvesterConfig {
    /// Load configuration from YAML file and .env
    ///
    /// A missing file is not an error: defaults are used instead.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = if path.exists() {
            let yaml_content = std::fs::read_to_string(path)?;
            Self::from_yaml(&yaml_content)?
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        // Load .env file
        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist
        config.apply_overrides(|name| std::env::var(name).ok());

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply environment overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(DB_PATH_ENV) {
            info!("Database path overridden by {}", DB_PATH_ENV);
            self.database.path = path;
        }
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            info!("Base URL overridden by {}", BASE_URL_ENV);
            self.source.base_url = base_url;
        }
        self.source.username = lookup(USERNAME_ENV).filter(|v| !v.is_empty());
        self.source.password = lookup(PASSWORD_ENV).filter(|v| !v.is_empty());
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.workers == Some(0) {
            return Err(ConfigError::ValidationError(
                "scheduler.workers must be greater than 0".to_string(),
            ));
        }

        if self.sessions.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.attempts must be greater than 0".to_string(),
            ));
        }

        if self.persistence.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "persistence.capacity must be greater than 0".to_string(),
            ));
        }

        if self.persistence.low_water >= self.persistence.capacity {
            return Err(ConfigError::ValidationError(
                "persistence.low_water must be below persistence.capacity".to_string(),
            ));
        }

        let cadence = &self.cadence;
        if cadence.discovery_interval_mins == 0
            || cadence.live_interval_mins == 0
            || cadence.nonlive_interval_mins == 0
        {
            return Err(ConfigError::ValidationError(
                "cadence intervals must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.path must not be empty".to_string(),
            ));
        }

        if self.source.username.is_some() != self.source.password.is_some() {
            return Err(ConfigError::ValidationError(format!(
                "{} and {} must be set together",
                USERNAME_ENV, PASSWORD_ENV
            )));
        }

        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        let mut pool = PoolConfig::default()
            .with_session_attempts(self.sessions.attempts)
            .with_session_retry_delay(Duration::from_secs(self.sessions.retry_delay_secs))
            .with_close_wait(Duration::from_millis(self.sessions.close_wait_ms));
        if let Some(workers) = self.scheduler.workers {
            pool = pool.with_workers(workers);
        }
        pool
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        OrchestratorConfig {
            retry_limit: self.retry.limit,
            cadence: Cadence {
                discovery_interval: minutes(self.cadence.discovery_interval_mins),
                live_interval: minutes(self.cadence.live_interval_mins),
                nonlive_initial_delay: minutes(self.cadence.nonlive_initial_delay_mins),
                nonlive_interval: minutes(self.cadence.nonlive_interval_mins),
            },
            ..OrchestratorConfig::default()
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.persistence.capacity,
            low_water: self.persistence.low_water,
        }
    }

    pub fn http_config(&self) -> HttpSessionConfig {
        HttpSessionConfig {
            base_url: self.source.base_url.clone(),
            timeout: Duration::from_secs(self.source.timeout_secs),
            connect_timeout: Duration::from_secs(self.source.connect_timeout_secs),
            user_agent: self.source.user_agent.clone(),
            login_path: self.source.login_path.clone(),
            login_marker: self.source.login_marker.clone(),
            username: self.source.username.clone(),
            password: self.source.password.clone(),
            ..HttpSessionConfig::default()
        }
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.termination_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            sessions: SessionsConfig::default(),
            cadence: CadenceConfig::default(),
            retry: RetryConfig::default(),
            persistence: PersistenceConfig::default(),
            source: SourceConfig::default(),
            log_level: LogLevel::default(),
            error_report_dir: None,
            heartbeat_interval_secs: 300,
        }
    }
}
