//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with proper
//! logging, heartbeat, and graceful shutdown.

use std::time::{Duration, Instant};
use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 300, // 5 minutes default
        }
    }

    /// Set heartbeat interval
    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Trait for binary applications
///
/// Implement this trait to create a standardized binary
/// that follows Clean Architecture principles.
#[allow(async_fn_in_trait)]
pub trait BinaryRunner {
    /// Run the application until shutdown
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        self.print_shutdown(None);
        result
    }
}

/// Times each step of an ordered shutdown
#[derive(Debug)]
pub struct ShutdownStages {
    started: Instant,
    stages: Vec<(String, Duration)>,
}

impl ShutdownStages {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stages: Vec::new(),
        }
    }

    /// Run one stage and log how long it took
    pub fn run<T>(&mut self, name: &str, stage: impl FnOnce() -> T) -> T {
        info!("Shutdown: {}...", name);
        let start = Instant::now();
        let result = stage();
        let elapsed = start.elapsed();
        info!("Shutdown: {} done in {:?}", name, elapsed);
        self.stages.push((name.to_string(), elapsed));
        result
    }

    pub fn stages(&self) -> &[(String, Duration)] {
        &self.stages
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    /// One line per stage, for the shutdown banner
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .stages
            .iter()
            .map(|(name, elapsed)| format!("  {:<24} {:?}", name, elapsed))
            .collect();
        lines.push(format!("  {:<24} {:?}", "total", self.total()));
        lines.join("\n")
    }
}

impl Default for ShutdownStages {
    fn default() -> Self {
        Self::new()
    }
}
