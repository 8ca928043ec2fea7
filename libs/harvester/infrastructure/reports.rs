//! Error reports written to disk for later inspection

use crate::application::notify::ParseObserver;
use crate::domain::ScrapError;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Writes every reported [`ScrapError`] as `<run-start>_<n>.json`
///
/// A `<run-start>_<n>.png` is written next to it when the error page carried
/// a screenshot. Write failures are logged and otherwise ignored.
pub struct ErrorReportWriter {
    dir: PathBuf,
    run_start: String,
    written: AtomicU64,
}

impl ErrorReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            run_start: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            written: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reports written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    fn write(&self, error: &ScrapError) -> anyhow::Result<PathBuf> {
        let n = self.written.fetch_add(1, Ordering::Relaxed) + 1;
        let stem = format!("{}_{}", self.run_start, n);

        let json_path = self.dir.join(format!("{}.json", stem));
        fs::write(&json_path, serde_json::to_vec_pretty(error)?)?;

        if let Some(screenshot) = error.page.as_ref().and_then(|p| p.screenshot.as_ref()) {
            fs::write(self.dir.join(format!("{}.png", stem)), screenshot)?;
        }
        Ok(json_path)
    }
}

impl ParseObserver for ErrorReportWriter {
    fn on_error(&self, error: &ScrapError) {
        match self.write(error) {
            Ok(path) => debug!("Error report written to {}", path.display()),
            Err(e) => warn!("Could not write error report for '{}': {}", error.message, e),
        }
    }
}
