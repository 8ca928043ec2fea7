use chrono::{DateTime, Utc};

/// A fully rendered page as returned by a session
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL the session ended up on (after redirects)
    pub url: String,
    /// Rendered document markup
    pub html: String,
    /// When the page state was captured
    pub fetched_at: DateTime<Utc>,
    /// Optional screenshot, kept only for diagnostics
    pub screenshot: Option<Vec<u8>>,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            fetched_at: Utc::now(),
            screenshot: None,
        }
    }

    /// Override the capture time
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    pub fn with_screenshot(mut self, screenshot: Vec<u8>) -> Self {
        self.screenshot = Some(screenshot);
        self
    }
}
