//! Extraction errors and per-operation status accumulation

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use workpool::{RenderedPage, WorkPoolError};

/// Maximum characters of offending markup kept on an error
const ELEMENT_EXCERPT_LIMIT: usize = 2_000;

/// Diagnostic reference to the page (and element) an error came from
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub url: String,
    pub element_html: Option<String>,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

impl PageContext {
    pub fn from_page(page: &RenderedPage) -> Self {
        Self {
            url: page.url.clone(),
            element_html: None,
            screenshot: page.screenshot.clone(),
        }
    }

    pub fn with_element(mut self, html: &str) -> Self {
        let excerpt: String = html.chars().take(ELEMENT_EXCERPT_LIMIT).collect();
        self.element_html = Some(excerpt);
        self
    }
}

/// Non-fatal extraction error
///
/// Never aborts a wave; it is recorded on a [`RequestStatus`] and reported
/// to observers.
#[derive(Error, Debug, Clone, Serialize)]
pub struct ScrapError {
    pub message: String,
    pub cause: Option<String>,
    pub page: Option<PageContext>,
}

impl fmt::Display for ScrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        if let Some(page) = &self.page {
            write!(f, " at {}", page.url)?;
        }
        Ok(())
    }
}

impl ScrapError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            page: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn on_page(mut self, page: &RenderedPage) -> Self {
        self.page = Some(PageContext::from_page(page));
        self
    }

    /// Attach the offending element's markup (requires a page reference)
    pub fn at_element(mut self, html: &str) -> Self {
        self.page = self.page.map(|page| page.with_element(html));
        self
    }
}

impl From<WorkPoolError> for ScrapError {
    fn from(err: WorkPoolError) -> Self {
        ScrapError::new("page could not be rendered").with_cause(err)
    }
}

/// Errors accumulated by one logical operation; ok iff empty
#[derive(Debug, Clone, Default)]
pub struct RequestStatus {
    errors: Vec<ScrapError>,
}

impl RequestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: ScrapError) {
        self.errors.push(error);
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ScrapError] {
        &self.errors
    }

    /// Fold another status' errors into this one
    pub fn merge(&mut self, other: RequestStatus) {
        self.errors.extend(other.errors);
    }
}
