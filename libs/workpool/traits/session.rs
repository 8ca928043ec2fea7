use crate::error::Result;
use crate::page::RenderedPage;

/// A stateful rendering session owned by exactly one worker
///
/// Sessions are never shared: the pool hands a session only to tasks running
/// on the worker that created it.
pub trait RenderingSession: Send {
    /// Navigate to `url` and return the rendered page
    ///
    /// # Arguments
    /// * `url` - Target URL, or `None` to re-read the current page without navigating
    ///
    /// # Returns
    /// * `Ok(page)` - Rendered page
    /// * `Err(Transport | Timeout)` - The session is broken and must be recreated
    /// * `Err(other)` - Request-level failure, session is still usable
    fn fetch(&mut self, url: Option<&str>) -> Result<RenderedPage>;

    /// Check whether `page` shows an authenticated state
    ///
    /// Called after every fetch. Returning `false` triggers `login()` followed
    /// by one refetch.
    fn is_authenticated(&self, _page: &RenderedPage) -> bool {
        true
    }

    /// Perform a login on this session
    fn login(&mut self) -> Result<()> {
        Ok(())
    }

    /// Terminate the session and release its resources
    ///
    /// Must tolerate sessions that are already broken.
    fn close(&mut self) -> Result<()>;
}

/// Creates rendering sessions on demand
pub trait SessionFactory: Send + Sync {
    /// Session type produced by this factory
    type Session: RenderingSession;

    /// Create a fresh session for the given worker
    fn create(&self, worker_id: usize) -> Result<Self::Session>;
}
