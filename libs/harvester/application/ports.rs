//! Boundaries between the orchestration core and the source site

use crate::domain::{League, Match, MatchObservationSet, RequestStatus, Sport};
use std::sync::Arc;
use workpool::{RenderedPage, RenderingPool, SessionFactory, TaskContext};

/// Access to the calling worker's rendering session
pub trait PageSource {
    /// Navigate to `url`
    fn fetch(&mut self, url: &str) -> workpool::Result<RenderedPage>;

    /// Re-read the current page without navigating
    fn current(&mut self) -> workpool::Result<RenderedPage>;
}

/// [`PageSource`] backed by the rendering pool slot of one worker
pub struct PooledPages<'a, F: SessionFactory> {
    pool: &'a RenderingPool<F>,
    ctx: &'a TaskContext,
}

impl<'a, F: SessionFactory> PooledPages<'a, F> {
    pub fn new(pool: &'a RenderingPool<F>, ctx: &'a TaskContext) -> Self {
        Self { pool, ctx }
    }
}

impl<'a, F: SessionFactory> PageSource for PooledPages<'a, F> {
    fn fetch(&mut self, url: &str) -> workpool::Result<RenderedPage> {
        self.pool.fetch(self.ctx, url)
    }

    fn current(&mut self) -> workpool::Result<RenderedPage> {
        self.pool.current(self.ctx)
    }
}

/// Site-specific parsing
///
/// Lookup misses are never errors at this boundary: an extractor returns an
/// empty list or `None` and records what went wrong on `status`.
pub trait PageExtractor: Send + Sync {
    /// Page listing every sport
    fn catalog_url(&self) -> String;

    fn sport_url(&self, sport: &Sport) -> String;

    fn league_url(&self, league: &League) -> String;

    fn discover_sports(&self, page: &RenderedPage, status: &mut RequestStatus) -> Vec<Sport>;

    fn discover_leagues(
        &self,
        page: &RenderedPage,
        sport: &Sport,
        status: &mut RequestStatus,
    ) -> Vec<League>;

    fn discover_matches(
        &self,
        page: &RenderedPage,
        league: &Arc<League>,
        status: &mut RequestStatus,
    ) -> Vec<Match>;

    /// Collect every price shown for `fixture`, fetching as many pages as needed
    fn extract_observations(
        &self,
        pages: &mut dyn PageSource,
        fixture: &Match,
        status: &mut RequestStatus,
    ) -> Option<MatchObservationSet>;
}
