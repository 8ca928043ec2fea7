//! One parse step per task: catalog, sport, league, match

use crate::application::notify::{NotificationBus, ParsedEntity, Propagation};
use crate::application::ports::{PageExtractor, PooledPages};
use crate::domain::{League, Match, RequestStatus, ScrapError, Sport};
use std::sync::Arc;
use tracing::{debug, info};
use workpool::{RenderedPage, RenderingPool, SessionFactory, TaskContext};

/// Runs parse steps on the calling worker's session and publishes results
pub struct Harvester<F: SessionFactory> {
    pool: Arc<RenderingPool<F>>,
    extractor: Arc<dyn PageExtractor>,
}

impl<F: SessionFactory> Harvester<F> {
    pub fn new(pool: Arc<RenderingPool<F>>, extractor: Arc<dyn PageExtractor>) -> Self {
        Self { pool, extractor }
    }

    pub fn pool(&self) -> &Arc<RenderingPool<F>> {
        &self.pool
    }

    /// Enumerate sports and publish each one
    pub fn expand_catalog(&self, ctx: &TaskContext, bus: &NotificationBus) -> RequestStatus {
        let mut status = RequestStatus::new();
        let url = self.extractor.catalog_url();
        if let Some(page) = self.load(ctx, &url, &mut status) {
            let sports = self.extractor.discover_sports(&page, &mut status);
            info!("Found {} sports", sports.len());
            publish_all(bus, &status, sports.iter().map(ParsedEntity::Sport));
        }
        finish(bus, status)
    }

    /// Enumerate the leagues of `sport` and publish each one
    pub fn expand_sport(&self, ctx: &TaskContext, sport: &Sport, bus: &NotificationBus) -> RequestStatus {
        let mut status = RequestStatus::new();
        let url = self.extractor.sport_url(sport);
        if let Some(page) = self.load(ctx, &url, &mut status) {
            let leagues = self.extractor.discover_leagues(&page, sport, &mut status);
            debug!("{} has {} leagues", sport, leagues.len());
            publish_all(bus, &status, leagues.iter().map(ParsedEntity::League));
        }
        finish(bus, status)
    }

    /// Enumerate the matches of `league` and publish each one
    pub fn expand_league(
        &self,
        ctx: &TaskContext,
        league: &Arc<League>,
        bus: &NotificationBus,
    ) -> RequestStatus {
        let mut status = RequestStatus::new();
        let url = self.extractor.league_url(league);
        if let Some(page) = self.load(ctx, &url, &mut status) {
            let matches = self.extractor.discover_matches(&page, league, &mut status);
            debug!("{} has {} matches", league, matches.len());
            publish_all(bus, &status, matches.iter().map(ParsedEntity::Match));
        }
        finish(bus, status)
    }

    /// Extract the prices of `fixture`; the set is published only when clean
    pub fn extract_match(&self, ctx: &TaskContext, fixture: &Match, bus: &NotificationBus) -> RequestStatus {
        let mut status = RequestStatus::new();
        let mut pages = PooledPages::new(&self.pool, ctx);
        let extracted = self
            .extractor
            .extract_observations(&mut pages, fixture, &mut status);

        match extracted {
            Some(set) if status.ok() => {
                debug!("Extracted {} ({} observations)", set, set.observation_count());
                bus.publish(&status, ParsedEntity::Observations(&set));
            }
            Some(_) => debug!("Discarding partial extraction of {}", fixture),
            None if status.ok() => {
                status.record(ScrapError::new(format!("no observations extracted for {}", fixture)))
            }
            None => {}
        }
        finish(bus, status)
    }

    fn load(&self, ctx: &TaskContext, url: &str, status: &mut RequestStatus) -> Option<RenderedPage> {
        match self.pool.fetch(ctx, url) {
            Ok(page) => Some(page),
            Err(e) => {
                status.record(ScrapError::new(format!("could not load {}", url)).with_cause(e));
                None
            }
        }
    }
}

fn publish_all<'a>(
    bus: &NotificationBus,
    status: &RequestStatus,
    entities: impl Iterator<Item = ParsedEntity<'a>>,
) -> Propagation {
    for entity in entities {
        if bus.publish(status, entity).is_stop() {
            debug!("Enumeration stopped by observer");
            return Propagation::Stop;
        }
    }
    Propagation::Continue
}

fn finish(bus: &NotificationBus, status: RequestStatus) -> RequestStatus {
    for error in status.errors() {
        bus.report_error(error);
    }
    status
}
