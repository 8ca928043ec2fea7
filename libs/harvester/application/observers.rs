//! Default observers: data-quality warnings and persistence hand-off

use crate::application::notify::{ParseObserver, Propagation};
use crate::domain::{League, Match, MatchObservationSet, RequestStatus, Sport};
use crate::infrastructure::persistence::{PersistenceError, PersistenceQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Length of a well-formed match web key
const WEB_KEY_LEN: usize = 8;

/// Warns about suspicious parse results; never stops an enumeration
#[derive(Debug, Default)]
pub struct DataQualityChecker;

impl DataQualityChecker {
    pub fn new() -> Self {
        Self
    }
}

pub fn is_valid_web_key(key: &str) -> bool {
    key.len() == WEB_KEY_LEN && key.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Prices are either 0 (suspended) or decimal odds of at least 1
pub fn is_valid_price(price: f64) -> bool {
    price == 0.0 || price >= 1.0
}

impl ParseObserver for DataQualityChecker {
    fn on_sport(&self, _status: &RequestStatus, sport: &Sport) -> Propagation {
        if sport.name.trim().is_empty() {
            warn!("Sport with empty name");
        }
        Propagation::Continue
    }

    fn on_league(&self, _status: &RequestStatus, league: &League) -> Propagation {
        if league.name.trim().is_empty() {
            warn!("{} has an empty name", league);
        }
        if league.sport.name.trim().is_empty() || league.country.name.trim().is_empty() {
            warn!("{} is missing its sport or country", league);
        }
        Propagation::Continue
    }

    fn on_match(&self, _status: &RequestStatus, fixture: &Match) -> Propagation {
        if fixture.name.trim().is_empty() || fixture.url.trim().is_empty() {
            warn!("{} is missing its name or url", fixture);
        }
        if fixture.local_team().is_empty() || fixture.visitor_team().map_or(true, str::is_empty) {
            warn!("{} has no local or visitor team", fixture);
        }
        if !is_valid_web_key(&fixture.web_key) {
            warn!(web_key = %fixture.web_key, "{} has a malformed web key", fixture);
        }
        Propagation::Continue
    }

    fn on_observations(&self, _status: &RequestStatus, set: &MatchObservationSet) -> Propagation {
        if set.is_empty() {
            warn!("{} carries no odds", set);
            return Propagation::Continue;
        }
        for (key, series) in set.odds() {
            if key.section.tab.trim().is_empty() || key.section.subtab.trim().is_empty() {
                warn!("{} of {} has an empty section", key, set.fixture);
            }
            if series.is_empty() {
                warn!("{} of {} has no prices", key, set.fixture);
            }
            for (at, price) in series {
                if !is_valid_price(*price) {
                    warn!(
                        "{} of {} has impossible price {} at {}",
                        key,
                        set.fixture,
                        price,
                        at.as_text()
                    );
                }
            }
        }
        Propagation::Continue
    }
}

/// Hands every published observation set to the persistence queue
pub struct PersistingObserver {
    queue: Arc<PersistenceQueue<MatchObservationSet>>,
    dropped: AtomicUsize,
}

impl PersistingObserver {
    pub fn new(queue: Arc<PersistenceQueue<MatchObservationSet>>) -> Self {
        Self {
            queue,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Sets the queue refused since this observer was created
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ParseObserver for PersistingObserver {
    fn on_observations(&self, _status: &RequestStatus, set: &MatchObservationSet) -> Propagation {
        let refused = match self.queue.store(set.clone()) {
            Ok(()) => {
                debug!("Queued {} for storage", set);
                return Propagation::Continue;
            }
            Err(PersistenceError::Closed(set)) => format!("Persistence closed, dropping {}", set),
            Err(PersistenceError::Full(set)) => format!("Persistence full, dropping {}", set),
        };
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("{}", refused);
        Propagation::Continue
    }
}
