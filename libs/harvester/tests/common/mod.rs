//! Common test utilities for harvester integration tests
//!
//! A fake site (sessions plus extractor) serves a fixed catalog, and a
//! recording store captures what reaches persistence.

#![allow(dead_code)]

use harvester::application::{
    Harvester, NotificationBus, Orchestrator, OrchestratorConfig, PageExtractor, PageSource,
};
use harvester::domain::{
    Country, League, MarketSection, Match, MatchObservationSet, ObservationTime, OddKey,
    RequestStatus, ScrapError, SnapshotCell, Sport,
};
use harvester::infrastructure::persistence::{
    LogWriteErrors, PersistenceQueue, QueueConfig, Store, StoreError,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use workpool::{
    PoolConfig, PriorityScheduler, RenderedPage, RenderingPool, RenderingSession, Result,
    SessionFactory,
};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// One match of the fake catalog
#[derive(Debug, Clone)]
pub struct MatchSpec {
    pub sport: String,
    pub country: String,
    pub league: String,
    pub key: String,
    pub live: bool,
}

impl MatchSpec {
    pub fn new(sport: &str, league: &str, key: &str, live: bool) -> Self {
        Self {
            sport: sport.to_string(),
            country: "Spain".to_string(),
            league: league.to_string(),
            key: key.to_string(),
            live,
        }
    }

    fn url(&self) -> String {
        format!("fake://match/home-away-{}/", self.key)
    }
}

/// Hook run at the start of every extraction
pub type ExtractHook = Arc<dyn Fn(&Match) + Send + Sync>;

/// Catalog and failure script shared by the fake sessions and extractor
#[derive(Default)]
pub struct FakeSite {
    pub catalog: Mutex<Vec<MatchSpec>>,
    /// Remaining failed extractions per web key
    pub failures: Mutex<HashMap<String, usize>>,
    /// Keys that never extract successfully
    pub always_failing: Mutex<BTreeSet<String>>,
    pub extract_delay: Mutex<Duration>,
    pub catalog_down: AtomicBool,
    pub extractions: AtomicUsize,
    /// Successful extractions, in completion order
    pub extracted: Mutex<Vec<String>>,
    pub fetches: AtomicUsize,
    pub sessions: AtomicUsize,
    /// Also report an opening price one hour before the fetch
    pub with_history: AtomicBool,
    pub before_extract: Mutex<Option<ExtractHook>>,
    /// "extract:KEY" and "write:KEY" entries, shared with the recording store
    pub events: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn with_catalog(catalog: Vec<MatchSpec>) -> Arc<Self> {
        let site = Self::default();
        *site.catalog.lock() = catalog;
        Arc::new(site)
    }

    pub fn fail_times(&self, key: &str, times: usize) {
        self.failures.lock().insert(key.to_string(), times);
    }

    pub fn fail_always(&self, key: &str) {
        self.always_failing.lock().insert(key.to_string());
    }

    pub fn set_extract_delay(&self, delay: Duration) {
        *self.extract_delay.lock() = delay;
    }

    pub fn attempts(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn extracted(&self) -> Vec<String> {
        self.extracted.lock().clone()
    }

    pub fn on_extract(&self, hook: impl Fn(&Match) + Send + Sync + 'static) {
        *self.before_extract.lock() = Some(Arc::new(hook));
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

pub struct FakeFactory {
    site: Arc<FakeSite>,
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn create(&self, _worker_id: usize) -> Result<FakeSession> {
        self.site.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            site: Arc::clone(&self.site),
            current: String::new(),
        })
    }
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    current: String,
}

impl RenderingSession for FakeSession {
    fn fetch(&mut self, url: Option<&str>) -> Result<RenderedPage> {
        if let Some(url) = url {
            self.current = url.to_string();
        }
        self.site.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedPage::new(self.current.clone(), "<html></html>"))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeExtractor {
    site: Arc<FakeSite>,
}

impl PageExtractor for FakeExtractor {
    fn catalog_url(&self) -> String {
        "fake://catalog".to_string()
    }

    fn sport_url(&self, sport: &Sport) -> String {
        format!("fake://sport/{}", sport.name)
    }

    fn league_url(&self, league: &League) -> String {
        format!("fake://league/{}", league.relative_url)
    }

    fn discover_sports(&self, page: &RenderedPage, status: &mut RequestStatus) -> Vec<Sport> {
        if self.site.catalog_down.load(Ordering::SeqCst) {
            status.record(ScrapError::new("catalog unavailable").on_page(page));
            return Vec::new();
        }
        let names: BTreeSet<String> = self.site.catalog.lock().iter().map(|m| m.sport.clone()).collect();
        names.into_iter().map(Sport::new).collect()
    }

    fn discover_leagues(
        &self,
        _page: &RenderedPage,
        sport: &Sport,
        _status: &mut RequestStatus,
    ) -> Vec<League> {
        let leagues: BTreeSet<(String, String)> = self
            .site
            .catalog
            .lock()
            .iter()
            .filter(|m| m.sport == sport.name)
            .map(|m| (m.country.clone(), m.league.clone()))
            .collect();
        leagues
            .into_iter()
            .map(|(country, name)| {
                let url = format!("{}/{}", sport.name, name);
                League::new(sport.clone(), Country::new(country), name, url)
            })
            .collect()
    }

    fn discover_matches(
        &self,
        _page: &RenderedPage,
        league: &Arc<League>,
        _status: &mut RequestStatus,
    ) -> Vec<Match> {
        self.site
            .catalog
            .lock()
            .iter()
            .filter(|m| m.sport == league.sport.name && m.league == league.name)
            .map(|m| Match::new(Arc::clone(league), "Home - Away", m.url(), m.live))
            .collect()
    }

    fn extract_observations(
        &self,
        pages: &mut dyn PageSource,
        fixture: &Match,
        status: &mut RequestStatus,
    ) -> Option<MatchObservationSet> {
        self.site.extractions.fetch_add(1, Ordering::SeqCst);
        let hook = self.site.before_extract.lock().clone();
        if let Some(hook) = hook {
            hook(fixture);
        }
        self.site.events.lock().push(format!("extract:{}", fixture.web_key));
        let page = match pages.fetch(&fixture.url) {
            Ok(page) => page,
            Err(e) => {
                status.record(ScrapError::new("fetch failed").with_cause(e));
                return None;
            }
        };

        let delay = *self.site.extract_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let scripted_failure = {
            let mut failures = self.site.failures.lock();
            match failures.get_mut(&fixture.web_key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if scripted_failure || self.site.always_failing.lock().contains(&fixture.web_key) {
            status.record(ScrapError::new(format!("odds table missing for {}", fixture)).on_page(&page));
            return None;
        }

        let mut set = MatchObservationSet::new(fixture.clone(), None);
        let key = OddKey::new(MarketSection::new("1X2", "Full Time"), None, "Pinnacle", "1");
        if self.site.with_history.load(Ordering::SeqCst) {
            let opening = page.fetched_at - chrono::Duration::hours(1);
            set.add_observation(key.clone(), ObservationTime::At(opening), 1.8);
        }
        set.add_observation(key, ObservationTime::At(page.fetched_at), 2.0);
        self.site.extracted.lock().push(fixture.web_key.clone());
        Some(set)
    }
}

/// Store recording written records in write order
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub written: Arc<Mutex<Vec<String>>>,
    pub records: Arc<Mutex<Vec<MatchObservationSet>>>,
    pub events: Arc<Mutex<Vec<String>>>,
    pub failing: Arc<Mutex<BTreeSet<String>>>,
    pub delay: Duration,
    pub closed: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }
}

impl Store<MatchObservationSet> for RecordingStore {
    fn write(&mut self, record: &MatchObservationSet) -> std::result::Result<(), StoreError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.failing.lock().contains(&record.fixture.web_key) {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.events.lock().push(format!("write:{}", record.fixture.web_key));
        self.records.lock().push(record.clone());
        self.written.lock().push(record.fixture.web_key.clone());
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Orchestrator wired to the fake site and a recording store
pub struct Harness {
    pub site: Arc<FakeSite>,
    pub store: RecordingStore,
    pub orchestrator: Arc<Orchestrator<FakeFactory>>,
    pub pool: Arc<RenderingPool<FakeFactory>>,
}

impl Harness {
    pub fn new(site: Arc<FakeSite>, workers: usize, config: OrchestratorConfig) -> Self {
        Self::with_store(site, workers, config, RecordingStore::default())
    }

    pub fn with_store(
        site: Arc<FakeSite>,
        workers: usize,
        config: OrchestratorConfig,
        mut store: RecordingStore,
    ) -> Self {
        store.events = Arc::clone(&site.events);
        let pool_config = PoolConfig::default()
            .with_workers(workers)
            .with_session_retry_delay(Duration::from_millis(10));
        let pool = Arc::new(RenderingPool::new(
            FakeFactory {
                site: Arc::clone(&site),
            },
            &pool_config,
        ));
        let extractor = Arc::new(FakeExtractor {
            site: Arc::clone(&site),
        });
        let harvester = Arc::new(Harvester::new(Arc::clone(&pool), extractor));
        let queue = Arc::new(
            PersistenceQueue::start(store.clone(), Arc::new(LogWriteErrors), QueueConfig::default())
                .unwrap(),
        );
        let scheduler = PriorityScheduler::new(workers).unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            scheduler,
            harvester,
            Arc::new(NotificationBus::new()),
            Arc::new(SnapshotCell::new()),
            queue,
            config,
        ));
        Self {
            site,
            store,
            orchestrator,
            pool,
        }
    }

    /// Stop the orchestrator, close sessions and flush the queue
    pub fn shutdown(&self) {
        self.orchestrator.stop();
        self.orchestrator
            .scheduler()
            .await_termination(Duration::from_secs(10));
        self.pool.close();
        self.orchestrator.queue().close();
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Config with short cadences suitable for tests
pub fn fast_config(retry_limit: u32) -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        retry_limit,
        snapshot_poll: Duration::from_millis(20),
        ..OrchestratorConfig::default()
    };
    config.cadence.discovery_interval = Duration::from_secs(3600);
    config.cadence.live_interval = Duration::from_secs(3600);
    config.cadence.nonlive_initial_delay = Duration::ZERO;
    config.cadence.nonlive_interval = Duration::from_secs(3600);
    config
}
