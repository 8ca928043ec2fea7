//! Discovery passes, extraction waves and their cadence
//!
//! # Cycle
//!
//! ```text
//! Discovering ──(non-empty, not interrupted)──> SnapshotReady
//!      ▲                                            │
//!      │                                   ExtractingLive (HIGH)
//!      │                                            │
//!      └──────────────────────────────── ExtractingNonLive (LOW)
//! ```
//!
//! Discovery fans out through the notification bus: every sport or league
//! published by a parse step becomes a HIGH priority child task. A pass is
//! complete once every task it spawned has resolved. Only then is the
//! de-duplicated match list swapped into the [`SnapshotCell`]; a failed pass
//! leaves the previous snapshot in place.

use crate::application::error::{HarvestError, Result};
use crate::application::harvester::Harvester;
use crate::application::notify::{NotificationBus, ParseObserver, Propagation};
use crate::application::observers::PersistingObserver;
use crate::application::retry::RetryCoordinator;
use crate::application::timer::PeriodicTrigger;
use crate::domain::{
    CatalogSnapshot, League, Match, MatchObservationSet, RequestStatus, SnapshotCell, Sport,
};
use crate::infrastructure::persistence::PersistenceQueue;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use workpool::{Priority, PriorityScheduler, SessionFactory, TaskContext, TaskHandle, WorkPoolError};

/// When each activity runs
#[derive(Debug, Clone)]
pub struct Cadence {
    pub discovery_interval: Duration,
    pub live_interval: Duration,
    pub nonlive_initial_delay: Duration,
    pub nonlive_interval: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(30 * 60),
            live_interval: Duration::from_secs(30 * 60),
            nonlive_initial_delay: Duration::from_secs(30 * 60),
            nonlive_interval: Duration::from_secs(120 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retries per match and wave after the first attempt
    pub retry_limit: u32,
    pub cadence: Cadence,
    /// How often a wave waiting for the first snapshot re-checks shutdown
    pub snapshot_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            cadence: Cadence::default(),
            snapshot_poll: Duration::from_secs(1),
        }
    }
}

/// Last phase entered by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Idle,
    Discovering,
    SnapshotReady,
    ExtractingLive,
    ExtractingNonLive,
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarvestPhase::Idle => "Idle",
            HarvestPhase::Discovering => "Discovering",
            HarvestPhase::SnapshotReady => "SnapshotReady",
            HarvestPhase::ExtractingLive => "ExtractingLive",
            HarvestPhase::ExtractingNonLive => "ExtractingNonLive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveKind {
    Live,
    NonLive,
}

impl WaveKind {
    pub fn priority(self) -> Priority {
        match self {
            WaveKind::Live => Priority::High,
            WaveKind::NonLive => Priority::Low,
        }
    }

    fn selects_live(self) -> bool {
        self == WaveKind::Live
    }

    fn phase(self) -> HarvestPhase {
        match self {
            WaveKind::Live => HarvestPhase::ExtractingLive,
            WaveKind::NonLive => HarvestPhase::ExtractingNonLive,
        }
    }
}

impl fmt::Display for WaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveKind::Live => f.write_str("Live"),
            WaveKind::NonLive => f.write_str("NonLive"),
        }
    }
}

/// Outcome of a successful discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub generation: u64,
    pub sports: usize,
    pub leagues: usize,
    pub matches: usize,
    /// Parse errors reported by the pass' tasks
    pub errors: usize,
    pub elapsed: Duration,
}

/// Outcome of one extraction wave
#[derive(Debug, Clone)]
pub struct WaveReport {
    pub kind: WaveKind,
    /// Snapshot the wave worked from
    pub generation: u64,
    pub matches: usize,
    /// Matches extracted cleanly, stored or not
    pub succeeded: usize,
    /// Clean extractions the persistence queue refused
    pub dropped: usize,
    pub lost: usize,
    /// Matches abandoned because of shutdown
    pub interrupted: usize,
    pub elapsed: Duration,
}

impl WaveReport {
    /// Average wall time per match, in seconds
    pub fn seconds_per_match(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() / self.matches as f64
        }
    }
}

/// Drives discovery and extraction on a shared scheduler
pub struct Orchestrator<F: SessionFactory + 'static> {
    scheduler: PriorityScheduler,
    harvester: Arc<Harvester<F>>,
    bus: Arc<NotificationBus>,
    snapshots: Arc<SnapshotCell>,
    queue: Arc<PersistenceQueue<MatchObservationSet>>,
    config: OrchestratorConfig,
    shutdown: Arc<AtomicBool>,
    phase: Mutex<HarvestPhase>,
}

impl<F: SessionFactory + 'static> Orchestrator<F> {
    pub fn new(
        scheduler: PriorityScheduler,
        harvester: Arc<Harvester<F>>,
        bus: Arc<NotificationBus>,
        snapshots: Arc<SnapshotCell>,
        queue: Arc<PersistenceQueue<MatchObservationSet>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            scheduler,
            harvester,
            bus,
            snapshots,
            queue,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(HarvestPhase::Idle),
        }
    }

    pub fn phase(&self) -> HarvestPhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: HarvestPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!("Phase {} -> {}", *current, phase);
            *current = phase;
        }
    }

    pub fn scheduler(&self) -> &PriorityScheduler {
        &self.scheduler
    }

    pub fn harvester(&self) -> &Arc<Harvester<F>> {
        &self.harvester
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCell> {
        &self.snapshots
    }

    pub fn queue(&self) -> &Arc<PersistenceQueue<MatchObservationSet>> {
        &self.queue
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) || self.scheduler.is_cancelled()
    }

    /// Enumerate the whole catalog and publish a new snapshot on success
    pub fn run_discovery(&self) -> Result<DiscoveryReport> {
        if self.is_shutting_down() {
            return Err(HarvestError::ShuttingDown);
        }
        self.enter(HarvestPhase::Discovering);
        let start = Instant::now();
        info!("Discovery started");

        let bus = Arc::new(self.bus.fork());
        let discovery = Arc::new(DiscoveryObserver {
            scheduler: self.scheduler.clone(),
            harvester: Arc::clone(&self.harvester),
            bus: Arc::downgrade(&bus),
            pending: Mutex::new(VecDeque::new()),
            state: Mutex::new(DiscoveredMatches::default()),
            sports: AtomicUsize::new(0),
            leagues: AtomicUsize::new(0),
            rejected: AtomicBool::new(false),
        });
        let observer_id = bus.register(discovery.clone());

        let root = {
            let harvester = Arc::clone(&self.harvester);
            let bus = Arc::clone(&bus);
            self.scheduler
                .submit(Priority::High, move |ctx| harvester.expand_catalog(ctx, &bus))
        };
        let result = root.map_err(HarvestError::from).and_then(|handle| {
            discovery.pending.lock().push_back(handle);
            Ok(self.drain(&discovery))
        });
        bus.unregister(observer_id);
        let (errors, interrupted) = result?;

        let interrupted = interrupted
            || discovery.rejected.load(Ordering::Acquire)
            || self.is_shutting_down();
        let matches = std::mem::take(&mut discovery.state.lock().matches);
        let sports = discovery.sports.load(Ordering::Relaxed);
        let leagues = discovery.leagues.load(Ordering::Relaxed);
        let elapsed = start.elapsed();

        if interrupted {
            warn!("Discovery interrupted after {:?}, keeping previous snapshot", elapsed);
            return Err(HarvestError::Interrupted);
        }
        if matches.is_empty() {
            warn!("0 matches found, probably failed. Keeping previous snapshot");
            return Err(HarvestError::EmptyCatalog);
        }

        let count = matches.len();
        let generation = self.snapshots.publish(matches);
        self.enter(HarvestPhase::SnapshotReady);
        info!(
            generation,
            "Discovery done: {} sports, {} leagues, {} matches in {:?} ({} errors)",
            sports,
            leagues,
            count,
            elapsed,
            errors
        );

        Ok(DiscoveryReport {
            generation,
            sports,
            leagues,
            matches: count,
            errors,
            elapsed,
        })
    }

    /// Wait for every task of the pass, including those spawned meanwhile
    fn drain(&self, discovery: &DiscoveryObserver<F>) -> (usize, bool) {
        let mut errors = 0;
        let mut interrupted = false;
        loop {
            let next = discovery.pending.lock().pop_front();
            let Some(handle) = next else { break };
            match handle.wait() {
                Ok(status) => errors += status.errors().len(),
                Err(WorkPoolError::TaskPanicked(message)) => {
                    error!("Discovery task panicked: {}", message);
                    errors += 1;
                }
                Err(e) => {
                    debug!("Discovery task did not complete: {}", e);
                    interrupted = true;
                }
            }
        }
        (errors, interrupted)
    }

    /// Extract every match of the current snapshot selected by `kind`
    pub fn run_extraction_wave(&self, kind: WaveKind) -> Result<WaveReport> {
        let snapshot = self.await_snapshot()?;
        self.enter(kind.phase());
        let matches = snapshot.filter_live(kind.selects_live());
        let start = Instant::now();
        info!(
            generation = snapshot.generation,
            "{} wave started ({} matches)",
            kind,
            matches.len()
        );

        let bus = Arc::new(self.bus.fork());
        let persisting = Arc::new(PersistingObserver::new(Arc::clone(&self.queue)));
        bus.register(Arc::clone(&persisting) as Arc<dyn ParseObserver>);
        let retry = Arc::new(RetryCoordinator::new(self.config.retry_limit));

        let mut handles = Vec::with_capacity(matches.len());
        let mut rejected = 0;
        for fixture in matches.iter().cloned() {
            let harvester = Arc::clone(&self.harvester);
            let bus = Arc::clone(&bus);
            let retry = Arc::clone(&retry);
            let shutdown = Arc::clone(&self.shutdown);
            let submitted = self.scheduler.submit(kind.priority(), move |ctx| {
                retry.run_with_retry_while(
                    &fixture,
                    |_| harvester.extract_match(ctx, &fixture, &bus),
                    || !ctx.is_cancelled() && !shutdown.load(Ordering::Acquire),
                )
            });
            match submitted {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!("{} wave stopped submitting: {}", kind, e);
                    rejected = matches.len() - handles.len();
                    break;
                }
            }
        }

        let mut report = WaveReport {
            kind,
            generation: snapshot.generation,
            matches: matches.len(),
            succeeded: 0,
            dropped: 0,
            lost: 0,
            interrupted: rejected,
            elapsed: Duration::ZERO,
        };
        for handle in handles {
            match handle.wait() {
                Ok(outcome) if outcome.succeeded => report.succeeded += 1,
                Ok(outcome) if outcome.interrupted => report.interrupted += 1,
                Ok(_) => report.lost += 1,
                Err(WorkPoolError::TaskPanicked(_)) => report.lost += 1,
                Err(_) => report.interrupted += 1,
            }
        }
        report.elapsed = start.elapsed();
        report.dropped = persisting.dropped();

        info!(
            "{} done ({} matches in {:?}, {:.2} sec/match)",
            kind,
            report.matches,
            report.elapsed,
            report.seconds_per_match()
        );
        if report.lost > 0 || report.interrupted > 0 || report.dropped > 0 {
            warn!(
                "{} wave: {} ok ({} not stored), {} lost, {} interrupted",
                kind, report.succeeded, report.dropped, report.lost, report.interrupted
            );
        }
        Ok(report)
    }

    fn await_snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        let mut announced = false;
        loop {
            if self.is_shutting_down() {
                return Err(HarvestError::ShuttingDown);
            }
            if let Some(snapshot) = self.snapshots.wait_for_snapshot(self.config.snapshot_poll) {
                return Ok(snapshot);
            }
            if !announced {
                info!("Waiting for the first catalog snapshot");
                announced = true;
            }
        }
    }

    /// Start the discovery, live and non-live triggers
    pub fn start(self: &Arc<Self>) -> Result<Triggers> {
        let cadence = &self.config.cadence;
        let mut triggers = Triggers::default();

        let orchestrator = Arc::clone(self);
        triggers.add(spawn_trigger("discovery", Duration::ZERO, cadence.discovery_interval, move || {
            if let Err(e) = orchestrator.run_discovery() {
                warn!("Discovery failed: {}", e);
            }
        })?);

        for (kind, delay, interval) in [
            (WaveKind::Live, Duration::ZERO, cadence.live_interval),
            (WaveKind::NonLive, cadence.nonlive_initial_delay, cadence.nonlive_interval),
        ] {
            let orchestrator = Arc::clone(self);
            let name = match kind {
                WaveKind::Live => "live",
                WaveKind::NonLive => "nonlive",
            };
            triggers.add(spawn_trigger(name, delay, interval, move || {
                match orchestrator.run_extraction_wave(kind) {
                    Ok(_) => {}
                    Err(HarvestError::ShuttingDown) => debug!("{} wave skipped, shutting down", kind),
                    Err(e) => warn!("{} wave failed: {}", kind, e),
                }
            })?);
        }

        info!("Orchestrator started with {} triggers", triggers.len());
        Ok(triggers)
    }

    /// Stop scheduling and cancel queued work; returns discarded task count
    pub fn stop(&self) -> usize {
        self.shutdown.store(true, Ordering::Release);
        self.scheduler.cancel_now()
    }
}

fn spawn_trigger<J>(name: &str, delay: Duration, interval: Duration, job: J) -> Result<PeriodicTrigger>
where
    J: FnMut() + Send + 'static,
{
    PeriodicTrigger::spawn(name, delay, interval, job).map_err(|e| HarvestError::Trigger {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Running trigger threads
#[derive(Default)]
pub struct Triggers {
    triggers: Vec<PeriodicTrigger>,
}

impl Triggers {
    fn add(&mut self, trigger: PeriodicTrigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Prevent further runs without waiting
    pub fn stop_all(&mut self) {
        for trigger in &mut self.triggers {
            trigger.stop();
        }
    }

    /// Wait for every trigger thread, including a run in progress
    pub fn join_all(&mut self) {
        for trigger in &mut self.triggers {
            trigger.join();
        }
    }
}

#[derive(Default)]
struct DiscoveredMatches {
    seen: HashSet<String>,
    matches: Vec<Match>,
}

/// Turns published sports and leagues into child tasks and collects matches
struct DiscoveryObserver<F: SessionFactory + 'static> {
    scheduler: PriorityScheduler,
    harvester: Arc<Harvester<F>>,
    bus: Weak<NotificationBus>,
    pending: Mutex<VecDeque<TaskHandle<RequestStatus>>>,
    state: Mutex<DiscoveredMatches>,
    sports: AtomicUsize,
    leagues: AtomicUsize,
    rejected: AtomicBool,
}

impl<F: SessionFactory + 'static> DiscoveryObserver<F> {
    fn spawn<T>(&self, task: T) -> Propagation
    where
        T: FnOnce(&TaskContext, &Harvester<F>, &NotificationBus) -> RequestStatus
            + Send
            + 'static,
    {
        let Some(bus) = self.bus.upgrade() else {
            return Propagation::Stop;
        };
        let harvester = Arc::clone(&self.harvester);
        match self
            .scheduler
            .submit(Priority::High, move |ctx| task(ctx, &*harvester, &*bus))
        {
            Ok(handle) => {
                self.pending.lock().push_back(handle);
                Propagation::Continue
            }
            Err(e) => {
                debug!("Discovery task rejected: {}", e);
                self.rejected.store(true, Ordering::Release);
                Propagation::Stop
            }
        }
    }
}

impl<F: SessionFactory + 'static> ParseObserver for DiscoveryObserver<F> {
    fn on_sport(&self, _status: &RequestStatus, sport: &Sport) -> Propagation {
        self.sports.fetch_add(1, Ordering::Relaxed);
        let sport = sport.clone();
        self.spawn(move |ctx, harvester, bus| harvester.expand_sport(ctx, &sport, bus))
    }

    fn on_league(&self, _status: &RequestStatus, league: &League) -> Propagation {
        self.leagues.fetch_add(1, Ordering::Relaxed);
        let league = Arc::new(league.clone());
        self.spawn(move |ctx, harvester, bus| harvester.expand_league(ctx, &league, bus))
    }

    fn on_match(&self, _status: &RequestStatus, fixture: &Match) -> Propagation {
        let mut state = self.state.lock();
        if state.seen.insert(fixture.web_key.clone()) {
            state.matches.push(fixture.clone());
        } else {
            debug!("Duplicate {} ignored", fixture);
        }
        Propagation::Continue
    }
}
