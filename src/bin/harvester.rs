//! Harvester Binary - Odds Harvesting Daemon
//!
//! Discovers the catalog, extracts live and non-live odds on their cadences
//! and persists every observation set, until Ctrl+C.
//!
//! Usage:
//!   HARVESTER_CONFIG_PATH=config/harvester.yaml ./harvester
//!   ./harvester custom/harvester.yaml

use anyhow::Result;
use harvester::application::{DataQualityChecker, Harvester, NotificationBus, Orchestrator, Triggers};
use harvester::domain::{MatchObservationSet, SnapshotCell};
use harvester::infrastructure::persistence::{LogWriteErrors, PersistenceQueue};
use harvester::infrastructure::{
    init_tracing, ErrorReportWriter, HarvesterConfig, HtmlPageExtractor, HttpSessionFactory,
    SqliteStore,
};
use harvester::utils::{Heartbeat, ShutdownManager};
use odds_harvester::bin_common::{
    load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig, ShutdownStages,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use workpool::{PriorityScheduler, RenderingPool};

type Queue = Arc<PersistenceQueue<MatchObservationSet>>;

struct HarvesterDaemon {
    run_config: RunConfig,
    config: HarvesterConfig,
    shutdown: Arc<ShutdownManager>,
}

impl BinaryRunner for HarvesterDaemon {
    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    async fn run(&mut self) -> Result<()> {
        let config = &self.config;

        // The store owns a blocking runtime: open it and hand it to the
        // writer thread away from the async workers
        let db_path = config.database.path.clone();
        let queue_config = config.queue_config();
        let queue: Queue = tokio::task::spawn_blocking(move || -> Result<Queue> {
            let store = SqliteStore::open(&db_path)?;
            let queue = PersistenceQueue::start(store, Arc::new(LogWriteErrors), queue_config)?;
            Ok(Arc::new(queue))
        })
        .await??;

        let pool_config = config.pool_config();
        info!(
            "Starting {} workers (session attempts: {}, retry delay: {:?})",
            pool_config.workers, pool_config.session_attempts, pool_config.session_retry_delay
        );
        let factory = HttpSessionFactory::new(config.http_config())?;
        if factory.config().username.is_none() {
            warn!("No credentials configured, pages behind a login will fail");
        }
        let pool = Arc::new(RenderingPool::new(factory, &pool_config));
        let scheduler = PriorityScheduler::new(pool_config.workers)?;

        let extractor = Arc::new(HtmlPageExtractor::new(config.source.base_url.clone())?);
        let harvester = Arc::new(Harvester::new(Arc::clone(&pool), extractor));

        let bus = Arc::new(NotificationBus::new());
        bus.register(Arc::new(DataQualityChecker::new()));
        if let Some(dir) = &config.error_report_dir {
            let writer = ErrorReportWriter::new(dir)?;
            info!("Writing error reports to {}", writer.dir().display());
            bus.register(Arc::new(writer));
        }

        let orchestrator = Arc::new(Orchestrator::new(
            scheduler,
            harvester,
            bus,
            Arc::new(SnapshotCell::new()),
            Arc::clone(&queue),
            config.orchestrator_config(),
        ));
        let triggers = orchestrator.start()?;

        let mut heartbeat = Heartbeat::new(self.run_config.heartbeat_interval());
        while self.shutdown.interruptible_sleep(Duration::from_secs(1)).await {
            if heartbeat.should_beat() {
                log_heartbeat(&orchestrator, &pool, &queue, &heartbeat);
                heartbeat.beat();
            }
        }

        let termination_timeout = config.termination_timeout();
        let stages = tokio::task::spawn_blocking(move || {
            shutdown_in_order(orchestrator, triggers, pool, queue, termination_timeout)
        })
        .await?;
        info!("Shutdown complete:\n{}", stages.summary());
        Ok(())
    }
}

fn log_heartbeat(
    orchestrator: &Orchestrator<HttpSessionFactory>,
    pool: &RenderingPool<HttpSessionFactory>,
    queue: &PersistenceQueue<MatchObservationSet>,
    heartbeat: &Heartbeat,
) {
    let snapshot = orchestrator.snapshots().current();
    let scheduler = orchestrator.scheduler();
    let stored = queue.stats();
    info!(
        "Heartbeat #{}: phase {}, snapshot {} ({} matches), tasks {} queued / {} active, {} sessions, store queue {} (written {}, failed {}, refused {}), up {:?}",
        heartbeat.beats() + 1,
        orchestrator.phase(),
        snapshot.as_ref().map_or(0, |s| s.generation),
        snapshot.as_ref().map_or(0, |s| s.len()),
        scheduler.queued(),
        scheduler.active(),
        pool.live_sessions(),
        queue.len(),
        stored.written,
        stored.failed,
        stored.rejected,
        heartbeat.uptime()
    );
}

/// Stop in dependency order: no new work, then no running work, then
/// sessions, then the store
fn shutdown_in_order(
    orchestrator: Arc<Orchestrator<HttpSessionFactory>>,
    mut triggers: Triggers,
    pool: Arc<RenderingPool<HttpSessionFactory>>,
    queue: Queue,
    termination_timeout: Duration,
) -> ShutdownStages {
    let mut stages = ShutdownStages::new();

    stages.run("stop triggers", || triggers.stop_all());
    let discarded = stages.run("cancel queued tasks", || orchestrator.stop());
    info!("{} queued tasks discarded", discarded);

    let terminated = stages.run("await running tasks", || {
        orchestrator.scheduler().await_termination(termination_timeout)
    });
    if !terminated {
        warn!("Tasks still running after {:?}", termination_timeout);
    }

    stages.run("join triggers", || triggers.join_all());
    let closed = stages.run("close sessions", || pool.close());
    info!("{} sessions closed", closed);

    stages.run("flush store", || queue.close());
    let stored = queue.stats();
    info!(
        "Stored {} observation sets ({} failed, {} discarded)",
        stored.written, stored.failed, stored.discarded
    );

    // Sessions hold blocking clients; release them here, off the runtime
    drop(orchestrator);
    drop(pool);
    stages
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

    // Priority: CLI arg > HARVESTER_CONFIG_PATH > default
    let args = parse_args();
    let config_type = match args.first() {
        Some(path) => ConfigType::Custom(path.clone()),
        None => ConfigType::Harvester,
    };
    let config_path = load_config_from_env(config_type);
    let config = HarvesterConfig::load(&config_path)?;

    // Initialize logging
    init_tracing(config.log_level.as_str());
    if config_path.exists() {
        info!("Configuration loaded from {}", config_path.display());
    } else {
        warn!("Config file {} not found, running with defaults", config_path.display());
    }
    info!("Started at {}", chrono::Utc::now().to_rfc3339());

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.spawn_signal_handler();

    let mut daemon = HarvesterDaemon {
        run_config: RunConfig::new("Odds Harvester").with_heartbeat(config.heartbeat_interval_secs),
        config,
        shutdown,
    };
    daemon.execute().await
}
