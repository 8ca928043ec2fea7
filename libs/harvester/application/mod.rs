//! Orchestration core: parse steps, fan-out, retries, waves and triggers

pub mod error;
pub mod harvester;
pub mod notify;
pub mod observers;
pub mod orchestrator;
pub mod ports;
pub mod retry;
pub mod timer;

pub use error::{HarvestError, Result};
pub use harvester::Harvester;
pub use notify::{NotificationBus, ObserverGuard, ObserverId, ParseObserver, ParsedEntity, Propagation};
pub use observers::{DataQualityChecker, PersistingObserver};
pub use orchestrator::{
    Cadence, DiscoveryReport, HarvestPhase, Orchestrator, OrchestratorConfig, Triggers, WaveKind,
    WaveReport,
};
pub use ports::{PageExtractor, PageSource, PooledPages};
pub use retry::{RetryCoordinator, RetryOutcome};
pub use timer::PeriodicTrigger;
