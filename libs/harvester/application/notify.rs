//! Fan-out of parsed entities to registered observers
//!
//! # Early stop
//!
//! Every registered observer sees every entity, in registration order. The
//! aggregate result of a publish is `Stop` iff at least one observer asked to
//! stop; the producer then abandons the rest of its current enumeration.
//! Delivery itself is never cut short.

use crate::domain::{League, Match, MatchObservationSet, RequestStatus, ScrapError, Sport};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Observer verdict for one delivered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

impl Propagation {
    #[inline]
    pub fn is_stop(self) -> bool {
        self == Propagation::Stop
    }

    /// Aggregate two verdicts: stop wins
    #[inline]
    pub fn and(self, other: Propagation) -> Propagation {
        if self.is_stop() || other.is_stop() {
            Propagation::Stop
        } else {
            Propagation::Continue
        }
    }
}

/// Entity produced by a parse step
#[derive(Debug, Clone, Copy)]
pub enum ParsedEntity<'a> {
    Sport(&'a Sport),
    League(&'a League),
    Match(&'a Match),
    Observations(&'a MatchObservationSet),
}

impl<'a> ParsedEntity<'a> {
    fn deliver(self, observer: &dyn ParseObserver, status: &RequestStatus) -> Propagation {
        match self {
            ParsedEntity::Sport(sport) => observer.on_sport(status, sport),
            ParsedEntity::League(league) => observer.on_league(status, league),
            ParsedEntity::Match(fixture) => observer.on_match(status, fixture),
            ParsedEntity::Observations(set) => observer.on_observations(status, set),
        }
    }
}

/// Receiver of parse results
///
/// All handlers default to doing nothing and continuing.
pub trait ParseObserver: Send + Sync {
    fn on_sport(&self, _status: &RequestStatus, _sport: &Sport) -> Propagation {
        Propagation::Continue
    }

    fn on_league(&self, _status: &RequestStatus, _league: &League) -> Propagation {
        Propagation::Continue
    }

    fn on_match(&self, _status: &RequestStatus, _fixture: &Match) -> Propagation {
        Propagation::Continue
    }

    fn on_observations(&self, _status: &RequestStatus, _set: &MatchObservationSet) -> Propagation {
        Propagation::Continue
    }

    fn on_error(&self, _error: &ScrapError) {}
}

/// Registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Explicit observer registry
///
/// Observers are held strongly until unregistered. `fork` gives a run or a
/// wave its own bus so it can attach observers for exactly its lifetime.
pub struct NotificationBus {
    observers: RwLock<Vec<(ObserverId, Arc<dyn ParseObserver>)>>,
    next_id: Arc<AtomicU64>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn register(&self, observer: Arc<dyn ParseObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Register `observer` until the returned guard is dropped
    pub fn register_scoped(self: &Arc<Self>, observer: Arc<dyn ParseObserver>) -> ObserverGuard {
        let id = self.register(observer);
        ObserverGuard {
            bus: Arc::clone(self),
            id,
        }
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Deliver `entity` to every observer and aggregate their verdicts
    pub fn publish(&self, status: &RequestStatus, entity: ParsedEntity<'_>) -> Propagation {
        // Deliver outside the lock so observers may (un)register
        let observers = self.snapshot();
        let mut verdict = Propagation::Continue;
        for observer in &observers {
            verdict = verdict.and(entity.deliver(observer.as_ref(), status));
        }
        if verdict.is_stop() {
            debug!("Observer requested stop after {:?}", entity_kind(entity));
        }
        verdict
    }

    /// Deliver `error` to every observer
    pub fn report_error(&self, error: &ScrapError) {
        for observer in self.snapshot() {
            observer.on_error(error);
        }
    }

    /// New bus starting with this bus' observers
    pub fn fork(&self) -> NotificationBus {
        NotificationBus {
            observers: RwLock::new(self.observers.read().clone()),
            next_id: Arc::clone(&self.next_id),
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ParseObserver>> {
        self.observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

fn entity_kind(entity: ParsedEntity<'_>) -> &'static str {
    match entity {
        ParsedEntity::Sport(_) => "sport",
        ParsedEntity::League(_) => "league",
        ParsedEntity::Match(_) => "match",
        ParsedEntity::Observations(_) => "observations",
    }
}

/// Unregisters its observer when dropped
pub struct ObserverGuard {
    bus: Arc<NotificationBus>,
    id: ObserverId,
}

impl ObserverGuard {
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.bus.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        name: &'static str,
        verdict: Propagation,
        calls: AtomicUsize,
        errors: AtomicUsize,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Counting {
        fn new(name: &'static str, verdict: Propagation, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                verdict,
                calls: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
                log: Arc::clone(log),
            })
        }
    }

    impl ParseObserver for Counting {
        fn on_sport(&self, _status: &RequestStatus, _sport: &Sport) -> Propagation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.name);
            self.verdict
        }

        fn on_error(&self, _error: &ScrapError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_is_aggregate_and_all_observers_called() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = NotificationBus::new();
        let first = Counting::new("first", Propagation::Continue, &log);
        let second = Counting::new("second", Propagation::Stop, &log);
        let third = Counting::new("third", Propagation::Continue, &log);
        bus.register(first.clone());
        bus.register(second.clone());
        bus.register(third.clone());

        let sport = Sport::new("soccer");
        let verdict = bus.publish(&RequestStatus::new(), ParsedEntity::Sport(&sport));

        assert_eq!(verdict, Propagation::Stop);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
        for observer in [&first, &second, &third] {
            assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_continue_when_nobody_stops() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = NotificationBus::new();
        bus.register(Counting::new("a", Propagation::Continue, &log));
        bus.register(Counting::new("b", Propagation::Continue, &log));

        let sport = Sport::new("tennis");
        assert_eq!(
            bus.publish(&RequestStatus::new(), ParsedEntity::Sport(&sport)),
            Propagation::Continue
        );
    }

    #[test]
    fn test_default_handlers_continue() {
        struct Silent;
        impl ParseObserver for Silent {}

        let bus = NotificationBus::new();
        bus.register(Arc::new(Silent));
        let sport = Sport::new("soccer");
        assert_eq!(
            bus.publish(&RequestStatus::new(), ParsedEntity::Sport(&sport)),
            Propagation::Continue
        );
    }

    #[test]
    fn test_unregister_and_scoped_guard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(NotificationBus::new());
        let id = bus.register(Counting::new("kept", Propagation::Continue, &log));

        {
            let _guard = bus.register_scoped(Counting::new("scoped", Propagation::Stop, &log));
            assert_eq!(bus.len(), 2);
        }
        assert_eq!(bus.len(), 1);

        assert!(bus.unregister(id));
        assert!(!bus.unregister(id));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_fork_is_independent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base = NotificationBus::new();
        base.register(Counting::new("base", Propagation::Continue, &log));

        let fork = base.fork();
        fork.register(Counting::new("wave", Propagation::Continue, &log));
        assert_eq!(base.len(), 1);
        assert_eq!(fork.len(), 2);

        let sport = Sport::new("soccer");
        fork.publish(&RequestStatus::new(), ParsedEntity::Sport(&sport));
        assert_eq!(*log.lock(), vec!["base", "wave"]);
    }

    #[test]
    fn test_report_error_reaches_everyone() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = NotificationBus::new();
        let a = Counting::new("a", Propagation::Stop, &log);
        let b = Counting::new("b", Propagation::Continue, &log);
        bus.register(a.clone());
        bus.register(b.clone());

        bus.report_error(&ScrapError::new("bad row"));
        assert_eq!(a.errors.load(Ordering::SeqCst), 1);
        assert_eq!(b.errors.load(Ordering::SeqCst), 1);
    }
}
