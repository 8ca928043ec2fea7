//! Last published catalog of matches

use crate::domain::models::Match;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable result of one successful discovery pass
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub generation: u64,
    pub published_at: DateTime<Utc>,
    matches: Arc<Vec<Match>>,
}

impl CatalogSnapshot {
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matches whose live flag equals `live`, in discovery order
    pub fn filter_live(&self, live: bool) -> Vec<Match> {
        self.matches
            .iter()
            .filter(|m| m.is_live == live)
            .cloned()
            .collect()
    }
}

/// Holder of the current snapshot
///
/// Publishing swaps the whole snapshot under the lock: readers see either the
/// previous list or the new one, never a mix.
#[derive(Default)]
pub struct SnapshotCell {
    current: Mutex<Option<Arc<CatalogSnapshot>>>,
    published: Condvar,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot, returning the new generation
    pub fn publish(&self, matches: Vec<Match>) -> u64 {
        let mut current = self.current.lock();
        let generation = current.as_ref().map_or(1, |s| s.generation + 1);
        *current = Some(Arc::new(CatalogSnapshot {
            generation,
            published_at: Utc::now(),
            matches: Arc::new(matches),
        }));
        self.published.notify_all();
        generation
    }

    pub fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.lock().clone()
    }

    /// Block until a snapshot exists or `timeout` elapses
    pub fn wait_for_snapshot(&self, timeout: Duration) -> Option<Arc<CatalogSnapshot>> {
        let deadline = Instant::now() + timeout;
        let mut current = self.current.lock();
        while current.is_none() {
            if self.published.wait_until(&mut current, deadline).timed_out() {
                break;
            }
        }
        current.clone()
    }
}
