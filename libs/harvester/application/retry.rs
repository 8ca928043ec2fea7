//! Bounded per-match retry of extraction attempts

use crate::domain::{Match, RequestStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, warn};

/// Result of driving one match through the retry policy
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Number of times the operation ran
    pub attempts: u32,
    /// Whether the last attempt returned an ok status
    pub succeeded: bool,
    /// Errors from every attempt, in order
    pub status: RequestStatus,
    /// Retrying was abandoned because the caller stopped it
    pub interrupted: bool,
}

impl RetryOutcome {
    /// True when every allowed attempt failed
    pub fn is_data_lost(&self) -> bool {
        !self.succeeded && !self.interrupted
    }
}

/// Per-wave retry bookkeeping keyed by match web key
///
/// Shared by every task of one wave; a fresh coordinator is used for each
/// wave so counts never leak across waves.
pub struct RetryCoordinator {
    retry_limit: u32,
    attempts: Mutex<HashMap<String, u32>>,
    lost: AtomicUsize,
}

impl RetryCoordinator {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            attempts: Mutex::new(HashMap::new()),
            lost: AtomicUsize::new(0),
        }
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Run `operation` for `fixture` until it succeeds or the limit is hit
    ///
    /// The operation receives the zero-based attempt number. A permanently
    /// failing operation runs `retry_limit + 1` times, after which the loss is
    /// logged and reported through the outcome.
    pub fn run_with_retry<F>(&self, fixture: &Match, operation: F) -> RetryOutcome
    where
        F: FnMut(u32) -> RequestStatus,
    {
        self.run_with_retry_while(fixture, operation, || true)
    }

    /// Like [`run_with_retry`](Self::run_with_retry), but no further attempt
    /// starts once `proceed` returns false. An interrupted match is not
    /// counted as lost.
    pub fn run_with_retry_while<F, P>(&self, fixture: &Match, mut operation: F, proceed: P) -> RetryOutcome
    where
        F: FnMut(u32) -> RequestStatus,
        P: Fn() -> bool,
    {
        let mut aggregated = RequestStatus::new();
        let mut attempt: u32 = 0;

        loop {
            let status = operation(attempt);
            let succeeded = status.ok();
            aggregated.merge(status);
            attempt += 1;

            if succeeded {
                return RetryOutcome {
                    attempts: attempt,
                    succeeded: true,
                    status: aggregated,
                    interrupted: false,
                };
            }

            let failures = self.record_failure(&fixture.web_key);
            if failures > self.retry_limit {
                self.lost.fetch_add(1, Ordering::Relaxed);
                error!(
                    web_key = %fixture.web_key,
                    "FATAL, {} could not be parsed in {} attempts, DATA LOST",
                    fixture,
                    attempt
                );
                return RetryOutcome {
                    attempts: attempt,
                    succeeded: false,
                    status: aggregated,
                    interrupted: false,
                };
            }

            if !proceed() {
                debug!(web_key = %fixture.web_key, "Retry of {} interrupted", fixture);
                return RetryOutcome {
                    attempts: attempt,
                    succeeded: false,
                    status: aggregated,
                    interrupted: true,
                };
            }

            warn!(
                web_key = %fixture.web_key,
                "{} failed (attempt {}/{}), retrying",
                fixture,
                attempt,
                self.retry_limit + 1
            );
        }
    }

    fn record_failure(&self, web_key: &str) -> u32 {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(web_key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Failed attempts recorded so far for `web_key`
    pub fn failures(&self, web_key: &str) -> u32 {
        self.attempts.lock().get(web_key).copied().unwrap_or(0)
    }

    /// Matches given up on in this wave
    pub fn lost(&self) -> usize {
        self.lost.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Country, League, ScrapError, Sport};
    use std::sync::Arc;

    fn fixture(key: &str) -> Match {
        let league = Arc::new(League::new(
            Sport::new("soccer"),
            Country::new("Spain"),
            "LaLiga",
            "/soccer/spain/laliga/",
        ));
        Match::with_key(league, "A - B", format!("/m/a-b-{}/", key), false, key)
    }

    fn failed(message: &str) -> RequestStatus {
        let mut status = RequestStatus::new();
        status.record(ScrapError::new(message));
        status
    }

    #[test]
    fn test_always_failing_runs_limit_plus_one() {
        let coordinator = RetryCoordinator::new(3);
        let mut calls = 0;

        let outcome = coordinator.run_with_retry(&fixture("AbCd1234"), |attempt| {
            assert_eq!(attempt, calls);
            calls += 1;
            failed("no table")
        });

        assert_eq!(calls, 4);
        assert_eq!(outcome.attempts, 4);
        assert!(outcome.is_data_lost());
        assert_eq!(outcome.status.errors().len(), 4);
        assert_eq!(coordinator.failures("AbCd1234"), 4);
        assert_eq!(coordinator.lost(), 1);
    }

    #[test]
    fn test_success_stops_retrying() {
        let coordinator = RetryCoordinator::new(3);
        let mut calls = 0;

        let outcome = coordinator.run_with_retry(&fixture("QwEr5678"), |_| {
            calls += 1;
            if calls < 3 {
                failed("flaky")
            } else {
                RequestStatus::new()
            }
        });

        assert_eq!(calls, 3);
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.status.errors().len(), 2);
        assert_eq!(coordinator.lost(), 0);
    }

    #[test]
    fn test_zero_limit_runs_once() {
        let coordinator = RetryCoordinator::new(0);
        let mut calls = 0;
        let outcome = coordinator.run_with_retry(&fixture("Zz001122"), |_| {
            calls += 1;
            failed("nope")
        });
        assert_eq!(calls, 1);
        assert!(outcome.is_data_lost());
    }

    #[test]
    fn test_interrupted_retry_is_not_a_loss() {
        let coordinator = RetryCoordinator::new(5);
        let mut calls = 0;
        let outcome = coordinator.run_with_retry_while(
            &fixture("Cccc3333"),
            |_| {
                calls += 1;
                failed("offline")
            },
            || false,
        );
        assert_eq!(calls, 1);
        assert!(outcome.interrupted);
        assert!(!outcome.is_data_lost());
        assert_eq!(coordinator.lost(), 0);
    }

    #[test]
    fn test_counts_are_per_match() {
        let coordinator = RetryCoordinator::new(1);
        coordinator.run_with_retry(&fixture("Aaaa1111"), |_| failed("x"));
        coordinator.run_with_retry(&fixture("Bbbb2222"), |_| RequestStatus::new());
        assert_eq!(coordinator.failures("Aaaa1111"), 2);
        assert_eq!(coordinator.failures("Bbbb2222"), 0);
    }
}
