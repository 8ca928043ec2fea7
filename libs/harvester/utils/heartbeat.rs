//! Heartbeat logging for the daemon

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracks heartbeat intervals for periodic status logging
pub struct Heartbeat {
    interval: Duration,
    started: DateTime<Utc>,
    last_beat: DateTime<Utc>,
    beats: u64,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        let now = Utc::now();
        Self {
            interval,
            started: now,
            last_beat: now,
            beats: 0,
        }
    }

    /// Check if enough time has passed since the last beat
    pub fn should_beat(&self) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_beat);
        elapsed.to_std().unwrap_or_default() >= self.interval
    }

    /// Record a heartbeat at the current time
    pub fn beat(&mut self) {
        self.last_beat = Utc::now();
        self.beats += 1;
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }

    /// Time since the heartbeat was created
    pub fn uptime(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.started)
            .to_std()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_after_interval() {
        let mut heartbeat = Heartbeat::new(Duration::from_millis(30));
        assert!(!heartbeat.should_beat());

        std::thread::sleep(Duration::from_millis(50));
        assert!(heartbeat.should_beat());

        heartbeat.beat();
        assert!(!heartbeat.should_beat());
        assert_eq!(heartbeat.beats(), 1);
        assert!(heartbeat.uptime() >= Duration::from_millis(50));
    }
}
