//! Task priorities and heap ordering

use std::cmp::Ordering;
use std::fmt;

/// Scheduling priority of a task
///
/// Tiers are strictly ordered: a queued `High` task always runs before any
/// queued `Medium`, `Default` or `Low` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Default,
    Low,
}

impl Priority {
    /// Numeric rank, higher runs first
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Default => 1,
            Priority::Low => 0,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Default => "DEFAULT",
            Priority::Low => "LOW",
        };
        f.write_str(name)
    }
}

/// Heap entry: priority first, then submission order
pub(crate) struct QueuedTask<J> {
    pub priority: Priority,
    pub sequence: u64,
    pub job: J,
}

impl<J> PartialEq for QueuedTask<J> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<J> Eq for QueuedTask<J> {}

impl<J> PartialOrd for QueuedTask<J> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<J> Ord for QueuedTask<J> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins, lower sequence wins on ties
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
