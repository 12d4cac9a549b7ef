//! Performance counters for nodes and graphs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running timing statistics, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perf {
    /// Number of recorded runs.
    pub num: u64,
    /// Duration of the most recent run.
    pub last: u64,
    /// Shortest run.
    pub min: u64,
    /// Longest run.
    pub max: u64,
    /// Total over all runs.
    pub sum: u64,
    /// Mean run time.
    pub avg: u64,
}

impl Perf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one run.
    pub fn record(&mut self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.min = if self.num == 0 { ns } else { self.min.min(ns) };
        self.max = self.max.max(ns);
        self.num += 1;
        self.last = ns;
        self.sum = self.sum.saturating_add(ns);
        self.avg = self.sum / self.num;
    }

    /// Average run time as a duration.
    pub fn average(&self) -> Duration {
        Duration::from_nanos(self.avg)
    }

    /// Clear all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
