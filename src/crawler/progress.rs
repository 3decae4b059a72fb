//! Named progress counters
//!
//! Purely observational: counters never influence which units get fetched,
//! with one documented exception — the cached-page skip path reads the
//! per-year counter to estimate how many orders a skipped page covered.

use std::collections::HashMap;

/// A single named counter with an expected total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    pub total: u64,
}

impl Counter {
    /// Units still expected, saturating at zero when the total was under
    /// estimated
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.count)
    }
}

/// Tracks named counters for observability
#[derive(Debug, Default)]
pub struct Progress {
    counters: HashMap<String, Counter>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or resets) a counter with its expected total
    pub fn start(&mut self, label: &str, total: u64) {
        self.counters
            .insert(label.to_string(), Counter { count: 0, total });
    }

    /// Advances a counter; unknown labels are created on the fly
    pub fn advance(&mut self, label: &str, n: u64) {
        let counter = self.counters.entry(label.to_string()).or_default();
        counter.count += n;
        tracing::debug!("{}: {}/{}", label, counter.count, counter.total);
    }

    /// Current value of a counter (zero when unknown)
    pub fn count(&self, label: &str) -> u64 {
        self.counters.get(label).map(|c| c.count).unwrap_or(0)
    }

    /// Snapshot of a counter (zeroed when unknown)
    pub fn counter(&self, label: &str) -> Counter {
        self.counters.get(label).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_advance() {
        let mut progress = Progress::new();
        progress.start("orders/2022", 45);

        progress.advance("orders/2022", 20);
        progress.advance("orders/2022", 5);

        assert_eq!(progress.count("orders/2022"), 25);
        assert_eq!(progress.counter("orders/2022").remaining(), 20);
    }

    #[test]
    fn test_unknown_labels_default_to_zero() {
        let progress = Progress::new();
        assert_eq!(progress.count("nope"), 0);
        assert_eq!(progress.counter("nope"), Counter::default());
    }

    #[test]
    fn test_advance_creates_missing_counter() {
        let mut progress = Progress::new();
        progress.advance("orders/all", 3);
        assert_eq!(progress.count("orders/all"), 3);
    }

    #[test]
    fn test_restart_resets_count() {
        let mut progress = Progress::new();
        progress.start("years", 5);
        progress.advance("years", 2);

        progress.start("years", 6);
        assert_eq!(progress.count("years"), 0);
        assert_eq!(progress.counter("years").total, 6);
    }

    #[test]
    fn test_remaining_saturates() {
        let counter = Counter { count: 10, total: 8 };
        assert_eq!(counter.remaining(), 0);
    }
}
