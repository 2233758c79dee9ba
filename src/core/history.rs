//! Per-stream history of cumulative readings.
//!
//! Readings are kept in arrival order. Each ingest is followed by a prune
//! against the longest window of the stream, so the history never holds
//! anything older than what some window can still use.

use crate::core::reading::Reading;

/// Ordered, bounded history of one stream.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Readings in arrival order
    entries: Vec<Reading>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading unless an identical one is already stored.
    ///
    /// Returns `false` for a duplicate delivery, which leaves the history
    /// untouched.
    pub fn ingest(&mut self, reading: Reading) -> bool {
        if self.entries.contains(&reading) {
            return false;
        }
        self.entries.push(reading);
        true
    }

    /// Drop every entry older than `now - horizon_secs`.
    ///
    /// Returns how many entries were evicted.
    pub fn prune(&mut self, now: i64, horizon_secs: u64) -> usize {
        let horizon = i64::try_from(horizon_secs).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(horizon);
        let before = self.entries.len();
        self.entries.retain(|r| r.timestamp >= cutoff);
        before - self.entries.len()
    }

    /// Readings in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reading::Value;

    fn r(t: i64, v: i64) -> Reading {
        Reading::new(t, Value::Int(v))
    }

    #[test]
    fn test_ingest_drops_duplicates() {
        let mut history = History::new();

        assert!(history.ingest(r(10, 1)));
        assert!(!history.ingest(r(10, 1)));
        assert!(history.ingest(r(10, 2)));
        assert!(history.ingest(r(20, 1)));

        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_prune_removes_consecutive_stale_entries() {
        // Adjacent stale entries are the case a remove-while-iterating loop
        // gets wrong.
        let mut history = History::new();
        for (t, v) in [(0, 1), (5, 2), (10, 3), (100, 4), (200, 5)] {
            history.ingest(r(t, v));
        }

        let evicted = history.prune(200, 150);

        assert_eq!(evicted, 3);
        let times: Vec<i64> = history.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![100, 200]);
    }

    #[test]
    fn test_prune_keeps_boundary_entry() {
        let mut history = History::new();
        history.ingest(r(100, 1));
        history.ingest(r(3700, 2));

        history.prune(3700, 3600);
        assert_eq!(history.len(), 2);

        history.prune(3701, 3600);
        assert_eq!(history.len(), 1);
        assert_eq!(history.iter().next(), Some(&r(3700, 2)));
    }

    #[test]
    fn test_unbounded_horizon_evicts_nothing() {
        let mut history = History::new();
        history.ingest(r(1000, 1));
        history.ingest(r(1060, 5));

        assert_eq!(history.prune(1060, u64::MAX), 0);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_pruning_invariant_holds_after_every_cycle() {
        let mut history = History::new();
        let horizon = 600;

        for i in 0..500i64 {
            let now = i * 37;
            history.ingest(r(now, i));
            history.prune(now, horizon);
            assert!(history.iter().all(|e| e.timestamp >= now - horizon as i64));
        }
        // 600s of readings at a 37s cadence
        assert!(history.len() <= 17);
    }

    #[test]
    fn test_iter_keeps_arrival_order() {
        let mut history = History::new();
        history.ingest(r(50, 9));
        history.ingest(r(40, 7));
        history.ingest(r(40, 8));

        let stored: Vec<Reading> = history.iter().copied().collect();
        assert_eq!(stored, vec![r(50, 9), r(40, 7), r(40, 8)]);
    }
}
