//! Atomic relay counters with optional persistence.
//!
//! Only counters are persisted. Stream histories always start empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Relay statistics for the current process.
#[derive(Debug)]
pub struct RelayStats {
    /// Messages handed to the dispatcher
    received: AtomicU64,
    /// Publications delivered to the sink
    published: AtomicU64,
    /// Redeliveries dropped by dedup
    duplicates: AtomicU64,
    /// Payloads that did not parse
    malformed: AtomicU64,
    /// Messages on topics no stream is configured for
    unrouted: AtomicU64,
    /// Publications the sink rejected
    publish_failures: AtomicU64,
    /// Unique id of this relay run
    instance_id: String,
    /// Run start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl RelayStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            published: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            unrouted: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            instance_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that continue the counts stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            debug!("Could not load previous relay stats: {e}");
        }

        stats
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Get the current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Relay Statistics:\n\
             - Messages received: {}\n\
             - Values published: {}\n\
             - Duplicate deliveries dropped: {}\n\
             - Malformed readings dropped: {}\n\
             - Unrouted messages: {}\n\
             - Publish failures: {}\n\
             - Uptime: {} seconds",
            stats.received,
            stats.published,
            stats.duplicates,
            stats.malformed,
            stats.unrouted,
            stats.publish_failures,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                received: stats.received,
                published: stats.published,
                duplicates: stats.duplicates,
                malformed: stats.malformed,
                unrouted: stats.unrouted,
                publish_failures: stats.publish_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.received.store(persisted.received, Ordering::Relaxed);
                self.published.store(persisted.published, Ordering::Relaxed);
                self.duplicates
                    .store(persisted.duplicates, Ordering::Relaxed);
                self.malformed.store(persisted.malformed, Ordering::Relaxed);
                self.unrouted.store(persisted.unrouted, Ordering::Relaxed);
                self.publish_failures
                    .store(persisted.publish_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub published: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub unrouted: u64,
    pub publish_failures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    received: u64,
    published: u64,
    duplicates: u64,
    malformed: u64,
    unrouted: u64,
    publish_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<RelayStats>;

/// Create new shared statistics.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(RelayStats::new())
}

/// Create new shared statistics with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(RelayStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_summary() {
        let stats = RelayStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_duplicate();
        stats.record_malformed();

        let snapshot = stats.stats();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.published, 0);

        let summary = stats.summary();
        assert!(summary.contains("Messages received: 2"));
        assert!(summary.contains("Duplicate deliveries dropped: 1"));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("sensor-relay-stats-{}", Uuid::new_v4()))
            .join("stats.json");

        let stats = RelayStats::with_persistence(path.clone());
        stats.record_received();
        stats.record_published();
        stats.save().unwrap();

        let reloaded = RelayStats::with_persistence(path.clone());
        assert_eq!(reloaded.stats().received, 1);
        assert_eq!(reloaded.stats().published, 1);
        assert_ne!(reloaded.instance_id(), stats.instance_id());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
