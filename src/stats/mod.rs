//! Relay statistics.
//!
//! Counters of what the relay has seen and sent, for the `status` command,
//! the HTTP `/stats` endpoint and the summary printed on shutdown.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, RelayStats, SharedStats,
    StatsSnapshot,
};
