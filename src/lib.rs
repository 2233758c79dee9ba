//! Sensor Relay - per-period values from cumulative home sensors.
//!
//! Weather sensors such as lightning detectors and rain gauges report a
//! running total. This library keeps a short history of those totals per
//! stream and republishes what accumulated over trailing windows (strikes in
//! the last 10 minutes, rain in the last hour and day), along with debounced
//! presence for motion sensors and unit-converted temperatures.
//!
//! # Guarantees
//!
//! - **Idempotent ingestion**: redelivered readings are dropped, never
//!   double-counted
//! - **Bounded memory**: a stream keeps no reading older than its longest
//!   window
//! - **Isolation**: a bad payload on one stream never affects another
//! - **No spurious deltas**: the first reading of a stream only sets a
//!   baseline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Sensor Relay                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Collector  │──▶│ Dispatcher  │──▶│   History   │        │
//! │  │   (lines)   │   │  (routes)   │   │ (per stream)│        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                      │        │             │               │
//! │                      ▼        ▼             ▼               │
//! │              ┌──────────┐ ┌──────────┐ ┌─────────────┐      │
//! │              │ Presence │ │ Convert  │ │Window deltas│      │
//! │              └──────────┘ └──────────┘ └─────────────┘      │
//! │                      │        │             │               │
//! │                      └────────┴──────┬──────┘               │
//! │                                      ▼                      │
//! │                               ┌─────────────┐               │
//! │                               │ Outbox/Sink │               │
//! │                               └─────────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sensor_relay::{config::Config, dispatch::Dispatcher, stats::create_shared_stats};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let (outbox, published) = crossbeam_channel::unbounded();
//! let relay = Dispatcher::new(
//!     &Config::default(),
//!     outbox,
//!     runtime.handle().clone(),
//!     create_shared_stats(),
//! );
//!
//! let topic = "rtl_433/tinyserver/devices/Acurite-6045M/A/106/strike_count";
//! relay.on_reading(topic, 1_700_000_000, "12").unwrap();
//! relay.on_reading(topic, 1_700_000_060, "15").unwrap();
//!
//! for publication in published.try_iter() {
//!     println!("{} {}", publication.topic, publication.payload);
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod publish;
pub mod stats;

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CollectorConfig, CollectorError, InboundMessage, LineCollector};
pub use config::{Config, ConfigError};
pub use core::{compute_deltas, History, PresenceTracker, Reading, Value, WindowDelta, WindowSpec};
pub use dispatch::{Dispatcher, Outcome};
pub use error::RelayError;
pub use publish::{Publication, Sink, StdoutSink};
pub use stats::{RelayStats, SharedStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingGatewayClient, GatewayClient, GatewayConfig, GatewayError, GatewaySink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
