//! Message collection for the Sensor Relay.
//!
//! The broker connection itself lives outside the relay. A collector turns
//! whatever carries the bus traffic into [`InboundMessage`]s on a channel.

pub mod lines;
pub mod types;

// Re-export commonly used types
pub use lines::{CollectorConfig, CollectorError, LineCollector};
pub use types::InboundMessage;
