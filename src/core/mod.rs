//! Core functionality for the Sensor Relay.
//!
//! This module contains:
//! - Readings and their per-stream history
//! - The sliding-window delta engine and output rounding
//! - Debounced presence tracking for motion sensors
//! - Stateless unit conversions

pub mod convert;
pub mod history;
pub mod presence;
pub mod reading;
pub mod rounding;
pub mod window;

// Re-export commonly used types
pub use convert::Conversion;
pub use history::History;
pub use presence::{InactivePolicy, MotionSignal, PresenceState, PresenceTracker};
pub use reading::{quantize, ParseRule, Reading, Value};
pub use rounding::{format_rounded, round_half_away};
pub use window::{compute_deltas, WindowDelta, WindowSpec};
