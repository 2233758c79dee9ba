//! Error types for the Sensor Relay.

use thiserror::Error;

/// Errors raised while relaying a single message.
///
/// None of these are fatal: the relay logs them and moves on to the next
/// message. Duplicate deliveries are not errors at all, they surface as
/// [`crate::dispatch::Outcome::Duplicate`].
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed reading on {topic}: {payload:?} is not a valid {expected}")]
    MalformedReading {
        topic: String,
        payload: String,
        expected: &'static str,
    },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Outbox closed, no sink is draining publications")]
    OutboxClosed,
}

impl RelayError {
    pub(crate) fn malformed(topic: &str, payload: &str, expected: &'static str) -> Self {
        RelayError::MalformedReading {
            topic: topic.to_string(),
            payload: payload.to_string(),
            expected,
        }
    }
}
