//! Inbound message types for the Sensor Relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw message as it arrived from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Topic the sensor published on
    pub topic: String,
    /// Payload text, unparsed
    pub payload: String,
    /// When the relay received it
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Parse a `topic payload` line as printed by `mosquitto_sub -v`.
    ///
    /// The topic ends at the first whitespace; the rest of the line, trimmed,
    /// is the payload. Lines without a payload yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (topic, payload) = line.split_once(char::is_whitespace)?;
        let payload = payload.trim();
        if topic.is_empty() || payload.is_empty() {
            return None;
        }
        Some(Self::new(topic, payload))
    }

    /// Arrival time in whole seconds since the epoch.
    pub fn timestamp(&self) -> i64 {
        self.received_at.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_parsing() {
        let msg = InboundMessage::from_line("rtl_433/dev/strike_count 17\n").unwrap();
        assert_eq!(msg.topic, "rtl_433/dev/strike_count");
        assert_eq!(msg.payload, "17");

        let msg = InboundMessage::from_line("a/b\t  1.25  ").unwrap();
        assert_eq!(msg.topic, "a/b");
        assert_eq!(msg.payload, "1.25");

        let msg = InboundMessage::from_line("a/b some text").unwrap();
        assert_eq!(msg.payload, "some text");
    }

    #[test]
    fn test_lines_without_payload() {
        assert!(InboundMessage::from_line("").is_none());
        assert!(InboundMessage::from_line("   ").is_none());
        assert!(InboundMessage::from_line("a/b").is_none());
        assert!(InboundMessage::from_line("a/b   ").is_none());
    }
}
