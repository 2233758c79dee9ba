//! The publish boundary.
//!
//! Derived values leave the relay as [`Publication`]s on a crossbeam
//! channel (the outbox). Whatever drains the outbox hands each publication
//! to a [`Sink`] exactly once; failures are logged and counted, never
//! retried, since the next reading of the stream publishes fresher data.

use crate::error::RelayError;
use crate::stats::RelayStats;
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{info, warn};

/// A derived value ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Name of the stream that produced it
    pub stream: String,
    /// Destination topic, placeholders already substituted
    pub topic: String,
    pub payload: String,
    /// Window the value covers, for counter streams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(
        stream: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
        window_secs: Option<u64>,
    ) -> Self {
        Self {
            stream: stream.into(),
            topic: topic.into(),
            payload: payload.into(),
            window_secs,
            created_at: Utc::now(),
        }
    }
}

/// Destination for publications.
pub trait Sink {
    fn deliver(&mut self, publication: &Publication) -> Result<(), RelayError>;
}

/// Writes `topic payload` lines, the format `mosquitto_sub -v` prints, so the
/// output can be fed to whatever publishes onto the bus.
pub struct StdoutSink<W: Write> {
    out: W,
}

impl StdoutSink<std::io::Stdout> {
    pub fn new() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl Default for StdoutSink<std::io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutSink<W> {
    /// Sink over any writer.
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for StdoutSink<W> {
    fn deliver(&mut self, publication: &Publication) -> Result<(), RelayError> {
        writeln!(self.out, "{} {}", publication.topic, publication.payload)
            .and_then(|_| self.out.flush())
            .map_err(|e| RelayError::Publish(e.to_string()))
    }
}

/// Deliver everything currently queued in the outbox. Returns how many
/// publications were delivered successfully.
pub fn drain_outbox(
    outbox: &Receiver<Publication>,
    sink: &mut dyn Sink,
    stats: &RelayStats,
) -> usize {
    let mut delivered = 0;
    for publication in outbox.try_iter() {
        match sink.deliver(&publication) {
            Ok(()) => {
                info!(
                    "Published {} to {} ({})",
                    publication.payload, publication.topic, publication.stream
                );
                stats.record_published();
                delivered += 1;
            }
            Err(e) => {
                warn!("{}: {e}", publication.topic);
                stats.record_publish_failure();
            }
        }
    }
    delivered
}

/// Identifier of this relay instance for downstream consumers.
pub fn source_id(instance_id: &str) -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("relay-{}-{}", hostname, &instance_id[..instance_id.len().min(8)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    struct FailingSink;

    impl Sink for FailingSink {
        fn deliver(&mut self, _: &Publication) -> Result<(), RelayError> {
            Err(RelayError::Publish("broker unreachable".to_string()))
        }
    }

    #[test]
    fn test_stdout_sink_line_format() {
        let mut sink = StdoutSink::with_writer(Vec::new());
        sink.deliver(&Publication::new("rain", "rain/3600/hourly", "1.25", Some(3600)))
            .unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "rain/3600/hourly 1.25\n");
    }

    #[test]
    fn test_drain_counts_deliveries_and_failures() {
        let (tx, rx) = unbounded();
        let stats = RelayStats::new();
        tx.send(Publication::new("a", "a/out", "1", None)).unwrap();
        tx.send(Publication::new("b", "b/out", "2", None)).unwrap();

        let mut sink = StdoutSink::with_writer(Vec::new());
        assert_eq!(drain_outbox(&rx, &mut sink, &stats), 2);
        assert_eq!(stats.stats().published, 2);

        tx.send(Publication::new("a", "a/out", "3", None)).unwrap();
        assert_eq!(drain_outbox(&rx, &mut FailingSink, &stats), 0);
        assert_eq!(stats.stats().publish_failures, 1);
        // failed publications are not retried
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_source_id_shape() {
        let id = source_id("0123456789abcdef");
        assert!(id.starts_with("relay-"));
        assert!(id.ends_with("-01234567"));
    }
}
