//! Routing of inbound readings to per-stream state.
//!
//! The dispatcher owns every stream of the relay: counter histories,
//! presence trackers and conversions, keyed by input topic. Routes are fixed
//! when the dispatcher is built, and each counter history sits behind its
//! own mutex, so streams never contend with each other. Derived values are
//! sent to the outbox before that mutex is released; the outbox is
//! unbounded, so sending never blocks while the lock is held.

use crate::config::{Config, ConversionConfig, CounterStreamConfig};
use crate::core::{
    compute_deltas, format_rounded, History, MotionSignal, PresenceState, PresenceTracker,
    Reading, WindowSpec,
};
use crate::error::RelayError;
use crate::publish::Publication;
use crate::stats::SharedStats;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Outcome {
    /// This many values went to the outbox
    Published(usize),
    /// Redelivery of a reading already in the history
    Duplicate,
    /// Stored as the stream's first reading; nothing to compare against yet
    Baseline,
    /// Fed to a presence tracker, which is now in this state
    Presence(PresenceState),
    /// No stream is configured for the topic
    Unrouted,
}

/// A counter stream: its history plus the windows derived from it.
struct CounterStream {
    config: CounterStreamConfig,
    specs: Vec<WindowSpec>,
    /// (window length, rendered output topic)
    outputs: Vec<(u64, String)>,
    horizon_secs: u64,
    history: Mutex<History>,
}

impl CounterStream {
    fn new(config: &CounterStreamConfig) -> Self {
        Self {
            specs: config.window_specs(),
            outputs: config.windows.iter().map(|w| (w.seconds, w.topic())).collect(),
            horizon_secs: config.max_window_secs().unwrap_or(0),
            history: Mutex::new(History::new()),
            config: config.clone(),
        }
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Route {
    Counter(CounterStream),
    Presence(PresenceTracker),
    Conversion(ConversionConfig),
}

/// Per-stream state as reported by `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    pub name: String,
    pub input: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceState>,
}

/// Routes readings by input topic and publishes derived values.
pub struct Dispatcher {
    routes: HashMap<String, Route>,
    outbox: Sender<Publication>,
    stats: SharedStats,
}

impl Dispatcher {
    /// Build every stream of `config`. Presence timers run on `runtime`.
    ///
    /// `outbox` is written to while a stream's lock is held and should be
    /// unbounded.
    pub fn new(
        config: &Config,
        outbox: Sender<Publication>,
        runtime: Handle,
        stats: SharedStats,
    ) -> Self {
        let mut routes = HashMap::new();

        for counter in &config.counters {
            routes.insert(counter.input.clone(), Route::Counter(CounterStream::new(counter)));
        }
        for presence in &config.presence {
            let tracker = PresenceTracker::new(presence, outbox.clone(), runtime.clone());
            routes.insert(presence.input.clone(), Route::Presence(tracker));
        }
        for conversion in &config.conversions {
            routes.insert(conversion.input.clone(), Route::Conversion(conversion.clone()));
        }

        Self {
            routes,
            outbox,
            stats,
        }
    }

    /// Handle one reading that arrived on `topic` at `timestamp` (seconds).
    ///
    /// A malformed payload is logged and returned as an error without
    /// touching any state; the stream carries on with the next reading.
    pub fn on_reading(
        &self,
        topic: &str,
        timestamp: i64,
        raw_value: &str,
    ) -> Result<Outcome, RelayError> {
        self.stats.record_received();

        let Some(route) = self.routes.get(topic) else {
            debug!("No stream for {topic}");
            self.stats.record_unrouted();
            return Ok(Outcome::Unrouted);
        };

        let result = match route {
            Route::Counter(stream) => self.on_counter(stream, topic, timestamp, raw_value),
            Route::Presence(tracker) => Self::on_presence(tracker, topic, raw_value),
            Route::Conversion(conversion) => self.on_conversion(conversion, topic, raw_value),
        };

        if let Err(ref e) = result {
            if matches!(e, RelayError::MalformedReading { .. }) {
                self.stats.record_malformed();
            }
            warn!("{e}");
        }
        result
    }

    fn on_counter(
        &self,
        stream: &CounterStream,
        topic: &str,
        timestamp: i64,
        raw_value: &str,
    ) -> Result<Outcome, RelayError> {
        let parse = stream.config.parse;
        let value = parse
            .parse(raw_value)
            .ok_or_else(|| RelayError::malformed(topic, raw_value, parse.expected()))?;
        let reading = Reading::quantized(timestamp, value, stream.config.quantize_secs);

        // ingest, prune, compute and send under one lock, so the outbox sees
        // a stream's values in ingestion order
        let mut history = stream.history();

        if !history.ingest(reading) {
            debug!("{}: duplicate {:?} dropped", stream.config.name, reading);
            self.stats.record_duplicate();
            return Ok(Outcome::Duplicate);
        }

        let evicted = history.prune(reading.timestamp, stream.horizon_secs);
        if evicted > 0 {
            debug!(
                "{}: evicted {evicted} readings, {} kept",
                stream.config.name,
                history.len()
            );
        }

        let deltas = compute_deltas(&history, &reading, &stream.specs);
        let publications: Vec<Publication> = stream
            .outputs
            .iter()
            .filter_map(|(seconds, topic)| {
                let delta = deltas.iter().find(|d| d.length_secs == *seconds)?;
                if delta.partial {
                    debug!(
                        "{}: {seconds}s window only covers since {}",
                        stream.config.name, delta.baseline.timestamp
                    );
                }
                Some(Publication::new(
                    &stream.config.name,
                    topic,
                    delta.payload(),
                    Some(*seconds),
                ))
            })
            .collect();

        if publications.is_empty() && !stream.outputs.is_empty() {
            debug!("{}: baseline reading {:?}", stream.config.name, reading);
            return Ok(Outcome::Baseline);
        }
        self.send_all(publications)
    }

    fn on_presence(
        tracker: &PresenceTracker,
        topic: &str,
        raw_value: &str,
    ) -> Result<Outcome, RelayError> {
        let signal = MotionSignal::parse(raw_value)
            .ok_or_else(|| RelayError::malformed(topic, raw_value, "motion state"))?;
        let state = tracker.signal(signal);
        debug!("{}: {:?} -> {:?}", tracker.name(), signal, state);
        Ok(Outcome::Presence(state))
    }

    fn on_conversion(
        &self,
        conversion: &ConversionConfig,
        topic: &str,
        raw_value: &str,
    ) -> Result<Outcome, RelayError> {
        let value = raw_value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RelayError::malformed(topic, raw_value, "number"))?;

        let converted = conversion.conversion.apply(value);
        let payload = match conversion.round_digits {
            Some(digits) => format_rounded(converted, digits),
            None => converted.to_string(),
        };

        self.send_all(vec![Publication::new(
            &conversion.name,
            &conversion.output,
            payload,
            None,
        )])
    }

    fn send_all(&self, publications: Vec<Publication>) -> Result<Outcome, RelayError> {
        let count = publications.len();
        for publication in publications {
            self.outbox
                .send(publication)
                .map_err(|_| RelayError::OutboxClosed)?;
        }
        Ok(Outcome::Published(count))
    }

    /// Whether a stream is configured for `topic`.
    pub fn routes(&self, topic: &str) -> bool {
        self.routes.contains_key(topic)
    }

    /// Per-stream state, sorted by stream name.
    pub fn stream_summaries(&self) -> Vec<StreamSummary> {
        let mut summaries: Vec<StreamSummary> = self
            .routes
            .iter()
            .map(|(input, route)| match route {
                Route::Counter(stream) => StreamSummary {
                    name: stream.config.name.clone(),
                    input: input.clone(),
                    kind: "counter",
                    history_len: Some(stream.history().len()),
                    presence: None,
                },
                Route::Presence(tracker) => StreamSummary {
                    name: tracker.name().to_string(),
                    input: input.clone(),
                    kind: "presence",
                    history_len: None,
                    presence: Some(tracker.state()),
                },
                Route::Conversion(conversion) => StreamSummary {
                    name: conversion.name.clone(),
                    input: input.clone(),
                    kind: "conversion",
                    history_len: None,
                    presence: None,
                },
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputWindow;
    use crate::core::ParseRule;
    use crate::stats::create_shared_stats;
    use crossbeam_channel::{unbounded, Receiver};

    fn counter_config(parse: ParseRule, windows: &[(u64, &str)]) -> Config {
        Config {
            counters: vec![CounterStreamConfig {
                name: "gauge".to_string(),
                input: "in/gauge".to_string(),
                parse,
                windows: windows
                    .iter()
                    .map(|(s, o)| OutputWindow::new(*s, *o))
                    .collect(),
                round_digits: Some(2),
                quantize_secs: None,
            }],
            presence: Vec::new(),
            conversions: Vec::new(),
            data_path: std::env::temp_dir(),
        }
    }

    fn dispatcher(
        config: &Config,
    ) -> (Dispatcher, Receiver<Publication>, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (tx, rx) = unbounded();
        let dispatcher =
            Dispatcher::new(config, tx, runtime.handle().clone(), create_shared_stats());
        (dispatcher, rx, runtime)
    }

    #[test]
    fn test_first_reading_publishes_nothing() {
        let config = counter_config(ParseRule::Float, &[(3600, "out/~period~")]);
        let (dispatcher, rx, _rt) = dispatcher(&config);

        let outcome = dispatcher.on_reading("in/gauge", 1000, "5.0").unwrap();

        assert_eq!(outcome, Outcome::Baseline);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_delivery_publishes_once() {
        let config = counter_config(ParseRule::Float, &[(3600, "out/~period~")]);
        let (dispatcher, rx, _rt) = dispatcher(&config);

        dispatcher.on_reading("in/gauge", 1000, "5.0").unwrap();
        assert_eq!(
            dispatcher.on_reading("in/gauge", 1060, "5.5").unwrap(),
            Outcome::Published(1)
        );
        assert_eq!(
            dispatcher.on_reading("in/gauge", 1060, "5.5").unwrap(),
            Outcome::Duplicate
        );

        let published: Vec<Publication> = rx.try_iter().collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "out/3600");
        assert_eq!(published[0].payload, "0.50");
        assert_eq!(dispatcher.stats().stats().duplicates, 1);
        assert_eq!(dispatcher.stream_summaries()[0].history_len, Some(2));
    }

    #[test]
    fn test_malformed_counter_reading_leaves_history_alone() {
        let config = counter_config(ParseRule::Int, &[(600, "out")]);
        let (dispatcher, _rx, _rt) = dispatcher(&config);

        let err = dispatcher.on_reading("in/gauge", 10, "12.5").unwrap_err();

        assert!(matches!(err, RelayError::MalformedReading { .. }));
        assert_eq!(dispatcher.stream_summaries()[0].history_len, Some(0));
        assert_eq!(dispatcher.stats().stats().malformed, 1);
    }

    #[test]
    fn test_unrouted_topic() {
        let config = counter_config(ParseRule::Int, &[(600, "out")]);
        let (dispatcher, _rx, _rt) = dispatcher(&config);

        assert_eq!(dispatcher.on_reading("other", 10, "1").unwrap(), Outcome::Unrouted);
        assert!(dispatcher.routes("in/gauge"));
        assert!(!dispatcher.routes("other"));
    }

    #[test]
    fn test_outbox_closed_is_reported() {
        let config = counter_config(ParseRule::Int, &[(600, "out")]);
        let (dispatcher, rx, _rt) = dispatcher(&config);
        drop(rx);

        dispatcher.on_reading("in/gauge", 10, "1").unwrap();
        assert!(matches!(
            dispatcher.on_reading("in/gauge", 20, "2"),
            Err(RelayError::OutboxClosed)
        ));
    }
}
