//! Line-oriented message collection.
//!
//! Reads `topic payload` lines from a reader on a background thread, e.g.
//! the output of `mosquitto_sub -v -t '#'` piped into the relay, and hands
//! them to the main loop over a bounded channel.

use crate::collector::types::InboundMessage;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Stdin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

/// Collector settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Messages buffered before the reader thread blocks
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
        }
    }
}

/// Errors that can occur during message collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,
    #[error("Collector source was already consumed")]
    SourceConsumed,
    #[error("Failed to spawn reader thread: {0}")]
    Spawn(String),
}

/// Collects messages from a line-oriented reader.
pub struct LineCollector<R> {
    source: Option<R>,
    sender: Option<Sender<InboundMessage>>,
    receiver: Receiver<InboundMessage>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl LineCollector<BufReader<Stdin>> {
    /// Collector over the process's standard input.
    pub fn stdin(config: CollectorConfig) -> Self {
        Self::new(BufReader::new(std::io::stdin()), config)
    }
}

impl<R: BufRead + Send + 'static> LineCollector<R> {
    /// Create a new collector over `source`.
    pub fn new(source: R, config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity);
        Self {
            source: Some(source),
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Start reading on a background thread.
    ///
    /// The channel disconnects once the source reaches end of input.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        let (Some(source), Some(sender)) = (self.source.take(), self.sender.take()) else {
            return Err(CollectorError::SourceConsumed);
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("line-collector".to_string())
            .spawn(move || read_lines(source, sender, running))
            .map_err(|e| CollectorError::Spawn(e.to_string()))?;
        self.reader = Some(handle);
        Ok(())
    }

    /// Stop forwarding messages.
    ///
    /// A reader blocked on input only notices on its next line.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for inbound messages.
    pub fn receiver(&self) -> &Receiver<InboundMessage> {
        &self.receiver
    }

    /// Wait for the reader thread after end of input.
    pub fn join(&mut self) {
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

fn read_lines<R: BufRead>(source: R, sender: Sender<InboundMessage>, running: Arc<AtomicBool>) {
    for line in source.lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Collector read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match InboundMessage::from_line(&line) {
            Some(message) => {
                if sender.send(message).is_err() {
                    break;
                }
            }
            None => warn!("Skipping line without payload: {line:?}"),
        }
    }
    debug!("Collector input finished");
    running.store(false, Ordering::SeqCst);
}
