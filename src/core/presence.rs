//! Debounced presence for motion sensors.
//!
//! Every "active" report (re)arms a single-shot timer. When the timer runs
//! out without another report, the tracker publishes an absence. Nothing is
//! published on activity itself.

use crate::config::PresenceConfig;
use crate::publish::Publication;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A decoded motion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionSignal {
    Active,
    Inactive,
}

impl MotionSignal {
    /// Decode a payload: integers (non-zero is active) or on/off style words.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<i64>() {
            return Some(if n != 0 {
                MotionSignal::Active
            } else {
                MotionSignal::Inactive
            });
        }
        match raw.to_ascii_lowercase().as_str() {
            "on" | "true" | "active" | "motion" => Some(MotionSignal::Active),
            "off" | "false" | "inactive" | "clear" => Some(MotionSignal::Inactive),
            _ => None,
        }
    }
}

/// What an "inactive" report does to a pending absence timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactivePolicy {
    /// Nothing; only the timer decides absence
    #[default]
    Ignore,
    /// Disarm the timer without publishing
    Cancel,
    /// Restart the timer as if activity had been seen
    Rearm,
}

/// Observable tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Idle,
    Armed,
}

/// The pending timer of a tracker.
///
/// `generation` changes on every arm and cancel, so a timer task that has
/// already woken up but lost the race for the lock can tell it is stale.
#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

fn lock(slot: &Mutex<TimerSlot>) -> MutexGuard<'_, TimerSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Debounce state machine for one presence stream.
pub struct PresenceTracker {
    name: String,
    output: String,
    absent_payload: String,
    delay: Duration,
    on_inactive: InactivePolicy,
    slot: Arc<Mutex<TimerSlot>>,
    outbox: Sender<Publication>,
    runtime: Handle,
}

impl PresenceTracker {
    /// Create an idle tracker. Timers are spawned on `runtime`.
    pub fn new(config: &PresenceConfig, outbox: Sender<Publication>, runtime: Handle) -> Self {
        Self {
            name: config.name.clone(),
            output: config.output.clone(),
            absent_payload: config.absent_payload.clone(),
            delay: config.delay,
            on_inactive: config.on_inactive,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
            outbox,
            runtime,
        }
    }

    /// Feed one motion report. Returns the state afterwards.
    pub fn signal(&self, signal: MotionSignal) -> PresenceState {
        match (signal, self.on_inactive) {
            (MotionSignal::Active, _) | (MotionSignal::Inactive, InactivePolicy::Rearm) => {
                self.arm()
            }
            (MotionSignal::Inactive, InactivePolicy::Cancel) => {
                self.cancel();
            }
            (MotionSignal::Inactive, InactivePolicy::Ignore) => {}
        }
        self.state()
    }

    /// Cancel any pending timer and start a fresh one.
    pub fn arm(&self) {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }

        let fire_slot = Arc::clone(&self.slot);
        let outbox = self.outbox.clone();
        let delay = self.delay;
        let publication = Publication::new(&self.name, &self.output, &self.absent_payload, None);

        slot.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let mut slot = lock(&fire_slot);
            if slot.generation != generation {
                return;
            }
            slot.pending = None;

            info!(
                "{}: no motion for {}s, publishing {} to {}",
                publication.stream,
                delay.as_secs(),
                publication.payload,
                publication.topic
            );
            if outbox.send(publication).is_err() {
                warn!("Outbox closed, absence dropped");
            }
        }));

        debug!("{}: absence timer armed for {}s", self.name, self.delay.as_secs());
    }

    /// Disarm without publishing. Returns whether a timer was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        match slot.pending.take() {
            Some(pending) => {
                pending.abort();
                debug!("{}: absence timer cancelled", self.name);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> PresenceState {
        if lock(&self.slot).pending.is_some() {
            PresenceState::Armed
        } else {
            PresenceState::Idle
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.slot).pending.take() {
            pending.abort();
        }
    }
}
