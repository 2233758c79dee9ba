//! Sliding-window deltas over cumulative counters.
//!
//! Sensors like the rain gauge and the lightning detector report a running
//! total. The amount for the last N seconds is the newest total minus the
//! earliest total still inside the window. All windows of a stream are
//! answered from one history in one pass.

use crate::core::history::History;
use crate::core::reading::{Reading, Value};
use crate::core::rounding::{format_rounded, round_half_away};
use serde::{Deserialize, Serialize};

/// A trailing window and how its output is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Window length in seconds
    pub length_secs: u64,
    /// Fraction digits kept for float outputs; `None` publishes the raw delta
    pub round_digits: Option<u32>,
}

impl WindowSpec {
    pub fn new(length_secs: u64, round_digits: Option<u32>) -> Self {
        Self {
            length_secs,
            round_digits,
        }
    }
}

/// The amount accumulated within one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDelta {
    pub length_secs: u64,
    /// The reading the delta was measured from
    pub baseline: Reading,
    /// Delta after rounding
    pub value: Value,
    /// Whether the baseline came from outside the window because nothing
    /// inside it was old enough
    pub partial: bool,
    round_digits: Option<u32>,
}

impl WindowDelta {
    /// Payload text for the publish boundary.
    pub fn payload(&self) -> String {
        match (self.value, self.round_digits) {
            (Value::Float(v), Some(digits)) => format_rounded(v, digits),
            (value, _) => value.to_string(),
        }
    }
}

/// Compute the delta of `latest` against each window of `windows`.
///
/// `latest` is expected to be stored in `history` already; it is never its
/// own baseline, and entries stamped after it are ignored. Within each
/// window the earliest entry is the baseline, the first stored one winning
/// timestamp ties. A window with no entry inside it falls back to the oldest
/// entry so a partial period is still reported. With nothing to compare
/// against (the first reading of a stream) the result is empty.
///
/// The result is sorted by window length, one entry per distinct length.
pub fn compute_deltas(
    history: &History,
    latest: &Reading,
    windows: &[WindowSpec],
) -> Vec<WindowDelta> {
    let mut specs: Vec<WindowSpec> = windows.to_vec();
    specs.sort_by_key(|w| w.length_secs);
    specs.dedup_by_key(|w| w.length_secs);

    let mut baselines: Vec<Option<&Reading>> = vec![None; specs.len()];
    let mut oldest: Option<&Reading> = None;
    let mut skipped_self = false;

    for entry in history.iter() {
        if !skipped_self && entry == latest {
            skipped_self = true;
            continue;
        }
        if entry.timestamp > latest.timestamp {
            continue;
        }

        if oldest.map_or(true, |o| entry.timestamp < o.timestamp) {
            oldest = Some(entry);
        }

        for (spec, best) in specs.iter().zip(baselines.iter_mut()) {
            let length = i64::try_from(spec.length_secs).unwrap_or(i64::MAX);
            let cutoff = latest.timestamp.saturating_sub(length);
            if entry.timestamp < cutoff {
                continue;
            }
            if best.map_or(true, |b| entry.timestamp < b.timestamp) {
                *best = Some(entry);
            }
        }
    }

    let Some(oldest) = oldest else {
        return Vec::new();
    };

    specs
        .iter()
        .zip(baselines)
        .map(|(spec, best)| {
            let baseline = best.unwrap_or(oldest);
            let value = match latest.value.delta_from(&baseline.value) {
                Value::Float(v) => match spec.round_digits {
                    Some(digits) => Value::Float(round_half_away(v, digits)),
                    None => Value::Float(v),
                },
                v => v,
            };
            WindowDelta {
                length_secs: spec.length_secs,
                baseline: *baseline,
                value,
                partial: best.is_none(),
                round_digits: spec.round_digits,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn f(t: i64, v: f64) -> Reading {
        Reading::new(t, Value::Float(v))
    }

    fn i(t: i64, v: i64) -> Reading {
        Reading::new(t, Value::Int(v))
    }

    fn history_of(readings: &[Reading]) -> History {
        let mut history = History::new();
        for r in readings {
            history.ingest(*r);
        }
        history
    }

    #[test]
    fn test_baseline_is_earliest_entry_inside_window() {
        let latest = f(3605, 22.0);
        let history = history_of(&[f(0, 5.0), f(3600, 20.0), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(3600, None)]);

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].baseline, f(3600, 20.0));
        assert_eq!(deltas[0].value, Value::Float(2.0));
        assert!(!deltas[0].partial);
    }

    #[test]
    fn test_partial_period_falls_back_to_oldest() {
        let latest = f(7200, 9.5);
        let history = history_of(&[f(0, 4.0), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(3600, None)]);

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].baseline, f(0, 4.0));
        assert_eq!(deltas[0].value, Value::Float(5.5));
        assert!(deltas[0].partial);
    }

    #[test]
    fn test_first_reading_has_no_delta() {
        let latest = i(100, 17);
        let history = history_of(&[latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(600, None)]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_hourly_and_daily_from_one_history() {
        let latest = f(90_000, 30.0);
        let history = history_of(&[
            f(0, 1.0),
            f(10_000, 8.0),
            f(86_000, 24.0),
            f(87_000, 26.5),
            latest,
        ]);
        let windows = [WindowSpec::new(86_400, Some(2)), WindowSpec::new(3600, Some(2))];

        let deltas = compute_deltas(&history, &latest, &windows);

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].length_secs, 3600);
        assert_eq!(deltas[0].baseline, f(87_000, 26.5));
        assert_eq!(deltas[0].payload(), "3.50");
        assert_eq!(deltas[1].length_secs, 86_400);
        assert_eq!(deltas[1].baseline, f(10_000, 8.0));
        assert_eq!(deltas[1].payload(), "22.00");
    }

    #[test]
    fn test_timestamp_ties_go_to_first_arrival() {
        let latest = i(500, 40);
        let history = history_of(&[i(100, 10), i(100, 12), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(600, None)]);

        assert_eq!(deltas[0].baseline, i(100, 10));
        assert_eq!(deltas[0].value, Value::Int(30));
        assert_eq!(deltas[0].payload(), "30");
    }

    #[test]
    fn test_integer_deltas_are_not_rounded() {
        let latest = i(60, 7);
        let history = history_of(&[i(0, 2), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(600, Some(2))]);
        assert_eq!(deltas[0].payload(), "5");
    }

    #[test]
    fn test_rounding_applied_to_float_deltas() {
        let latest = f(60, 3.2345);
        let history = history_of(&[f(0, 2.0), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(600, Some(2))]);
        assert_eq!(deltas[0].value, Value::Float(1.23));
        assert_eq!(deltas[0].payload(), "1.23");
    }

    #[test]
    fn test_later_stamped_entries_are_not_baselines() {
        let latest = i(100, 5);
        let history = history_of(&[i(50, 1), i(200, 9), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(600, None)]);
        assert_eq!(deltas[0].baseline, i(50, 1));
    }

    #[test]
    fn test_duplicate_window_lengths_collapse() {
        let latest = i(10, 3);
        let history = history_of(&[i(0, 1), latest]);
        let windows = [WindowSpec::new(600, None), WindowSpec::new(600, None)];

        assert_eq!(compute_deltas(&history, &latest, &windows).len(), 1);
    }

    #[test]
    fn test_window_longer_than_timestamp_range_covers_everything() {
        let latest = i(1060, 5);
        let history = history_of(&[i(1000, 1), latest]);

        let deltas = compute_deltas(&history, &latest, &[WindowSpec::new(u64::MAX, None)]);

        assert_eq!(deltas[0].baseline, i(1000, 1));
        assert_eq!(deltas[0].value, Value::Int(4));
        assert!(!deltas[0].partial);
    }
}
