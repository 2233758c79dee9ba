//! Timestamped sensor readings.
//!
//! A reading is the unit stored in a stream's history. Two readings are the
//! same delivery when both timestamp and value match, which is what the
//! history uses to drop broker redeliveries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a raw payload is parsed for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseRule {
    /// Whole counts, e.g. lightning strikes
    Int,
    /// Fractional amounts, e.g. millimetres of rain
    Float,
}

impl ParseRule {
    /// Parse a payload, tolerating surrounding whitespace.
    pub fn parse(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            ParseRule::Int => raw.parse::<i64>().ok().map(Value::Int),
            ParseRule::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float),
        }
    }

    /// Name used in error messages.
    pub fn expected(&self) -> &'static str {
        match self {
            ParseRule::Int => "integer",
            ParseRule::Float => "number",
        }
    }
}

/// A numeric sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    /// `self - other`. Integer streams stay integral; anything mixed falls
    /// back to floating point.
    pub fn delta_from(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
            _ => Value::Float(self.as_f64() - other.as_f64()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One reading of a stream: seconds since the epoch plus the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub value: Value,
}

impl Reading {
    pub fn new(timestamp: i64, value: Value) -> Self {
        Self { timestamp, value }
    }

    /// Reading with its timestamp snapped to the nearest multiple of `grain`.
    pub fn quantized(timestamp: i64, value: Value, grain: Option<u64>) -> Self {
        let timestamp = match grain {
            Some(g) if g > 1 => quantize(timestamp, g),
            _ => timestamp,
        };
        Self { timestamp, value }
    }
}

/// Round `timestamp` to the nearest multiple of `grain` seconds, halves up.
pub fn quantize(timestamp: i64, grain: u64) -> i64 {
    let grain = grain as i64;
    (timestamp + grain / 2).div_euclid(grain) * grain
}
