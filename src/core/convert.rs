//! Stateless unit conversions for instantaneous readings.

use serde::{Deserialize, Serialize};

/// A per-message unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    CelsiusToFahrenheit,
    FahrenheitToCelsius,
    MillimetersToInches,
}

impl Conversion {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Conversion::CelsiusToFahrenheit => value * 9.0 / 5.0 + 32.0,
            Conversion::FahrenheitToCelsius => (value - 32.0) * 5.0 / 9.0,
            Conversion::MillimetersToInches => value / 25.4,
        }
    }
}
