//! Configuration for the Sensor Relay.

use crate::core::{Conversion, InactivePolicy, ParseRule, WindowSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Placeholder in output topics replaced by the window length in seconds.
pub const PERIOD_PLACEHOLDER: &str = "~period~";

/// Main configuration for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cumulative counter streams (lightning, rain)
    #[serde(default)]
    pub counters: Vec<CounterStreamConfig>,

    /// Motion streams with debounced absence
    #[serde(default)]
    pub presence: Vec<PresenceConfig>,

    /// Stateless unit conversions
    #[serde(default)]
    pub conversions: Vec<ConversionConfig>,

    /// Path for persisted relay statistics
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_data_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sensor-relay")
}

impl Default for Config {
    fn default() -> Self {
        const LIGHTNING: &str = "rtl_433/tinyserver/devices/Acurite-6045M/A/106";
        const RAIN: &str = "rtl_433/tinyserver/devices/Acurite-Rain899/0/80";
        const OUTDOOR: &str = "rtl_433/tinyserver/devices/Acurite-Tower/A/2185";

        Self {
            counters: vec![
                CounterStreamConfig {
                    name: "lightning".to_string(),
                    input: format!("{LIGHTNING}/strike_count"),
                    parse: ParseRule::Int,
                    windows: vec![OutputWindow::new(
                        10 * 60,
                        format!("{LIGHTNING}/~period~/modified_strike_count"),
                    )],
                    round_digits: None,
                    quantize_secs: None,
                },
                CounterStreamConfig {
                    name: "rain".to_string(),
                    input: format!("{RAIN}/rain_mm"),
                    parse: ParseRule::Float,
                    windows: vec![
                        OutputWindow::new(60 * 60, format!("{RAIN}/~period~/hourly_rain_mm")),
                        OutputWindow::new(24 * 60 * 60, format!("{RAIN}/~period~/daily_rain_mm")),
                    ],
                    round_digits: Some(2),
                    quantize_secs: Some(10),
                },
            ],
            presence: vec![PresenceConfig {
                name: "motion".to_string(),
                input: "rtl_433/tinyserver/devices/Acurite-Motion/1/motion".to_string(),
                output: "rtl_433/tinyserver/devices/Acurite-Motion/1/presence".to_string(),
                delay: Duration::from_secs(60),
                on_inactive: InactivePolicy::Ignore,
                absent_payload: default_absent_payload(),
            }],
            conversions: vec![ConversionConfig {
                name: "outdoor_temperature".to_string(),
                input: format!("{OUTDOOR}/temperature_C"),
                output: format!("{OUTDOOR}/temperature_F"),
                conversion: Conversion::CelsiusToFahrenheit,
                round_digits: Some(1),
            }],
            data_path: default_data_path(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-relay")
            .join("config.json")
    }

    /// Path of the persisted statistics file.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Reject configurations the dispatcher cannot route unambiguously.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut inputs = HashSet::new();
        let all_inputs = self
            .counters
            .iter()
            .map(|c| (&c.name, &c.input))
            .chain(self.presence.iter().map(|p| (&p.name, &p.input)))
            .chain(self.conversions.iter().map(|c| (&c.name, &c.input)));

        for (name, input) in all_inputs {
            if input.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name}: empty input topic")));
            }
            if !inputs.insert(input.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{name}: input topic {input} is already routed"
                )));
            }
        }

        for counter in &self.counters {
            if let Some(window) = counter.windows.iter().find(|w| w.seconds == 0) {
                return Err(ConfigError::Invalid(format!(
                    "{}: window for {} has zero length",
                    counter.name, window.output
                )));
            }
            if let Some(window) = counter
                .windows
                .iter()
                .find(|w| i64::try_from(w.seconds).is_err())
            {
                return Err(ConfigError::Invalid(format!(
                    "{}: window for {} is longer than any timestamp range",
                    counter.name, window.output
                )));
            }
        }

        for presence in &self.presence {
            if presence.delay.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{}: presence delay must be at least one second",
                    presence.name
                )));
            }
        }

        Ok(())
    }
}

/// A cumulative counter stream and the windows derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterStreamConfig {
    /// Name used in logs and statistics
    pub name: String,
    /// Topic the sensor publishes its running total on
    pub input: String,
    /// How payloads are parsed
    pub parse: ParseRule,
    /// Windows to publish; all share one history
    #[serde(default)]
    pub windows: Vec<OutputWindow>,
    /// Fraction digits kept for float deltas
    #[serde(default)]
    pub round_digits: Option<u32>,
    /// Snap timestamps to this grain so near-simultaneous redeliveries
    /// compare equal
    #[serde(default)]
    pub quantize_secs: Option<u64>,
}

impl CounterStreamConfig {
    /// Window specs for the delta engine.
    pub fn window_specs(&self) -> Vec<WindowSpec> {
        self.windows
            .iter()
            .map(|w| WindowSpec::new(w.seconds, self.round_digits))
            .collect()
    }

    /// Longest configured window; the history horizon.
    pub fn max_window_secs(&self) -> Option<u64> {
        self.windows.iter().map(|w| w.seconds).max()
    }
}

/// One trailing window and where its delta is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputWindow {
    /// Window length in seconds
    pub seconds: u64,
    /// Output topic; `~period~` is replaced by `seconds`
    pub output: String,
}

impl OutputWindow {
    pub fn new(seconds: u64, output: impl Into<String>) -> Self {
        Self {
            seconds,
            output: output.into(),
        }
    }

    /// The output topic with the period filled in.
    pub fn topic(&self) -> String {
        render_topic(&self.output, self.seconds)
    }
}

/// Substitute every `~period~` in `template` with `period_secs`.
pub fn render_topic(template: &str, period_secs: u64) -> String {
    template.replace(PERIOD_PLACEHOLDER, &period_secs.to_string())
}

/// A motion stream with debounced absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    pub name: String,
    pub input: String,
    /// Topic the absence is published on
    pub output: String,
    /// Quiet period before absence is published
    #[serde(rename = "delay_secs", with = "duration_serde")]
    pub delay: Duration,
    /// What an "inactive" report does
    #[serde(default)]
    pub on_inactive: InactivePolicy,
    /// Payload published on absence
    #[serde(default = "default_absent_payload")]
    pub absent_payload: String,
}

fn default_absent_payload() -> String {
    "absent".to_string()
}

/// A stateless conversion stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub name: String,
    pub input: String,
    pub output: String,
    pub conversion: Conversion,
    #[serde(default)]
    pub round_digits: Option<u32>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.counters.len(), 2);

        let rain = &config.counters[1];
        assert_eq!(rain.max_window_secs(), Some(86_400));
        assert_eq!(
            rain.windows[0].topic(),
            "rtl_433/tinyserver/devices/Acurite-Rain899/0/80/3600/hourly_rain_mm"
        );
        assert_eq!(config.presence[0].delay, Duration::from_secs(60));
    }

    #[test]
    fn test_render_topic() {
        assert_eq!(render_topic("a/~period~/b", 600), "a/600/b");
        assert_eq!(render_topic("~period~-~period~", 60), "60-60");
        assert_eq!(render_topic("plain", 60), "plain");
    }

    #[test]
    fn test_roundtrip_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"delay_secs\":60"));

        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.counters[0].windows, config.counters[0].windows);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = Config::from_json(
            r#"{"presence": [{"name": "hall", "input": "hall/motion",
                "output": "hall/presence", "delay_secs": 120}]}"#,
        )
        .unwrap();

        assert!(config.counters.is_empty());
        assert_eq!(config.presence[0].on_inactive, InactivePolicy::Ignore);
        assert_eq!(config.presence[0].absent_payload, "absent");
    }

    #[test]
    fn test_duplicate_inputs_rejected() {
        let mut config = Config::default();
        config.conversions[0].input = config.counters[0].input.clone();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = Config::default();
        config.counters[0].windows[0].seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut config = Config::default();
        config.counters[0].windows[0].seconds = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.counters[0].windows[0].seconds = i64::MAX as u64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_delay_rejected() {
        let err = Config::from_json(
            r#"{"presence": [{"name": "hall", "input": "hall/motion",
                "output": "hall/presence", "delay_secs": 0}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
