//! Configuration for the EEG stress agent.

use crate::actuator::{Key, KeyBindings, DEFAULT_THRESHOLD};
use crate::core::SeverityBands;
use crate::pipeline::PipelineConfig;
use crate::telemetry::{TelemetryLayout, TelemetryMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link to the acquisition board
    pub serial: SerialConfig,

    /// Scorer weights file
    pub model_path: PathBuf,

    /// Stress probability at or above which the actuator engages
    pub decision_threshold: f64,

    /// Severity bands for the live display
    pub bands: SeverityBands,

    /// Sleep between loop iterations
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Stop a session after this long (unbounded when absent)
    #[serde(with = "option_duration_secs")]
    pub session_duration: Option<Duration>,

    /// Line silence after which the device is considered disconnected
    #[serde(with = "duration_secs")]
    pub transport_timeout: Duration,

    /// Consecutive classifier failures before a session aborts
    pub max_consecutive_failures: u32,

    /// Time span kept by the live window
    #[serde(with = "duration_secs")]
    pub window_horizon: Duration,

    /// Live display redraw period
    #[serde(with = "duration_millis")]
    pub refresh_interval: Duration,

    pub telemetry: TelemetryConfig,

    /// Which actuator a session drives
    pub actuator: ActuatorKind,

    /// Keys held by the key-press actuator
    pub keys: KeyBindings,

    /// Telemetry, charts and session reports
    pub data_path: PathBuf,

    /// Raw capture output file
    pub capture_path: PathBuf,

    /// Length of a raw capture run
    #[serde(with = "duration_secs")]
    pub capture_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eeg-stress-agent");

        Self {
            serial: SerialConfig::default(),
            model_path: data_dir.join("model.json"),
            decision_threshold: DEFAULT_THRESHOLD,
            bands: SeverityBands::default(),
            poll_interval: Duration::from_millis(50),
            session_duration: None,
            transport_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
            window_horizon: Duration::from_secs(60),
            refresh_interval: Duration::from_millis(200),
            telemetry: TelemetryConfig::default(),
            actuator: ActuatorKind::default(),
            keys: KeyBindings::default(),
            capture_path: data_dir.join("eeg_data.csv"),
            data_path: data_dir,
            capture_duration: Duration::from_secs(1200),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eeg-stress-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(ConfigError::Invalid(format!(
                "decision_threshold must be within [0, 1], got {}",
                self.decision_threshold
            )));
        }
        if self.bands.moderate_pct > self.bands.high_pct {
            return Err(ConfigError::Invalid(format!(
                "bands.moderate_pct ({}) exceeds bands.high_pct ({})",
                self.bands.moderate_pct, self.bands.high_pct
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be positive".into()));
        }
        Ok(())
    }

    /// Loop settings for the pipeline driver.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: self.poll_interval,
            max_duration: self.session_duration,
            max_consecutive_failures: self.max_consecutive_failures,
            transport_timeout: self.transport_timeout,
        }
    }
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,

    /// Device-level read timeout
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM7" } else { "/dev/ttyACM0" };
        Self {
            port: port.to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(1000),
        }
    }
}

/// Telemetry persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `None` disables the CSV log
    pub mode: Option<TelemetryMode>,
    pub layout: TelemetryLayout,
    /// Render an SVG summary next to the CSV at session end
    pub chart: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: Some(TelemetryMode::Incremental),
            layout: TelemetryLayout::Control,
            chart: true,
        }
    }
}

impl TelemetryConfig {
    /// Parse `incremental`, `batch` or `off`.
    pub fn parse_mode(s: &str) -> Result<Option<TelemetryMode>, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(Some(TelemetryMode::Incremental)),
            "batch" => Ok(Some(TelemetryMode::Batch)),
            "off" | "none" => Ok(None),
            other => Err(ConfigError::Invalid(format!("unknown telemetry mode: {other}"))),
        }
    }

    /// Parse `control` or `live`.
    pub fn parse_layout(s: &str) -> Result<TelemetryLayout, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "control" => Ok(TelemetryLayout::Control),
            "live" => Ok(TelemetryLayout::Live),
            other => Err(ConfigError::Invalid(format!("unknown telemetry layout: {other}"))),
        }
    }
}

/// Actuator backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    /// Classify and record only
    #[default]
    None,
    /// `'1'`/`'0'` back over the serial link
    Digital,
    /// Virtual key presses
    Keys,
}

impl ActuatorKind {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "none" | "monitor" => Ok(ActuatorKind::None),
            "digital" | "led" => Ok(ActuatorKind::Digital),
            "keys" | "keyboard" => Ok(ActuatorKind::Keys),
            other => Err(ConfigError::Invalid(format!("unknown actuator: {other}"))),
        }
    }
}

/// Parse a key name such as `w` or `space`.
pub fn parse_key(s: &str) -> Result<Key, ConfigError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("space") {
        return Ok(Key::Space);
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Key::Char(c.to_ascii_lowercase())),
        _ => Err(ConfigError::Invalid(format!("unknown key: {s:?}"))),
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
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

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.decision_threshold, 0.5);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.window_horizon, Duration::from_secs(60));
        assert_eq!(config.capture_duration, Duration::from_secs(1200));
        assert_eq!(config.max_consecutive_failures, 3);
        assert!(config.session_duration.is_none());
        assert_eq!(config.actuator, ActuatorKind::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_units() {
        let mut config = Config::default();
        config.session_duration = Some(Duration::from_secs(60));
        config.actuator = ActuatorKind::Keys;

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval"], 50);
        assert_eq!(json["session_duration"], 60);
        assert_eq!(json["serial"]["read_timeout"], 1000);
        assert_eq!(json["actuator"], "keys");

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.session_duration, Some(Duration::from_secs(60)));
        assert_eq!(back.actuator, ActuatorKind::Keys);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"decision_threshold": 0.7, "telemetry": {"mode": null}}"#)
                .unwrap();
        assert_eq!(config.decision_threshold, 0.7);
        assert!(config.telemetry.mode.is_none());
        assert!(config.telemetry.chart);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.decision_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.bands = SeverityBands {
            moderate_pct: 95.0,
            high_pct: 90.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!(ActuatorKind::parse("Digital").unwrap(), ActuatorKind::Digital);
        assert!(ActuatorKind::parse("laser").is_err());

        assert_eq!(TelemetryConfig::parse_mode("off").unwrap(), None);
        assert_eq!(
            TelemetryConfig::parse_mode("batch").unwrap(),
            Some(TelemetryMode::Batch)
        );
        assert_eq!(
            TelemetryConfig::parse_layout("live").unwrap(),
            TelemetryLayout::Live
        );

        assert_eq!(parse_key("space").unwrap(), Key::Space);
        assert_eq!(parse_key("W").unwrap(), Key::Char('w'));
        assert!(parse_key("ctrl").is_err());
    }
}
