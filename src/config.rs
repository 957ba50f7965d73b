//! Configuration for the analytics service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the analytics service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port for the HTTP server (0 for random)
    pub port: u16,

    /// Width of each aggregation window
    #[serde(with = "duration_serde")]
    pub window_duration: Duration,

    /// Trailing range queried on each publisher tick, in seconds
    pub trailing_window_secs: u64,

    /// Interval between publisher ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Age beyond which windows are evicted
    #[serde(with = "duration_serde")]
    pub retention_horizon: Duration,

    /// How far in the future an event timestamp may be before it is rejected
    pub clock_skew_secs: u64,

    /// Fixed user pool for synthesized events
    pub synthetic_users: Vec<String>,

    /// Inclusive lower bound for synthesized event values
    pub synthetic_value_min: u64,

    /// Exclusive upper bound for synthesized event values
    pub synthetic_value_max: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            window_duration: Duration::from_secs(5),
            trailing_window_secs: 5,
            tick_interval: Duration::from_secs(1),
            retention_horizon: Duration::from_secs(60),
            clock_skew_secs: 30,
            synthetic_users: vec!["U1".to_string(), "U2".to_string()],
            synthetic_value_min: 10,
            synthetic_value_max: 10_010,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
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
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pageview-analytics")
            .join("config.json")
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "window_duration must be positive".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tick_interval must be positive".to_string(),
            ));
        }
        if self.retention_horizon.as_secs() < self.trailing_window_secs {
            return Err(ConfigError::InvalidValue(
                "retention_horizon must cover the trailing window".to_string(),
            ));
        }
        if self.synthetic_users.is_empty() {
            return Err(ConfigError::InvalidValue(
                "synthetic_users must not be empty".to_string(),
            ));
        }
        if self.synthetic_value_min >= self.synthetic_value_max {
            return Err(ConfigError::InvalidValue(
                "synthetic value range must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

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
