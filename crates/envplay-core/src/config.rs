use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::EventFilterKind;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_interval_ms() -> u64 {
    100
}

// ---------------------------------------------------------------------------
// PlayConfig
// ---------------------------------------------------------------------------

/// Configuration for one interactive play session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayConfig {
    /// Name of the remote environment.
    #[serde(default)]
    pub env_name: String,

    /// Nominal time between ticks in milliseconds (default: 100 = 10 Hz).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Observation width in pixels. Required by the delta filter.
    #[serde(default)]
    pub width: u32,

    /// Observation height in pixels. Required by the delta filter.
    #[serde(default)]
    pub height: u32,

    /// How input actions are reduced before each step.
    #[serde(default)]
    pub filter: EventFilterKind,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            env_name: String::new(),
            interval_ms: default_interval_ms(),
            width: 0,
            height: 0,
            filter: EventFilterKind::None,
        }
    }
}

impl PlayConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_ms));
        }
        if self.filter == EventFilterKind::Delta {
            if self.width == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "width".into(),
                    message: "must be > 0 when filter = \"delta\"".into(),
                });
            }
            if self.height == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "height".into(),
                    message: "must be > 0 when filter = \"delta\"".into(),
                });
            }
        }
        Ok(())
    }

    /// Nominal tick interval.
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Builder: set the tick interval.
    #[must_use]
    pub const fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Builder: set the event filter and the observation size it centres on.
    #[must_use]
    pub const fn with_filter(mut self, filter: EventFilterKind, width: u32, height: u32) -> Self {
        self.filter = filter;
        self.width = width;
        self.height = height;
        self
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
