//! Engine configuration.
//!
//! [`EngineConfig`] holds the recognized engine options. It is serializable
//! via [`serde`] so it can be embedded in the controller's JSON config file.
//!
//! # Example
//!
//! ```rust
//! use empower_sdnplay::config::{DemoMode, EngineConfig};
//!
//! let cfg = EngineConfig::default();
//! cfg.validate().expect("default config is valid");
//! assert_eq!(cfg.cycle_len(), 10);
//! assert_eq!("dms".parse::<DemoMode>().unwrap(), DemoMode::Dms);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use empower_core::DEFAULT_PROB_THRESHOLD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Shortest allowed control-loop period, in milliseconds.
pub const MIN_PERIOD_MS: u64 = 100;

// ---------------------------------------------------------------------------
// DemoMode
// ---------------------------------------------------------------------------

/// Phase selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemoMode {
    /// Alternate DMS and LEGACY per the schedule.
    #[default]
    SdnPlay,
    /// Always DMS.
    Dms,
    /// Always LEGACY.
    Legacy,
}

impl DemoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SdnPlay => "sdn@play",
            Self::Dms => "DMS",
            Self::Legacy => "LEGACY",
        }
    }
}

impl fmt::Display for DemoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemoMode {
    type Err = ConfigError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sdn@play" => Ok(Self::SdnPlay),
            "dms" => Ok(Self::Dms),
            "legacy" => Ok(Self::Legacy),
            _ => Err(ConfigError::invalid_value(
                "demo_mode",
                format!("`{s}` is not one of sdn@play, DMS, LEGACY"),
            )),
        }
    }
}

impl Serialize for DemoMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DemoMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Options recognized at engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control loop period in milliseconds. Default: **2000**.
    pub every: u64,

    /// Rate-validity cutoff. Default: **0.90**.
    pub prob_threshold: f64,

    /// DMS slots per cycle. Default: **1**.
    pub dms_slots: u32,

    /// LEGACY slots per cycle. Default: **9**.
    pub legacy_slots: u32,

    /// Default: **sdn@play**.
    pub demo_mode: DemoMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            every: 2000,
            prob_threshold: DEFAULT_PROB_THRESHOLD,
            dms_slots: 1,
            legacy_slots: 9,
            demo_mode: DemoMode::SdnPlay,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and
    /// [`ConfigError::InvalidValue`] if a field is out of range.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: EngineConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.every < MIN_PERIOD_MS {
            return Err(ConfigError::invalid_value(
                "every",
                format!("must be >= {MIN_PERIOD_MS} ms, got {}", self.every),
            ));
        }
        if !(0.0..=1.0).contains(&self.prob_threshold) {
            return Err(ConfigError::invalid_value(
                "prob_threshold",
                format!("must be in [0, 1], got {}", self.prob_threshold),
            ));
        }
        if self.dms_slots == 0 {
            return Err(ConfigError::invalid_value("dms_slots", "must be >= 1"));
        }
        if self.dms_slots.checked_add(self.legacy_slots).is_none() {
            return Err(ConfigError::invalid_value("legacy_slots", "cycle length overflows"));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.every)
    }

    /// `dms_slots + legacy_slots`.
    pub fn cycle_len(&self) -> u32 {
        self.dms_slots.saturating_add(self.legacy_slots)
    }
}
