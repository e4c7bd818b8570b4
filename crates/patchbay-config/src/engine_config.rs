//! Engine configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use patchbay_core::{DEFAULT_BPM, DEFAULT_CURVE_RESOLUTION, DEFAULT_POOL_SIZE, DEFAULT_TICKS_PER_BEAT};
use patchbay_engine::{NodeDefaults, SchedulerSettings};

use crate::error::ConfigError;

/// Engine settings loaded from TOML.
///
/// Every field has a default, so a partial file (or an empty one) is valid.
///
/// # TOML Format
///
/// ```toml
/// [scheduler]
/// interval_ms = 25
/// lookahead_ms = 100
/// ticks_per_beat = 480
/// tempo_multiplier = 1.0
/// default_bpm = 120.0
///
/// [envelope]
/// curve_resolution = 128
///
/// [voices]
/// pool_size = 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Playback scheduling.
    pub scheduler: SchedulerConfig,
    /// Envelope baking.
    pub envelope: EnvelopeConfig,
    /// Voice pools.
    pub voices: VoiceConfig,
}

/// `[scheduler]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock poll interval of the scheduling loop.
    pub interval_ms: u64,
    /// How far ahead of the playhead events are scheduled.
    pub lookahead_ms: u64,
    /// Ticks per quarter note for timelines that do not say.
    pub ticks_per_beat: u32,
    /// Playback speed factor.
    pub tempo_multiplier: f64,
    /// Tempo before the first tempo change.
    pub default_bpm: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 25,
            lookahead_ms: 100,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            tempo_multiplier: 1.0,
            default_bpm: DEFAULT_BPM,
        }
    }
}

/// `[envelope]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Points per baked real-time envelope segment.
    pub curve_resolution: usize,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            curve_resolution: DEFAULT_CURVE_RESOLUTION,
        }
    }
}

/// `[voices]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Pool size for voice-owning nodes that do not set one.
    pub pool_size: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.interval_ms == 0 {
            return Err(ConfigError::invalid("scheduler.interval_ms", "must be at least 1"));
        }
        if s.ticks_per_beat == 0 {
            return Err(ConfigError::invalid("scheduler.ticks_per_beat", "must be at least 1"));
        }
        if !(s.tempo_multiplier.is_finite() && s.tempo_multiplier > 0.0) {
            return Err(ConfigError::invalid(
                "scheduler.tempo_multiplier",
                format!("must be positive, got {}", s.tempo_multiplier),
            ));
        }
        if !(s.default_bpm.is_finite() && s.default_bpm > 0.0) {
            return Err(ConfigError::invalid(
                "scheduler.default_bpm",
                format!("must be positive, got {}", s.default_bpm),
            ));
        }
        if self.envelope.curve_resolution < 2 {
            return Err(ConfigError::invalid(
                "envelope.curve_resolution",
                format!("must be at least 2, got {}", self.envelope.curve_resolution),
            ));
        }
        if self.voices.pool_size == 0 {
            return Err(ConfigError::invalid("voices.pool_size", "must be at least 1"));
        }
        Ok(())
    }

    /// Scheduler timing for [`Scheduler::new`](patchbay_engine::Scheduler::new).
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_millis(self.scheduler.interval_ms),
            lookahead: Duration::from_millis(self.scheduler.lookahead_ms),
        }
    }

    /// Constructor defaults for a [`NodeRegistry`](patchbay_engine::NodeRegistry).
    pub fn node_defaults(&self) -> NodeDefaults {
        NodeDefaults {
            pool_size: self.voices.pool_size,
            curve_resolution: self.envelope.curve_resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scheduler_settings(), SchedulerSettings::default());
        assert_eq!(config.node_defaults(), NodeDefaults::default());
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = EngineConfig::from_toml("[scheduler]\nlookahead_ms = 200\n").unwrap();
        assert_eq!(config.scheduler.lookahead_ms, 200);
        assert_eq!(config.scheduler.interval_ms, 25);
        assert_eq!(config.voices.pool_size, 8);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            ("[scheduler]\ninterval_ms = 0", "scheduler.interval_ms"),
            ("[scheduler]\nticks_per_beat = 0", "scheduler.ticks_per_beat"),
            ("[scheduler]\ntempo_multiplier = -1.0", "scheduler.tempo_multiplier"),
            ("[scheduler]\ndefault_bpm = 0.0", "scheduler.default_bpm"),
            ("[envelope]\ncurve_resolution = 1", "envelope.curve_resolution"),
            ("[voices]\npool_size = 0", "voices.pool_size"),
        ];
        for (toml_str, expected) in cases {
            match EngineConfig::from_toml(toml_str) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("{toml_str:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn toml_round_trip() {
        let mut config = EngineConfig::default();
        config.voices.pool_size = 16;
        config.scheduler.tempo_multiplier = 1.5;
        let text = config.to_toml().unwrap();
        assert!(text.contains("[voices]"));
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_falls_back() {
        let config = EngineConfig::load_or_default("/nonexistent/patchbay/config.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(matches!(
            EngineConfig::load("/nonexistent/patchbay/config.toml"),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
