//! chirp-engine specific configuration
//!
//! Loaded from TOML (see `chirp_common::config` for file discovery). Every
//! field has a default so an empty document is a valid configuration.

use crate::error::{Error, Result};
use chirp_common::SoundSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Ticks a freshly started sound stays registered before it may be reaped.
///
/// Tunable; gives a just-started channel time to report that it is playing.
pub const DEFAULT_REMOVAL_GRACE_TICKS: u64 = 20;

/// Sound engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred output device name (empty = follow the system default)
    pub device: String,

    /// Per-category gain; categories not listed play at 1.0
    pub category_volumes: BTreeMap<SoundSource, f32>,

    /// Number of static (fully decoded) voices requested from the backend
    pub static_channels: usize,

    /// Number of streaming voices requested from the backend
    pub streaming_channels: usize,

    /// Upper bound on the simulation thread's wait for a channel
    pub acquire_timeout_ms: u64,

    /// Minimum interval between expensive device probes
    pub device_check_interval_ms: u64,

    /// Grace window (ticks) before a stopped sound is reaped
    pub removal_grace_ticks: u64,

    /// Maximum number of concurrent decode workers
    pub decode_threads: usize,

    /// Development switches
    pub debug: DebugConfig,
}

/// Development-only switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Start sounds whose computed volume is zero instead of rejecting them
    pub play_silent_sounds: bool,

    /// Log every channel acquisition that fails because the pool is exhausted
    pub log_exhaustion: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            category_volumes: BTreeMap::new(),
            static_channels: 247,
            streaming_channels: 8,
            acquire_timeout_ms: 2000,
            device_check_interval_ms: 1000,
            removal_grace_ticks: DEFAULT_REMOVAL_GRACE_TICKS,
            decode_threads: 512,
            debug: DebugConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = chirp_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration file (CLI > env > platform dir) or use defaults.
    pub fn discover(cli_arg: Option<&Path>) -> Result<Self> {
        let config: Self = chirp_common::config::load_or_default(cli_arg)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        for (source, gain) in &self.category_volumes {
            check_gain(*source, *gain)?;
        }

        if self.static_channels + self.streaming_channels == 0 {
            return Err(Error::Config("At least one channel is required".to_string()));
        }

        if self.decode_threads == 0 {
            return Err(Error::Config("decode_threads must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Preferred device, `None` when following the system default
    pub fn preferred_device(&self) -> Option<&str> {
        if self.device.is_empty() {
            None
        } else {
            Some(self.device.as_str())
        }
    }

    /// Configured gain for `source` (1.0 when unset)
    pub fn category_volume(&self, source: SoundSource) -> f32 {
        self.category_volumes.get(&source).copied().unwrap_or(1.0)
    }

    /// Set the gain for `source`, rejecting NaN, infinite and negative values.
    pub fn set_category_volume(&mut self, source: SoundSource, gain: f32) -> Result<()> {
        check_gain(source, gain)?;
        self.category_volumes.insert(source, gain);
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn device_check_interval(&self) -> Duration {
        Duration::from_millis(self.device_check_interval_ms)
    }
}

fn check_gain(source: SoundSource, gain: f32) -> Result<()> {
    if !gain.is_finite() || gain < 0.0 {
        return Err(Error::Config(format!(
            "Volume for category '{}' must be a finite non-negative number, got {}",
            source, gain
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_category_volumes_parse() {
        let config: EngineConfig = toml::from_str(
            r#"
            device = "USB Headset"
            [category_volumes]
            music = 0.25
            master = 0.8
            [debug]
            log_exhaustion = true
            "#,
        )
        .unwrap();

        assert_eq!(config.preferred_device(), Some("USB Headset"));
        assert_eq!(config.category_volume(SoundSource::Music), 0.25);
        assert_eq!(config.category_volume(SoundSource::Master), 0.8);
        assert_eq!(config.category_volume(SoundSource::Blocks), 1.0);
        assert!(config.debug.log_exhaustion);
    }

    #[test]
    fn test_validate_rejects_negative_gain() {
        let mut config = EngineConfig::default();
        config.category_volumes.insert(SoundSource::Ui, -0.5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_category_volume_rejects_nan() {
        let mut config = EngineConfig::default();
        config.set_category_volume(SoundSource::Music, 0.5).unwrap();
        assert!(config.set_category_volume(SoundSource::Music, f32::NAN).is_err());
        assert!(config.set_category_volume(SoundSource::Music, f32::INFINITY).is_err());
        assert_eq!(config.category_volume(SoundSource::Music), 0.5);
    }

    #[test]
    fn test_validate_rejects_zero_channels() {
        let config = EngineConfig {
            static_channels: 0,
            streaming_channels: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
