//! Engine configuration file.

use std::path::Path;
use std::time::Duration;

use polykey_engine::EngineSettings;
use polykey_voice::{PoolConfig, VoiceSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::validation::validate_engine_config;

/// Engine configuration as stored on disk.
///
/// Every field is optional in the file; missing ones take their defaults.
///
/// # TOML Format
///
/// ```toml
/// control_interval_ms = 10
/// max_polyphony = 16
/// polyphony = 8
/// legato = false
/// release_multiplier = 1.25
/// level_tolerance = 0.1
/// max_trigger_latency_ms = 250
/// tempo_bpm = 120.0
/// template = "fm_bell"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control cycle period in milliseconds.
    pub control_interval_ms: u64,
    /// Voices allocated at startup.
    pub max_polyphony: usize,
    /// Voices in use; 1 means mono.
    pub polyphony: usize,
    /// Legato in mono mode.
    pub legato: bool,
    /// Multiple of the loudness release after which a voice is idle.
    pub release_multiplier: f32,
    /// Allowed gap between computed and backend output level.
    pub level_tolerance: f32,
    /// Trigger latency beyond which a trigger is treated as stale.
    pub max_trigger_latency_ms: u64,
    /// Initial tempo.
    pub tempo_bpm: f32,
    /// Template to start with: a factory name or a file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let voice = VoiceSettings::default();
        Self {
            control_interval_ms: 10,
            max_polyphony: 16,
            polyphony: 8,
            legato: false,
            release_multiplier: voice.release_multiplier,
            level_tolerance: voice.level_tolerance,
            max_trigger_latency_ms: 250,
            tempo_bpm: 120.0,
            template: None,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field against its range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine_config(self)?;
        Ok(())
    }

    /// Settings for [`Engine::new`](polykey_engine::Engine::new).
    ///
    /// The ramp time is filled in by the engine from the control interval.
    pub fn to_settings(&self) -> Result<EngineSettings, ConfigError> {
        self.validate()?;
        let control_interval = Duration::from_millis(self.control_interval_ms);
        Ok(EngineSettings {
            control_interval,
            pool: PoolConfig {
                max_polyphony: self.max_polyphony,
                polyphony: self.polyphony,
                legato: self.legato,
                voice: VoiceSettings {
                    ramp_time: control_interval.as_secs_f32(),
                    release_multiplier: self.release_multiplier,
                    level_tolerance: self.level_tolerance,
                    max_trigger_latency: self.max_trigger_latency_ms as f32 / 1000.0,
                },
            },
            tempo_bpm: self.tempo_bpm,
        })
    }
}
