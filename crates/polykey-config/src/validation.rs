//! Range validation for engine configurations and voice templates.
//!
//! Every check runs and the failures are collected, so a hand-edited file
//! reports all of its problems at once.
//!
//! # Example
//!
//! ```rust
//! use polykey_config::{EngineConfig, validate_engine_config, validate_template};
//! use polykey_voice::VoiceTemplate;
//!
//! validate_engine_config(&EngineConfig::default()).expect("defaults are valid");
//!
//! let mut template = VoiceTemplate::default();
//! template.base.filter_cutoff = 1.0e6;
//! assert!(validate_template(&template).is_err());
//! ```

use polykey_core::EnvelopeShape;
use polykey_core::combine::{
    DELAY_TIME_RANGE, FILTER_CUTOFF_RANGE, GAIN_RANGE, MOD_INDEX_RANGE, MOD_RATIO_RANGE,
};
use polykey_engine::{GlobalParam, MAX_POLYPHONY};
use polykey_voice::VoiceTemplate;
use thiserror::Error;

use crate::engine_config::EngineConfig;

/// Longest accepted envelope stage in seconds.
pub const MAX_STAGE_SECONDS: f32 = 60.0;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Value out of range.
    #[error("'{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path.
        param: String,
        /// The rejected value.
        value: f32,
        /// Minimum allowed value.
        min: f32,
        /// Maximum allowed value.
        max: f32,
    },

    /// Value that no range describes.
    #[error("invalid value for '{param}': {reason}")]
    Invalid {
        /// Dotted field path.
        param: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Default)]
struct Checks {
    errors: Vec<ValidationError>,
}

impl Checks {
    fn range(&mut self, param: &str, value: f32, (min, max): (f32, f32)) {
        if !(value.is_finite() && (min..=max).contains(&value)) {
            self.errors.push(ValidationError::OutOfRange {
                param: param.to_string(),
                value,
                min,
                max,
            });
        }
    }

    fn invalid(&mut self, param: &str, reason: impl Into<String>) {
        self.errors.push(ValidationError::Invalid {
            param: param.to_string(),
            reason: reason.into(),
        });
    }

    fn envelope(&mut self, prefix: &str, shape: &EnvelopeShape) {
        let stage = (0.0, MAX_STAGE_SECONDS);
        self.range(&format!("{prefix}.attack"), shape.attack, stage);
        self.range(&format!("{prefix}.decay"), shape.decay, stage);
        self.range(&format!("{prefix}.sustain"), shape.sustain, (0.0, 1.0));
        self.range(&format!("{prefix}.release"), shape.release, stage);
    }

    fn finish(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ValidationError::Multiple(self.errors)),
        }
    }
}

/// Validate an engine configuration.
pub fn validate_engine_config(config: &EngineConfig) -> ValidationResult<()> {
    let mut checks = Checks::default();
    if !(5..=20).contains(&config.control_interval_ms) {
        checks.errors.push(ValidationError::OutOfRange {
            param: "control_interval_ms".to_string(),
            value: config.control_interval_ms as f32,
            min: 5.0,
            max: 20.0,
        });
    }
    if !(1..=MAX_POLYPHONY).contains(&config.max_polyphony) {
        checks.errors.push(ValidationError::OutOfRange {
            param: "max_polyphony".to_string(),
            value: config.max_polyphony as f32,
            min: 1.0,
            max: MAX_POLYPHONY as f32,
        });
    }
    if config.polyphony == 0 || config.polyphony > config.max_polyphony {
        checks.invalid(
            "polyphony",
            format!(
                "{} must be between 1 and max_polyphony ({})",
                config.polyphony, config.max_polyphony
            ),
        );
    }
    checks.range("release_multiplier", config.release_multiplier, (1.0, 4.0));
    if !(config.level_tolerance.is_finite() && config.level_tolerance > 0.0) {
        checks.invalid("level_tolerance", "must be positive");
    }
    if config.max_trigger_latency_ms == 0 {
        checks.invalid("max_trigger_latency_ms", "must be positive");
    }
    checks.range("tempo_bpm", config.tempo_bpm, GlobalParam::TempoBpm.range());
    checks.finish()
}

/// Validate every range in a voice template.
pub fn validate_template(template: &VoiceTemplate) -> ValidationResult<()> {
    let mut checks = Checks::default();
    if template.name.trim().is_empty() {
        checks.invalid("name", "must not be empty");
    }

    checks.range("base.amplitude", template.base.amplitude, GAIN_RANGE);
    checks.range("base.filter_cutoff", template.base.filter_cutoff, FILTER_CUTOFF_RANGE);
    checks.range("base.mod_index", template.base.mod_index, MOD_INDEX_RANGE);
    checks.range("base.mod_ratio", template.base.mod_ratio, MOD_RATIO_RANGE);

    checks.envelope("modulator_env", &template.modulator_env);
    checks.envelope("auxiliary_env", &template.auxiliary_env);
    checks.envelope("loudness_env", &template.loudness_env);

    checks.range("lfo.rate_hz", template.lfo.rate_hz, GlobalParam::LfoRate.range());
    checks.range("lfo.delay", template.lfo.delay, (0.0, MAX_STAGE_SECONDS));
    checks.range("touch_smoothing", template.touch_smoothing, (0.0, 1.0));

    let amounts = &template.amounts;
    for (param, value) in [
        ("amounts.mod_env_to_index", amounts.mod_env_to_index),
        ("amounts.lfo_to_index", amounts.lfo_to_index),
        ("amounts.touch_to_index", amounts.touch_to_index),
    ] {
        checks.range(param, value, (-MOD_INDEX_RANGE.1, MOD_INDEX_RANGE.1));
    }
    for (param, value) in [
        ("amounts.aux_env_to_pitch", amounts.aux_env_to_pitch),
        ("amounts.lfo_to_pitch", amounts.lfo_to_pitch),
        ("amounts.touch_to_pitch", amounts.touch_to_pitch),
    ] {
        checks.range(param, value, (-48.0, 48.0));
    }
    for (param, value) in [
        ("amounts.aux_env_to_filter", amounts.aux_env_to_filter),
        ("amounts.lfo_to_filter", amounts.lfo_to_filter),
        ("amounts.touch_to_filter", amounts.touch_to_filter),
    ] {
        checks.range(param, value, (-10.0, 10.0));
    }
    checks.range("amounts.key_tracking", amounts.key_tracking, (0.0, 2.0));

    let global = &template.global_lfo;
    checks.range("global_lfo.rate_hz", global.rate_hz, GlobalParam::LfoRate.range());
    checks.range("global_lfo.to_mod_ratio", global.to_mod_ratio, (-MOD_RATIO_RANGE.1, MOD_RATIO_RANGE.1));
    checks.range("global_lfo.to_delay_time", global.to_delay_time, GlobalParam::LfoToDelayTime.range());
    checks.range(
        "global_lfo.to_mixer_volume",
        global.to_mixer_volume,
        GlobalParam::LfoToMixerVolume.range(),
    );

    checks.range("effects.delay_time", template.effects.delay_time, DELAY_TIME_RANGE);
    checks.range("effects.mixer_volume", template.effects.mixer_volume, GAIN_RANGE);
    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_valid() {
        assert!(validate_template(&VoiceTemplate::default()).is_ok());
    }

    #[test]
    fn single_failure_is_reported_directly() {
        let mut t = VoiceTemplate::default();
        t.base.mod_ratio = 50.0;
        let err = validate_template(&t).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref param, .. } if param == "base.mod_ratio"));
    }

    #[test]
    fn failures_are_collected() {
        let mut t = VoiceTemplate::default();
        t.name = "  ".to_string();
        t.loudness_env.release = f32::NAN;
        t.effects.mixer_volume = 2.0;
        let Err(ValidationError::Multiple(errors)) = validate_template(&t) else {
            panic!("expected several errors");
        };
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn engine_polyphony_above_max() {
        let config = EngineConfig {
            max_polyphony: 4,
            polyphony: 6,
            ..EngineConfig::default()
        };
        let err = validate_engine_config(&config).unwrap_err();
        assert!(err.to_string().contains("polyphony"));
    }

    #[test]
    fn engine_interval_range() {
        for (ms, ok) in [(4, false), (5, true), (20, true), (21, false)] {
            let config = EngineConfig {
                control_interval_ms: ms,
                ..EngineConfig::default()
            };
            assert_eq!(validate_engine_config(&config).is_ok(), ok, "{ms} ms");
        }
    }
}
