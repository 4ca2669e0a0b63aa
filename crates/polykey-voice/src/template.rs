//! Voice templates: the shared sound definition every voice plays.
//!
//! A template holds base parameter values, the three envelope shapes, the
//! per-voice LFO, modulation amounts, and the global modulation settings.
//! Templates are plain serde data so they can be saved and loaded as TOML.

use polykey_core::combine::{
    DELAY_TIME_RANGE, FILTER_CUTOFF_RANGE, GAIN_RANGE, MOD_INDEX_RANGE, MOD_RATIO_RANGE,
};
use polykey_core::{EnvelopeShape, LfoMode, LfoWaveform, NoteDivision, cents_to_ratio, semitones_to_ratio};
use serde::{Deserialize, Serialize};

use crate::graph::Waveform;

/// Base values the combination formulas start from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseValues {
    /// Oscillator amplitude, 0.0 to 1.0.
    pub amplitude: f32,
    /// Filter cutoff in Hz before key tracking and modulation.
    pub filter_cutoff: f32,
    /// FM modulation index before modulation.
    pub mod_index: f32,
    /// FM frequency ratio before global LFO modulation.
    pub mod_ratio: f32,
}

impl Default for BaseValues {
    fn default() -> Self {
        Self {
            amplitude: 0.8,
            filter_cutoff: 2_000.0,
            mod_index: 1.0,
            mod_ratio: 2.0,
        }
    }
}

/// Per-voice LFO settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoSettings {
    /// Output shape.
    pub waveform: LfoWaveform,
    /// Phase behaviour.
    pub mode: LfoMode,
    /// Rate in Hz for free-running and trigger modes.
    pub rate_hz: f32,
    /// Rate as a note division in tempo-sync mode.
    pub division: NoteDivision,
    /// Seconds after a trigger for the LFO depth to ramp from zero to full.
    pub delay: f32,
}

impl Default for LfoSettings {
    fn default() -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            mode: LfoMode::Free,
            rate_hz: 5.0,
            division: NoteDivision::Quarter,
            delay: 0.0,
        }
    }
}

/// How strongly each source moves each per-voice destination.
///
/// Pitch amounts are in semitones, filter amounts in octaves, index amounts
/// in modulation-index units, all per unit of source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulationAmounts {
    /// Modulator envelope to FM index.
    pub mod_env_to_index: f32,
    /// Auxiliary envelope to pitch (semitones).
    pub aux_env_to_pitch: f32,
    /// Auxiliary envelope to filter cutoff (octaves).
    pub aux_env_to_filter: f32,
    /// Voice LFO to pitch (semitones).
    pub lfo_to_pitch: f32,
    /// Voice LFO to filter cutoff (octaves).
    pub lfo_to_filter: f32,
    /// Voice LFO to FM index.
    pub lfo_to_index: f32,
    /// Touch delta to pitch (semitones).
    pub touch_to_pitch: f32,
    /// Touch delta to filter cutoff (octaves).
    pub touch_to_filter: f32,
    /// Touch delta to FM index.
    pub touch_to_index: f32,
    /// Key tracking into the filter base: 1.0 follows the keyboard exactly.
    pub key_tracking: f32,
}

impl ModulationAmounts {
    /// Whether any source reaches pitch.
    pub fn modulates_pitch(&self) -> bool {
        self.aux_env_to_pitch != 0.0 || self.lfo_to_pitch != 0.0 || self.touch_to_pitch != 0.0
    }

    /// Whether any source reaches the filter cutoff.
    pub fn modulates_filter(&self) -> bool {
        self.aux_env_to_filter != 0.0 || self.lfo_to_filter != 0.0 || self.touch_to_filter != 0.0
    }

    /// Whether any source reaches the FM index.
    pub fn modulates_index(&self) -> bool {
        self.mod_env_to_index != 0.0 || self.lfo_to_index != 0.0 || self.touch_to_index != 0.0
    }

    /// Touch is the only thing moving the filter; aftertouch smoothing
    /// applies in that case.
    pub fn touch_only_filter(&self) -> bool {
        self.touch_to_filter != 0.0 && self.aux_env_to_filter == 0.0 && self.lfo_to_filter == 0.0
    }
}

/// Settings for the single global LFO shared by all voices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLfoSettings {
    /// Output shape.
    pub waveform: LfoWaveform,
    /// Rate in Hz.
    pub rate_hz: f32,
    /// Offset to the FM ratio per unit of LFO.
    pub to_mod_ratio: f32,
    /// Offset to the effects delay time in seconds per unit of LFO.
    pub to_delay_time: f32,
    /// Relative mixer-volume modulation depth.
    pub to_mixer_volume: f32,
}

impl Default for GlobalLfoSettings {
    fn default() -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            rate_hz: 0.5,
            to_mod_ratio: 0.0,
            to_delay_time: 0.0,
            to_mixer_volume: 0.0,
        }
    }
}

/// Base values for the shared effects stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsSettings {
    /// Delay time in seconds.
    pub delay_time: f32,
    /// Voice-mixer output volume.
    pub mixer_volume: f32,
}

impl Default for EffectsSettings {
    fn default() -> Self {
        Self {
            delay_time: 0.25,
            mixer_volume: 0.7,
        }
    }
}

/// Complete sound definition applied to every voice.
///
/// # TOML Format
///
/// ```toml
/// name = "FM Bell"
/// waveform = "sine"
///
/// [base]
/// filter_cutoff = 4000.0
/// mod_index = 3.0
///
/// [modulator_env]
/// attack = 0.001
/// decay = 1.5
/// sustain = 0.0
/// release = 1.0
///
/// [amounts]
/// mod_env_to_index = 4.0
/// key_tracking = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceTemplate {
    /// Display name.
    pub name: String,
    /// Carrier waveform.
    pub waveform: Waveform,
    /// Time constant in seconds for touch smoothing on the filter.
    pub touch_smoothing: f32,
    /// Base parameter values.
    pub base: BaseValues,
    /// Envelope driving the FM index.
    pub modulator_env: EnvelopeShape,
    /// Envelope driving pitch and filter.
    pub auxiliary_env: EnvelopeShape,
    /// Envelope driving output gain.
    pub loudness_env: EnvelopeShape,
    /// Per-voice LFO.
    pub lfo: LfoSettings,
    /// Modulation routing depths.
    pub amounts: ModulationAmounts,
    /// Global LFO.
    pub global_lfo: GlobalLfoSettings,
    /// Effects base values.
    pub effects: EffectsSettings,
}

impl Default for VoiceTemplate {
    fn default() -> Self {
        Self {
            name: "Init".to_string(),
            waveform: Waveform::Sine,
            base: BaseValues::default(),
            modulator_env: EnvelopeShape::new(0.01, 0.3, 0.5, 0.4),
            auxiliary_env: EnvelopeShape::new(0.01, 0.3, 0.0, 0.4),
            loudness_env: EnvelopeShape::new(0.01, 0.2, 0.8, 0.4),
            lfo: LfoSettings::default(),
            amounts: ModulationAmounts::default(),
            touch_smoothing: 0.03,
            global_lfo: GlobalLfoSettings::default(),
            effects: EffectsSettings::default(),
        }
    }
}

impl VoiceTemplate {
    /// Default template with a different name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Copy of the template with every value forced into its valid range.
    ///
    /// Non-finite values fall back to the defaults.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut t = self.clone();
        t.base.amplitude = finite_or(t.base.amplitude, defaults.base.amplitude)
            .clamp(GAIN_RANGE.0, GAIN_RANGE.1);
        t.base.filter_cutoff = finite_or(t.base.filter_cutoff, defaults.base.filter_cutoff)
            .clamp(FILTER_CUTOFF_RANGE.0, FILTER_CUTOFF_RANGE.1);
        t.base.mod_index = finite_or(t.base.mod_index, defaults.base.mod_index)
            .clamp(MOD_INDEX_RANGE.0, MOD_INDEX_RANGE.1);
        t.base.mod_ratio = finite_or(t.base.mod_ratio, defaults.base.mod_ratio)
            .clamp(MOD_RATIO_RANGE.0, MOD_RATIO_RANGE.1);
        t.modulator_env = sanitize_shape(t.modulator_env, defaults.modulator_env);
        t.auxiliary_env = sanitize_shape(t.auxiliary_env, defaults.auxiliary_env);
        t.loudness_env = sanitize_shape(t.loudness_env, defaults.loudness_env);
        t.lfo.rate_hz = finite_or(t.lfo.rate_hz, defaults.lfo.rate_hz).max(0.0);
        t.lfo.delay = finite_or(t.lfo.delay, 0.0).max(0.0);
        t.touch_smoothing = finite_or(t.touch_smoothing, defaults.touch_smoothing).max(0.0);
        t.global_lfo.rate_hz = finite_or(t.global_lfo.rate_hz, defaults.global_lfo.rate_hz).max(0.0);
        t.effects.delay_time = finite_or(t.effects.delay_time, defaults.effects.delay_time)
            .clamp(DELAY_TIME_RANGE.0, DELAY_TIME_RANGE.1);
        t.effects.mixer_volume = finite_or(t.effects.mixer_volume, defaults.effects.mixer_volume)
            .clamp(GAIN_RANGE.0, GAIN_RANGE.1);
        t
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

fn sanitize_shape(shape: EnvelopeShape, fallback: EnvelopeShape) -> EnvelopeShape {
    EnvelopeShape::new(
        finite_or(shape.attack, fallback.attack),
        finite_or(shape.decay, fallback.decay),
        finite_or(shape.sustain, fallback.sustain),
        finite_or(shape.release, fallback.release),
    )
}

/// Per-note overrides of template values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemplateOverrides {
    /// Filter base cutoff for this note only.
    pub filter_cutoff: Option<f32>,
}

impl TemplateOverrides {
    /// Override only the filter cutoff.
    pub fn filter_cutoff(hz: f32) -> Self {
        Self {
            filter_cutoff: Some(hz),
        }
    }
}

/// Pitch offsets applied to a note's frequency before it reaches a voice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchModifiers {
    /// Whole-semitone transpose.
    pub semitones: f32,
    /// Fine tune in cents.
    pub cents: f32,
}

impl PitchModifiers {
    /// Modifiers that leave the frequency unchanged.
    pub const NONE: PitchModifiers = PitchModifiers {
        semitones: 0.0,
        cents: 0.0,
    };

    /// Apply the offsets to `frequency`.
    #[inline]
    pub fn apply(&self, frequency: f32) -> f32 {
        frequency * semitones_to_ratio(self.semitones) * cents_to_ratio(self.cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
            name = "Partial"
            waveform = "saw"

            [base]
            filter_cutoff = 900.0

            [amounts]
            touch_to_filter = 1.5
        "#;
        let t: VoiceTemplate = toml::from_str(toml_str).unwrap();
        assert_eq!(t.name, "Partial");
        assert_eq!(t.waveform, Waveform::Saw);
        assert_eq!(t.base.filter_cutoff, 900.0);
        assert_eq!(t.base.mod_ratio, BaseValues::default().mod_ratio);
        assert!(t.amounts.touch_only_filter());
    }

    #[test]
    fn sanitized_clamps_out_of_range_values() {
        let mut t = VoiceTemplate::default();
        t.base.filter_cutoff = 1.0e6;
        t.base.amplitude = f32::NAN;
        t.base.mod_ratio = 0.0;
        t.loudness_env.sustain = 3.0;
        let s = t.sanitized();
        assert_eq!(s.base.filter_cutoff, FILTER_CUTOFF_RANGE.1);
        assert_eq!(s.base.amplitude, BaseValues::default().amplitude);
        assert_eq!(s.base.mod_ratio, MOD_RATIO_RANGE.0);
        assert_eq!(s.loudness_env.sustain, 1.0);
    }

    #[test]
    fn pitch_modifiers_combine_semitones_and_cents() {
        let up = PitchModifiers {
            semitones: 12.0,
            cents: 0.0,
        };
        assert!((up.apply(220.0) - 440.0).abs() < 1e-3);
        let fine = PitchModifiers {
            semitones: -1.0,
            cents: 100.0,
        };
        assert!((fine.apply(440.0) - 440.0).abs() < 1e-3);
        assert_eq!(PitchModifiers::NONE.apply(330.0), 330.0);
    }

    #[test]
    fn modulation_queries() {
        let mut a = ModulationAmounts::default();
        assert!(!a.modulates_filter());
        a.lfo_to_filter = 0.5;
        assert!(a.modulates_filter());
        assert!(!a.touch_only_filter());
    }
}
