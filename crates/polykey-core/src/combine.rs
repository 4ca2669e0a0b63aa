//! Per-destination combination formulas.
//!
//! Several modulation sources may target the same synthesis parameter in the
//! same control tick. Each destination has exactly one function here that
//! folds every contribution into a single clamped target, so the control loop
//! issues one ramp per destination instead of several overwriting ones.
//!
//! | Destination | Combination | Clamp |
//! |---|---|---|
//! | Pitch | `base × 2^(Σ semitones / 12)` | [`PITCH_RANGE`] |
//! | Filter cutoff | `base × 2^(Σ octaves)` | [`FILTER_CUTOFF_RANGE`] |
//! | FM index | `base + Σ offsets` | [`MOD_INDEX_RANGE`] |
//! | FM ratio | `base + lfo offset` | [`MOD_RATIO_RANGE`] |
//! | Output gain | envelope level | [`GAIN_RANGE`] |
//! | Delay time | `base + lfo offset` | [`DELAY_TIME_RANGE`] |
//! | Mixer volume | `base × (1 + lfo × amount)` | [`GAIN_RANGE`] |

use crate::pitch::{octaves_to_ratio, semitones_to_ratio};

/// Valid oscillator frequency range in Hz.
pub const PITCH_RANGE: (f32, f32) = (20.0, 20_000.0);
/// Valid filter cutoff range in Hz.
pub const FILTER_CUTOFF_RANGE: (f32, f32) = (12.0, 20_000.0);
/// Valid FM modulation index range.
pub const MOD_INDEX_RANGE: (f32, f32) = (0.0, 10.0);
/// Valid FM ratio range.
pub const MOD_RATIO_RANGE: (f32, f32) = (0.1, 20.0);
/// Valid delay time range in seconds.
pub const DELAY_TIME_RANGE: (f32, f32) = (0.0, 2.0);
/// Valid range for gains and volumes.
pub const GAIN_RANGE: (f32, f32) = (0.0, 1.0);

/// Sources contributing to one destination during a tick.
///
/// Each field is the already-scaled contribution in the destination's offset
/// unit (semitones for pitch, octaves for cutoff, index units for FM index).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Contributions {
    /// Envelope value × envelope amount.
    pub envelope: f32,
    /// LFO value × LFO amount × LFO delay-ramp factor.
    pub lfo: f32,
    /// Touch delta × touch amount.
    pub touch: f32,
}

impl Contributions {
    /// Build a contribution set from raw source values and amounts.
    #[inline]
    pub fn new(
        envelope: f32,
        envelope_amount: f32,
        lfo: f32,
        lfo_amount: f32,
        lfo_ramp: f32,
        touch_delta: f32,
        touch_amount: f32,
    ) -> Self {
        Self {
            envelope: envelope * envelope_amount,
            lfo: lfo * lfo_amount * lfo_ramp,
            touch: touch_delta * touch_amount,
        }
    }

    /// Sum of all contributions.
    #[inline]
    pub fn total(&self) -> f32 {
        self.envelope + self.lfo + self.touch
    }
}

#[inline]
fn clamp_range(value: f32, range: (f32, f32)) -> f32 {
    if value.is_nan() {
        return range.0;
    }
    value.clamp(range.0, range.1)
}

/// Combined oscillator frequency in Hz.
#[inline]
pub fn pitch_hz(base_hz: f32, semitones: Contributions) -> f32 {
    clamp_range(base_hz * semitones_to_ratio(semitones.total()), PITCH_RANGE)
}

/// Combined filter cutoff in Hz.
///
/// `base_hz` already has the note's key-tracking offset folded in.
#[inline]
pub fn filter_cutoff_hz(base_hz: f32, octaves: Contributions) -> f32 {
    clamp_range(base_hz * octaves_to_ratio(octaves.total()), FILTER_CUTOFF_RANGE)
}

/// Combined FM modulation index.
#[inline]
pub fn mod_index(base: f32, offsets: Contributions) -> f32 {
    clamp_range(base + offsets.total(), MOD_INDEX_RANGE)
}

/// FM ratio with the global LFO offset applied.
#[inline]
pub fn mod_ratio(base: f32, lfo: f32, amount: f32) -> f32 {
    clamp_range(base + lfo * amount, MOD_RATIO_RANGE)
}

/// Output gain from an envelope level.
#[inline]
pub fn output_gain(level: f32) -> f32 {
    clamp_range(level, GAIN_RANGE)
}

/// Effects delay time in seconds with the global LFO offset applied.
#[inline]
pub fn delay_time(base: f32, lfo: f32, amount: f32) -> f32 {
    clamp_range(base + lfo * amount, DELAY_TIME_RANGE)
}

/// Voice-mixer volume with multiplicative LFO modulation.
#[inline]
pub fn mixer_volume(base: f32, lfo: f32, amount: f32) -> f32 {
    clamp_range(base * (1.0 + lfo * amount), GAIN_RANGE)
}

/// Filter base cutoff with a key-tracking offset folded in.
///
/// `key_tracking` is the note's octave offset from the reference frequency,
/// `amount` scales it (1.0 = the filter follows the keyboard exactly).
#[inline]
pub fn key_tracked_cutoff(base_hz: f32, key_tracking: f32, amount: f32) -> f32 {
    base_hz * octaves_to_ratio(key_tracking * amount)
}
