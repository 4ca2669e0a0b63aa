//! Low frequency oscillator shapes evaluated from phase.
//!
//! Control-rate LFOs do not run their own sample clock. Each owner keeps a
//! phase in `[0, 1)` and advances it by `delta_time × rate` once per control
//! tick (or, for trigger-synced LFOs, derives it from time since the note
//! started). This module only maps a phase to a bipolar value.

use core::f32::consts::TAU;
use libm::{floorf, sinf};

/// LFO waveform type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LfoWaveform {
    /// Smooth, natural modulation
    #[default]
    Sine,
    /// Linear ramps, harder corners than sine
    Triangle,
    /// Rising ramp, abrupt reset
    Saw,
    /// Binary on/off modulation
    Square,
    /// Stepped pseudo-random value, one step per cycle
    SampleAndHold,
}

/// How an LFO's phase is clocked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LfoMode {
    /// Phase accumulates across notes.
    #[default]
    Free,
    /// Phase is recomputed from the note's trigger time, so every note starts
    /// at phase 0.
    Trigger,
    /// Phase accumulates against a tempo-derived frequency.
    TempoSync,
}

/// Wrap a phase into `[0, 1)`.
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    let wrapped = phase - floorf(phase);
    if wrapped >= 1.0 { 0.0 } else { wrapped }
}

/// Advance `phase` by `delta_time` seconds at `rate_hz`.
#[inline]
pub fn advance_phase(phase: f32, rate_hz: f32, delta_time: f32) -> f32 {
    wrap_phase(phase + rate_hz.max(0.0) * delta_time.max(0.0))
}

/// Bipolar LFO value in `[-1, 1]` for `phase`.
///
/// `cycle` identifies the current cycle and only matters for
/// [`LfoWaveform::SampleAndHold`], which holds one pseudo-random value per
/// cycle.
#[inline]
pub fn lfo_value(waveform: LfoWaveform, phase: f32, cycle: u32) -> f32 {
    let phase = wrap_phase(phase);
    match waveform {
        LfoWaveform::Sine => sinf(phase * TAU),
        LfoWaveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
        LfoWaveform::Saw => 2.0 * phase - 1.0,
        LfoWaveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        LfoWaveform::SampleAndHold => sample_and_hold(cycle),
    }
}

/// Deterministic pseudo-random value in `[-1, 1]` for a cycle index.
#[inline]
fn sample_and_hold(cycle: u32) -> f32 {
    let mut x = cycle.wrapping_mul(0x9E37_79B9) ^ 0x85EB_CA6B;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7FEB_352D);
    x ^= x >> 15;
    (x as f32 / u32::MAX as f32) * 2.0 - 1.0
}

/// Convert bipolar signal (-1.0 to +1.0) to unipolar (0.0 to 1.0).
#[inline]
pub fn bipolar_to_unipolar(bipolar: f32) -> f32 {
    (bipolar + 1.0) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfo_output_range() {
        for waveform in [
            LfoWaveform::Sine,
            LfoWaveform::Triangle,
            LfoWaveform::Saw,
            LfoWaveform::Square,
            LfoWaveform::SampleAndHold,
        ] {
            for i in 0..1000 {
                let value = lfo_value(waveform, i as f32 / 1000.0, i);
                assert!(
                    (-1.0..=1.0).contains(&value),
                    "Waveform {:?} out of range: {}",
                    waveform,
                    value
                );
            }
        }
    }

    #[test]
    fn sine_quadrature_points() {
        assert!(lfo_value(LfoWaveform::Sine, 0.0, 0).abs() < 1e-6);
        assert!((lfo_value(LfoWaveform::Sine, 0.25, 0) - 1.0).abs() < 1e-6);
        assert!((lfo_value(LfoWaveform::Sine, 0.75, 0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn phase_wraps() {
        assert!((advance_phase(0.9, 2.0, 0.1) - 0.1).abs() < 1e-6);
        assert_eq!(wrap_phase(1.0), 0.0);
        assert!((wrap_phase(-0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn sample_and_hold_holds_within_cycle() {
        let a = lfo_value(LfoWaveform::SampleAndHold, 0.1, 7);
        let b = lfo_value(LfoWaveform::SampleAndHold, 0.9, 7);
        let c = lfo_value(LfoWaveform::SampleAndHold, 0.1, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn negative_rate_does_not_rewind() {
        assert_eq!(advance_phase(0.3, -5.0, 0.1), 0.3);
    }
}
