//! Property-based tests for polykey-core modulation math.
//!
//! Covers attack continuity, envelope bounds, and destination clamping using
//! proptest for randomized inputs.

use polykey_core::combine::{self, Contributions};
use proptest::prelude::*;
use polykey_core::{EnvelopeShape, LfoWaveform, attack_interpolate, lfo_value};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(400))]

    /// For any attack A and captured start s, the loudness curve equals s at
    /// t = 0, reaches 1.0 at t = A, and is linear and non-decreasing between.
    #[test]
    fn attack_is_linear_from_capture_to_peak(
        attack in 0.005f32..2.0f32,
        start in 0.0f32..=1.0f32,
        steps in 2usize..64,
    ) {
        let shape = EnvelopeShape::new(attack, 0.2, 0.5, 0.3);
        prop_assert!((shape.gated_level(start, 0.0) - start).abs() < 1e-5);
        prop_assert!((shape.gated_level(start, attack) - 1.0).abs() < 1e-4);

        let mut previous = start;
        for i in 1..steps {
            let t = attack * i as f32 / steps as f32;
            let level = shape.gated_level(start, t);
            let expected = start + (1.0 - start) * (t / attack);
            prop_assert!((level - expected).abs() < 1e-4,
                "non-linear attack at t={}: {} vs {}", t, level, expected);
            prop_assert!(level + 1e-6 >= previous, "attack not monotonic at t={}", t);
            previous = level;
        }
    }

    /// Gated and released levels always stay inside [0, 1].
    #[test]
    fn envelope_levels_stay_bounded(
        attack in 0.0f32..2.0f32,
        decay in 0.0f32..2.0f32,
        sustain in 0.0f32..=1.0f32,
        release in 0.0f32..4.0f32,
        start in 0.0f32..=1.0f32,
        t in 0.0f32..10.0f32,
    ) {
        let shape = EnvelopeShape::new(attack, decay, sustain, release);
        let gated = shape.gated_level(start, t);
        let released = shape.released_level(start, t);
        prop_assert!((0.0..=1.0).contains(&gated), "gated {}", gated);
        prop_assert!((0.0..=1.0).contains(&released), "released {}", released);
    }

    /// Attack-window interpolation agrees with its endpoints for any pair.
    #[test]
    fn interpolation_endpoints(
        start in -100.0f32..100.0f32,
        peak in -100.0f32..100.0f32,
        attack in 0.01f32..1.0f32,
    ) {
        prop_assert!((attack_interpolate(start, peak, 0.0, attack) - start).abs() < 1e-3);
        prop_assert!((attack_interpolate(start, peak, attack, attack) - peak).abs() < 1e-3);
    }

    /// Every destination formula clamps any finite contribution sum.
    #[test]
    fn destinations_clamp(
        base in 0.0f32..25_000.0f32,
        env in -100.0f32..100.0f32,
        lfo in -1.0f32..=1.0f32,
        amount in -50.0f32..50.0f32,
    ) {
        let c = Contributions { envelope: env, lfo: lfo * amount, touch: 0.0 };
        let pitch = combine::pitch_hz(base.max(1.0), c);
        let cutoff = combine::filter_cutoff_hz(base.max(1.0), c);
        let index = combine::mod_index(base / 2500.0, c);
        let ratio = combine::mod_ratio(base / 1250.0, lfo, amount);
        let delay = combine::delay_time(base / 12_500.0, lfo, amount);
        let volume = combine::mixer_volume(base / 25_000.0, lfo, amount);

        prop_assert!((20.0..=20_000.0).contains(&pitch));
        prop_assert!((12.0..=20_000.0).contains(&cutoff));
        prop_assert!((0.0..=10.0).contains(&index));
        prop_assert!((0.1..=20.0).contains(&ratio));
        prop_assert!((0.0..=2.0).contains(&delay));
        prop_assert!((0.0..=1.0).contains(&volume));
    }

    /// LFO output stays bipolar-bounded for any phase, including out-of-range
    /// phases the caller forgot to wrap.
    #[test]
    fn lfo_bounded_for_any_phase(phase in -10.0f32..10.0f32, cycle in 0u32..10_000) {
        for waveform in [LfoWaveform::Sine, LfoWaveform::Triangle, LfoWaveform::Saw,
                         LfoWaveform::Square, LfoWaveform::SampleAndHold] {
            let v = lfo_value(waveform, phase, cycle);
            prop_assert!((-1.0..=1.0).contains(&v), "{:?} -> {}", waveform, v);
        }
    }
}
