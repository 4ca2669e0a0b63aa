//! Pitch and frequency conversions.

use libm::{exp2f, log2f, powf};

/// Reference frequency for key tracking (C4).
pub const KEY_TRACKING_REFERENCE_HZ: f32 = 261.625_58;

/// Convert a semitone offset to a frequency ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    exp2f(semitones / 12.0)
}

/// Convert an octave offset to a frequency ratio.
#[inline]
pub fn octaves_to_ratio(octaves: f32) -> f32 {
    exp2f(octaves)
}

/// Convert cents to a frequency ratio.
///
/// 100 cents = 1 semitone.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    powf(2.0, cents / 1200.0)
}

/// Convert MIDI note number to frequency in Hz.
///
/// Uses standard tuning: A4 (note 69) = 440 Hz.
#[inline]
pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * semitones_to_ratio(note as f32 - 69.0)
}

/// Octave offset of `frequency` from [`KEY_TRACKING_REFERENCE_HZ`].
///
/// Computed once per note at trigger time and frozen for the note's life.
/// Non-positive frequencies map to 0.
#[inline]
pub fn key_tracking_value(frequency: f32) -> f32 {
    if frequency <= 0.0 || !frequency.is_finite() {
        return 0.0;
    }
    log2f(frequency / KEY_TRACKING_REFERENCE_HZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_freq_a4() {
        let freq = midi_to_freq(69);
        assert!((freq - 440.0).abs() < 0.01, "A4 should be 440 Hz, got {}", freq);
    }

    #[test]
    fn test_cents_to_ratio() {
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 0.001);
        assert!((cents_to_ratio(0.0) - 1.0).abs() < 0.001);
    }

    #[test]
    fn key_tracking_is_zero_at_reference() {
        assert!(key_tracking_value(KEY_TRACKING_REFERENCE_HZ).abs() < 1e-5);
        assert!((key_tracking_value(KEY_TRACKING_REFERENCE_HZ * 2.0) - 1.0).abs() < 1e-5);
        assert!((key_tracking_value(KEY_TRACKING_REFERENCE_HZ / 4.0) + 2.0).abs() < 1e-5);
    }

    #[test]
    fn key_tracking_ignores_invalid_input() {
        assert_eq!(key_tracking_value(0.0), 0.0);
        assert_eq!(key_tracking_value(-10.0), 0.0);
        assert_eq!(key_tracking_value(f32::NAN), 0.0);
    }
}
