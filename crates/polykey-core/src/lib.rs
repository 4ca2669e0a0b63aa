//! Polykey Core - modulation math for a polyphonic control core
//!
//! This crate is the stateless layer underneath voice management: every
//! function takes the values it needs and returns a clamped result. Nothing
//! here allocates, blocks, or owns a clock, so the same formulas can be
//! evaluated from the note-event path and from the control-rate loop and are
//! guaranteed to agree.
//!
//! # Contents
//!
//! - [`EnvelopeShape`] - hybrid envelope (linear attack, exponential
//!   decay/release) evaluated analytically from elapsed time
//! - [`combine`] - one combination formula per modulation destination
//! - [`lfo_value`] / [`LfoWaveform`] / [`LfoMode`] - phase-driven LFO shapes
//! - [`NoteDivision`] - tempo-synced LFO rates
//! - [`key_tracking_value`] and pitch conversions
//! - [`OnePoleSmoother`] - control-rate smoothing for touch jitter
//!
//! # Example
//!
//! ```rust
//! use polykey_core::{EnvelopeShape, combine::{self, Contributions}};
//!
//! let env = EnvelopeShape::new(0.1, 0.3, 0.6, 0.5);
//! let level = env.gated_level(0.0, 0.05); // halfway through the attack
//! assert!((level - 0.5).abs() < 1e-6);
//!
//! let cutoff = combine::filter_cutoff_hz(
//!     800.0,
//!     Contributions::new(level, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0),
//! );
//! assert!((cutoff - 1600.0).abs() < 0.1);
//! ```
//!
//! # no_std Support
//!
//! Disable the default `std` feature to use this crate without the standard
//! library. Enable `serde` to serialize the configuration enums and shapes.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod combine;
pub mod curves;
pub mod lfo;
pub mod pitch;
pub mod smoothing;
pub mod tempo;

pub use combine::Contributions;
pub use curves::{
    EnvelopeShape, MIN_STAGE_TIME, TIME_CONSTANTS_PER_STAGE, attack_interpolate, attack_level,
    exponential_approach,
};
pub use lfo::{LfoMode, LfoWaveform, advance_phase, bipolar_to_unipolar, lfo_value, wrap_phase};
pub use pitch::{
    KEY_TRACKING_REFERENCE_HZ, cents_to_ratio, key_tracking_value, midi_to_freq,
    octaves_to_ratio, semitones_to_ratio,
};
pub use smoothing::OnePoleSmoother;
pub use tempo::{MAX_BPM, MIN_BPM, NoteDivision};

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
