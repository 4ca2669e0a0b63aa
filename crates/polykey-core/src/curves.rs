//! Hybrid envelope curves evaluated analytically from elapsed time.
//!
//! Envelopes are never integrated sample by sample. The control loop and the
//! trigger path both need the level at an arbitrary instant (the trigger path
//! to capture the level a stolen voice is at, the control loop to follow the
//! curve), so every stage is a closed-form function of time:
//!
//! ```text
//!  level
//!   1.0 ┤      ╱╲
//!       │     ╱  ╲_
//!   S   │    ╱     ‾‾‾‾‾‾‾‾‾╲
//!       │   ╱               ╲_
//!   s0  ┤__╱                  ‾‾──__
//!       └──┬─────┬──────────┬────────→ t
//!        attack  decay      gate off → release
//! ```
//!
//! - **Attack** is linear from the captured start level `s0` to 1.0. This is
//!   the same shape the backend ramp primitive produces, so the handover from
//!   the trigger-time ramp to control-rate updates has no discontinuity.
//! - **Decay** and **release** approach their targets exponentially with a
//!   time constant of `duration / TIME_CONSTANTS_PER_STAGE`.

use libm::expf;

/// Number of time constants that fit into a nominal decay or release time.
///
/// After five time constants an exponential segment has covered 99.3% of its
/// distance, which is treated as "finished" for the nominal stage duration.
pub const TIME_CONSTANTS_PER_STAGE: f32 = 5.0;

/// Shortest stage duration in seconds; anything below snaps.
pub const MIN_STAGE_TIME: f32 = 1.0e-4;

/// Attack/decay/sustain/release settings for one envelope.
///
/// Times are in seconds, sustain is a level in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EnvelopeShape {
    /// Attack time in seconds.
    pub attack: f32,
    /// Decay time in seconds.
    pub decay: f32,
    /// Sustain level, 0.0 to 1.0.
    pub sustain: f32,
    /// Release time in seconds.
    pub release: f32,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.2,
            sustain: 0.7,
            release: 0.4,
        }
    }
}

impl EnvelopeShape {
    /// Build a shape, clamping every field into its valid range.
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
        }
    }

    /// Whether the attack is long enough to need a ramp.
    #[inline]
    pub fn has_attack(&self) -> bool {
        self.attack > MIN_STAGE_TIME
    }

    /// Whether `elapsed` seconds after the gate opened still lie in the attack.
    #[inline]
    pub fn in_attack(&self, elapsed: f32) -> bool {
        self.has_attack() && elapsed < self.attack
    }

    /// Level while the gate is open, `elapsed` seconds after the trigger.
    ///
    /// `start` is the level captured at trigger time (0.0 for a voice that was
    /// silent, the in-flight level for a stolen or re-pressed voice).
    pub fn gated_level(&self, start: f32, elapsed: f32) -> f32 {
        let elapsed = elapsed.max(0.0);
        if self.in_attack(elapsed) {
            return attack_level(start, elapsed / self.attack);
        }
        let since_peak = if self.has_attack() {
            elapsed - self.attack
        } else {
            elapsed
        };
        exponential_approach(1.0, self.sustain, since_peak, self.decay).clamp(0.0, 1.0)
    }

    /// Level `elapsed` seconds after the gate closed at level `from`.
    pub fn released_level(&self, from: f32, elapsed: f32) -> f32 {
        exponential_approach(from, 0.0, elapsed.max(0.0), self.release)
    }

    /// Time constant of the decay segment in seconds.
    #[inline]
    pub fn decay_tau(&self) -> f32 {
        stage_tau(self.decay)
    }

    /// Time constant of the release segment in seconds.
    #[inline]
    pub fn release_tau(&self) -> f32 {
        stage_tau(self.release)
    }
}

/// Linear attack from `start` toward 1.0 at `progress` in `[0, 1]`.
#[inline]
pub fn attack_level(start: f32, progress: f32) -> f32 {
    let p = progress.clamp(0.0, 1.0);
    (start + (1.0 - start) * p).clamp(0.0, 1.0)
}

/// Exponential approach from `from` toward `to` over a nominal `duration`.
///
/// Durations shorter than [`MIN_STAGE_TIME`] jump straight to `to`.
#[inline]
pub fn exponential_approach(from: f32, to: f32, elapsed: f32, duration: f32) -> f32 {
    if duration <= MIN_STAGE_TIME {
        return to;
    }
    to + (from - to) * expf(-elapsed / stage_tau(duration))
}

/// Linear interpolation between a captured `(start, peak)` pair.
///
/// Used for every attack-window destination so that control-rate updates lie
/// on exactly the same line as the ramp issued at trigger time.
#[inline]
pub fn attack_interpolate(start: f32, peak: f32, elapsed: f32, attack: f32) -> f32 {
    if attack <= MIN_STAGE_TIME {
        return peak;
    }
    let p = (elapsed / attack).clamp(0.0, 1.0);
    start + (peak - start) * p
}

#[inline]
fn stage_tau(duration: f32) -> f32 {
    duration.max(MIN_STAGE_TIME) / TIME_CONSTANTS_PER_STAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_starts_at_captured_level_and_ends_at_one() {
        let shape = EnvelopeShape::new(0.1, 0.2, 0.5, 0.3);
        assert!((shape.gated_level(0.3, 0.0) - 0.3).abs() < 1e-6);
        assert!((shape.gated_level(0.3, 0.05) - 0.65).abs() < 1e-5);
        assert!((shape.gated_level(0.3, 0.1) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decay_settles_at_sustain() {
        let shape = EnvelopeShape::new(0.01, 0.2, 0.4, 0.3);
        let level = shape.gated_level(0.0, 0.01 + 0.2 * 2.0);
        assert!((level - 0.4).abs() < 1e-3, "got {level}");
    }

    #[test]
    fn zero_attack_starts_decay_immediately() {
        let shape = EnvelopeShape::new(0.0, 0.1, 0.5, 0.1);
        assert!((shape.gated_level(0.0, 0.0) - 1.0).abs() < 1e-6);
        assert!(!shape.in_attack(0.0));
    }

    #[test]
    fn release_decays_toward_zero() {
        let shape = EnvelopeShape::new(0.01, 0.1, 0.5, 0.5);
        let at_start = shape.released_level(0.8, 0.0);
        let at_end = shape.released_level(0.8, 0.5);
        assert!((at_start - 0.8).abs() < 1e-6);
        assert!(at_end < 0.8 * 0.01, "got {at_end}");
    }

    #[test]
    fn zero_release_is_instant() {
        let shape = EnvelopeShape::new(0.01, 0.1, 0.5, 0.0);
        assert_eq!(shape.released_level(0.9, 0.0), 0.0);
    }

    #[test]
    fn interpolation_hits_both_endpoints() {
        assert!((attack_interpolate(200.0, 800.0, 0.0, 0.5) - 200.0).abs() < 1e-4);
        assert!((attack_interpolate(200.0, 800.0, 0.25, 0.5) - 500.0).abs() < 1e-3);
        assert!((attack_interpolate(200.0, 800.0, 0.5, 0.5) - 800.0).abs() < 1e-3);
        assert!((attack_interpolate(200.0, 800.0, 9.0, 0.5) - 800.0).abs() < 1e-3);
    }

    #[test]
    fn new_clamps_fields() {
        let shape = EnvelopeShape::new(-1.0, -1.0, 2.0, -3.0);
        assert_eq!(shape.attack, 0.0);
        assert_eq!(shape.decay, 0.0);
        assert_eq!(shape.sustain, 1.0);
        assert_eq!(shape.release, 0.0);
    }
}
