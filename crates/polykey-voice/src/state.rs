//! Per-voice runtime state owned by the control core.
//!
//! Everything here is plain data. [`Voice`](crate::Voice) mutates it from the
//! note-event path (trigger, retrigger, release) and from the control loop
//! (tick), always under the voice's lock.

use polykey_core::{EnvelopeShape, OnePoleSmoother, attack_interpolate};

/// Lifecycle stage of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceStage {
    /// Silent and free for allocation.
    #[default]
    Idle,
    /// Gate open, loudness envelope still in its attack.
    Attacking,
    /// Gate open, past the loudness attack.
    Sustaining,
    /// Gate closed, envelopes decaying toward zero.
    Releasing,
}

impl VoiceStage {
    /// Short name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            VoiceStage::Idle => "idle",
            VoiceStage::Attacking => "attacking",
            VoiceStage::Sustaining => "sustaining",
            VoiceStage::Releasing => "releasing",
        }
    }
}

/// One value per envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeLevels {
    /// Modulator envelope (FM index).
    pub modulator: f32,
    /// Auxiliary envelope (pitch, filter).
    pub auxiliary: f32,
    /// Loudness envelope (output gain).
    pub loudness: f32,
}

impl EnvelopeLevels {
    /// All three at the same value.
    pub const fn splat(value: f32) -> Self {
        Self {
            modulator: value,
            auxiliary: value,
            loudness: value,
        }
    }
}

/// The three envelope shapes of a template, grouped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSet {
    /// Modulator envelope.
    pub modulator: EnvelopeShape,
    /// Auxiliary envelope.
    pub auxiliary: EnvelopeShape,
    /// Loudness envelope.
    pub loudness: EnvelopeShape,
}

impl EnvelopeSet {
    /// Levels with the gate open, `elapsed` seconds per envelope after the
    /// trigger, starting from the captured `start` levels.
    pub fn gated(&self, start: EnvelopeLevels, elapsed: EnvelopeLevels) -> EnvelopeLevels {
        EnvelopeLevels {
            modulator: self.modulator.gated_level(start.modulator, elapsed.modulator),
            auxiliary: self.auxiliary.gated_level(start.auxiliary, elapsed.auxiliary),
            loudness: self.loudness.gated_level(start.loudness, elapsed.loudness),
        }
    }

    /// Levels after the gate closed at `from`, `elapsed` seconds per envelope.
    pub fn released(&self, from: EnvelopeLevels, elapsed: EnvelopeLevels) -> EnvelopeLevels {
        EnvelopeLevels {
            modulator: self.modulator.released_level(from.modulator, elapsed.modulator),
            auxiliary: self.auxiliary.released_level(from.auxiliary, elapsed.auxiliary),
            loudness: self.loudness.released_level(from.loudness, elapsed.loudness),
        }
    }
}

/// Seconds since the gate opened (or closed), one clock per envelope.
///
/// The clocks always move together; they are separate fields because each
/// envelope is evaluated against its own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeClocks {
    /// Modulator envelope clock.
    pub modulator: f32,
    /// Auxiliary envelope clock.
    pub auxiliary: f32,
    /// Loudness envelope clock.
    pub loudness: f32,
}

impl EnvelopeClocks {
    /// Set every clock to `elapsed`.
    pub fn set_all(&mut self, elapsed: f32) {
        let elapsed = elapsed.max(0.0);
        self.modulator = elapsed;
        self.auxiliary = elapsed;
        self.loudness = elapsed;
    }

    /// Advance every clock by `delta_time`.
    pub fn advance(&mut self, delta_time: f32) {
        let dt = delta_time.max(0.0);
        self.modulator += dt;
        self.auxiliary += dt;
        self.loudness += dt;
    }

    /// Back to zero.
    pub fn reset(&mut self) {
        self.set_all(0.0);
    }

    /// The clocks shifted forward by `offset` seconds, as levels-input.
    pub fn ahead(&self, offset: f32) -> EnvelopeLevels {
        EnvelopeLevels {
            modulator: self.modulator + offset,
            auxiliary: self.auxiliary + offset,
            loudness: self.loudness + offset,
        }
    }
}

/// `(start, peak)` pair captured at trigger time for one destination.
///
/// While open, control-rate updates interpolate along this line instead of
/// re-evaluating the combination formula, so they agree with the ramp the
/// trigger already issued.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttackCapture {
    /// Destination value at the moment of the trigger.
    pub start: f32,
    /// Destination value at the end of the attack.
    pub peak: f32,
    /// Attack duration in seconds.
    pub duration: f32,
    /// Cleared when the attack window ends or is cut short.
    pub active: bool,
}

impl AttackCapture {
    /// Capture a window; inactive when there is no attack to speak of.
    pub fn open(start: f32, peak: f32, shape: &EnvelopeShape) -> Self {
        Self {
            start,
            peak,
            duration: shape.attack,
            active: shape.has_attack(),
        }
    }

    /// Whether `elapsed` still falls inside the open window.
    #[inline]
    pub fn covers(&self, elapsed: f32) -> bool {
        self.active && elapsed < self.duration
    }

    /// Value on the captured line at `elapsed`.
    #[inline]
    pub fn value_at(&self, elapsed: f32) -> f32 {
        attack_interpolate(self.start, self.peak, elapsed, self.duration)
    }

    /// End the window early.
    pub fn close(&mut self) {
        self.active = false;
    }
}

/// Live base values of a voice, including per-note values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceBase {
    /// Note frequency in Hz after pitch modifiers.
    pub frequency: f32,
    /// Oscillator amplitude.
    pub amplitude: f32,
    /// Filter cutoff before key tracking.
    pub filter_cutoff: f32,
    /// FM index before modulation.
    pub mod_index: f32,
    /// FM ratio before global modulation.
    pub mod_ratio: f32,
}

/// Last values sent to the backend for the combined destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IssuedTargets {
    /// Frequency in Hz.
    pub frequency: f32,
    /// Filter cutoff in Hz.
    pub filter_cutoff: f32,
    /// FM index.
    pub mod_index: f32,
    /// FM ratio.
    pub mod_ratio: f32,
    /// Output gain.
    pub output_gain: f32,
}

/// Everything the control core tracks for one voice between events.
#[derive(Debug, Clone)]
pub struct VoiceRuntimeState {
    /// Whether the note is held.
    pub gate_open: bool,
    /// Envelope clocks; time since trigger while gated, since release after.
    pub clocks: EnvelopeClocks,
    /// Clock time of the last full trigger.
    pub trigger_timestamp: f64,
    /// Incremented by every full trigger.
    pub trigger_sequence: u64,
    /// Last trigger sequence the control loop has seen.
    pub observed_sequence: u64,
    /// Levels each envelope started its attack from.
    pub attack_start: EnvelopeLevels,
    /// Levels each envelope started its release from.
    pub release_from: EnvelopeLevels,
    /// Attack-window line for the FM index.
    pub index_attack: AttackCapture,
    /// Attack-window line for pitch.
    pub pitch_attack: AttackCapture,
    /// Attack-window line for filter cutoff.
    pub filter_attack: AttackCapture,
    /// Per-voice LFO phase in `[0, 1)`.
    pub lfo_phase: f32,
    /// Completed LFO cycles; seeds sample-and-hold.
    pub lfo_cycle: u32,
    /// LFO delay fade-in factor in `[0, 1]`.
    pub lfo_ramp: f32,
    /// Touch position when the note started.
    pub initial_touch_x: f32,
    /// Latest touch position.
    pub current_touch_x: f32,
    /// Octave offset of the note from the key-tracking reference.
    pub key_tracking_value: f32,
    /// Live base values.
    pub base: VoiceBase,
    /// Last issued backend targets.
    pub issued: IssuedTargets,
    /// Clock time the gate last closed.
    pub release_started_at: f64,
    /// Smoother for touch-only filter modulation.
    pub touch_smoother: OnePoleSmoother,
}

impl VoiceRuntimeState {
    /// Fresh idle state using `touch_smoothing` as the smoother time constant.
    pub fn new(touch_smoothing: f32) -> Self {
        Self {
            gate_open: false,
            clocks: EnvelopeClocks::default(),
            trigger_timestamp: 0.0,
            trigger_sequence: 0,
            observed_sequence: 0,
            attack_start: EnvelopeLevels::default(),
            release_from: EnvelopeLevels::default(),
            index_attack: AttackCapture::default(),
            pitch_attack: AttackCapture::default(),
            filter_attack: AttackCapture::default(),
            lfo_phase: 0.0,
            lfo_cycle: 0,
            lfo_ramp: 1.0,
            initial_touch_x: 0.0,
            current_touch_x: 0.0,
            key_tracking_value: 0.0,
            base: VoiceBase::default(),
            issued: IssuedTargets::default(),
            release_started_at: 0.0,
            touch_smoother: OnePoleSmoother::new(touch_smoothing),
        }
    }

    /// Touch movement since the note started.
    #[inline]
    pub fn touch_delta(&self) -> f32 {
        self.current_touch_x - self.initial_touch_x
    }

    /// Close every attack window.
    pub fn close_attack_windows(&mut self) {
        self.index_attack.close();
        self.pitch_attack.close();
        self.filter_attack.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_capture_without_attack_is_inactive() {
        let shape = EnvelopeShape::new(0.0, 0.1, 0.5, 0.1);
        let capture = AttackCapture::open(100.0, 200.0, &shape);
        assert!(!capture.covers(0.0));
        assert_eq!(capture.value_at(0.0), 200.0);
    }

    #[test]
    fn attack_capture_covers_window() {
        let shape = EnvelopeShape::new(0.2, 0.1, 0.5, 0.1);
        let mut capture = AttackCapture::open(100.0, 300.0, &shape);
        assert!(capture.covers(0.1));
        assert!((capture.value_at(0.1) - 200.0).abs() < 1e-3);
        assert!(!capture.covers(0.2));
        capture.close();
        assert!(!capture.covers(0.0));
    }

    #[test]
    fn clocks_move_together() {
        let mut clocks = EnvelopeClocks::default();
        clocks.advance(0.01);
        clocks.advance(-1.0);
        assert_eq!(clocks.modulator, 0.01);
        assert_eq!(clocks.auxiliary, clocks.loudness);
        clocks.set_all(-5.0);
        assert_eq!(clocks.loudness, 0.0);
    }
}
