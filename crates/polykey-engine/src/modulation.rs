//! The global LFO and the effects destinations it drives.

use polykey_core::combine;
use polykey_core::{LfoWaveform, lfo_value};

/// Free-running global LFO state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalModulation {
    phase: f32,
    cycle: u32,
}

impl GlobalModulation {
    /// LFO at phase zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `delta_time` seconds at `rate_hz` and return the new value.
    pub fn advance(&mut self, waveform: LfoWaveform, rate_hz: f32, delta_time: f32) -> f32 {
        let next = self.phase + rate_hz.max(0.0) * delta_time.max(0.0);
        if next >= 1.0 {
            self.cycle = self.cycle.wrapping_add(next as u32);
        }
        self.phase = polykey_core::wrap_phase(next);
        self.value(waveform)
    }

    /// Current value in `[-1, 1]`.
    pub fn value(&self, waveform: LfoWaveform) -> f32 {
        lfo_value(waveform, self.phase, self.cycle)
    }

    /// Current phase in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }
}

/// Effects values for one control cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsTargets {
    /// Delay time in seconds.
    pub delay_time: f32,
    /// Mixer volume.
    pub mixer_volume: f32,
}

impl EffectsTargets {
    /// Combine the bases with the global LFO.
    pub fn compute(
        delay_base: f32,
        mixer_base: f32,
        lfo: f32,
        to_delay_time: f32,
        to_mixer_volume: f32,
    ) -> Self {
        Self {
            delay_time: combine::delay_time(delay_base, lfo, to_delay_time),
            mixer_volume: combine::mixer_volume(mixer_base, lfo, to_mixer_volume),
        }
    }
}
