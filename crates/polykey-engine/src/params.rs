//! Global parameters shared between the event path and the control loop.
//!
//! [`GlobalParams`] stores each value as `f32` bits in an atomic. The event
//! path calls [`set`](GlobalParams::set) and the control loop calls
//! [`get`](GlobalParams::get) once per cycle, so neither side ever blocks the
//! other on these values.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use polykey_core::combine::{DELAY_TIME_RANGE, GAIN_RANGE};
use polykey_core::{LfoWaveform, MAX_BPM, MIN_BPM};
use polykey_voice::VoiceTemplate;

/// Identifier of a global parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalParam {
    /// Tempo in BPM for tempo-synced LFOs.
    TempoBpm,
    /// Global LFO rate in Hz.
    LfoRate,
    /// Global LFO depth on the effects delay time, in seconds.
    LfoToDelayTime,
    /// Global LFO depth on the mixer volume.
    LfoToMixerVolume,
    /// Effects delay time base in seconds.
    DelayTime,
    /// Mixer volume base.
    MixerVolume,
}

impl GlobalParam {
    /// Every parameter, in storage order.
    pub const ALL: [GlobalParam; 6] = [
        GlobalParam::TempoBpm,
        GlobalParam::LfoRate,
        GlobalParam::LfoToDelayTime,
        GlobalParam::LfoToMixerVolume,
        GlobalParam::DelayTime,
        GlobalParam::MixerVolume,
    ];

    fn index(self) -> usize {
        match self {
            GlobalParam::TempoBpm => 0,
            GlobalParam::LfoRate => 1,
            GlobalParam::LfoToDelayTime => 2,
            GlobalParam::LfoToMixerVolume => 3,
            GlobalParam::DelayTime => 4,
            GlobalParam::MixerVolume => 5,
        }
    }

    /// Valid `(min, max)` range.
    pub fn range(self) -> (f32, f32) {
        match self {
            GlobalParam::TempoBpm => (MIN_BPM, MAX_BPM),
            GlobalParam::LfoRate => (0.0, 50.0),
            GlobalParam::LfoToDelayTime => (-DELAY_TIME_RANGE.1, DELAY_TIME_RANGE.1),
            GlobalParam::LfoToMixerVolume => (-1.0, 1.0),
            GlobalParam::DelayTime => DELAY_TIME_RANGE,
            GlobalParam::MixerVolume => GAIN_RANGE,
        }
    }

    /// Value a fresh engine starts with.
    pub fn default_value(self) -> f32 {
        match self {
            GlobalParam::TempoBpm => 120.0,
            GlobalParam::LfoRate => 0.5,
            GlobalParam::LfoToDelayTime | GlobalParam::LfoToMixerVolume => 0.0,
            GlobalParam::DelayTime => 0.25,
            GlobalParam::MixerVolume => 0.7,
        }
    }

    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            GlobalParam::TempoBpm => "tempo_bpm",
            GlobalParam::LfoRate => "global_lfo_rate",
            GlobalParam::LfoToDelayTime => "global_lfo_to_delay_time",
            GlobalParam::LfoToMixerVolume => "global_lfo_to_mixer_volume",
            GlobalParam::DelayTime => "delay_time",
            GlobalParam::MixerVolume => "mixer_volume",
        }
    }
}

/// Lock-free store for the global parameters.
#[derive(Debug)]
pub struct GlobalParams {
    values: [AtomicU32; 6],
    lfo_waveform: AtomicU8,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            values: GlobalParam::ALL.map(|p| AtomicU32::new(p.default_value().to_bits())),
            lfo_waveform: AtomicU8::new(waveform_to_u8(LfoWaveform::Sine)),
        }
    }
}

impl GlobalParams {
    /// Store with every parameter at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value.
    #[inline]
    pub fn get(&self, param: GlobalParam) -> f32 {
        f32::from_bits(self.values[param.index()].load(Ordering::Acquire))
    }

    /// Write a value, clamped to the parameter's range. Non-finite values
    /// are ignored.
    pub fn set(&self, param: GlobalParam, value: f32) {
        if !value.is_finite() {
            return;
        }
        let (min, max) = param.range();
        self.values[param.index()].store(value.clamp(min, max).to_bits(), Ordering::Release);
    }

    /// Global LFO waveform.
    pub fn lfo_waveform(&self) -> LfoWaveform {
        waveform_from_u8(self.lfo_waveform.load(Ordering::Acquire))
    }

    /// Change the global LFO waveform.
    pub fn set_lfo_waveform(&self, waveform: LfoWaveform) {
        self.lfo_waveform
            .store(waveform_to_u8(waveform), Ordering::Release);
    }

    /// Load the global-LFO and effects sections of a template.
    pub fn load_template(&self, template: &VoiceTemplate) {
        self.set(GlobalParam::LfoRate, template.global_lfo.rate_hz);
        self.set(GlobalParam::LfoToDelayTime, template.global_lfo.to_delay_time);
        self.set(GlobalParam::LfoToMixerVolume, template.global_lfo.to_mixer_volume);
        self.set(GlobalParam::DelayTime, template.effects.delay_time);
        self.set(GlobalParam::MixerVolume, template.effects.mixer_volume);
        self.set_lfo_waveform(template.global_lfo.waveform);
    }

    /// Write the global-LFO and effects values back into `template`.
    pub fn store_into(&self, template: &mut VoiceTemplate) {
        template.global_lfo.rate_hz = self.get(GlobalParam::LfoRate);
        template.global_lfo.to_delay_time = self.get(GlobalParam::LfoToDelayTime);
        template.global_lfo.to_mixer_volume = self.get(GlobalParam::LfoToMixerVolume);
        template.global_lfo.waveform = self.lfo_waveform();
        template.effects.delay_time = self.get(GlobalParam::DelayTime);
        template.effects.mixer_volume = self.get(GlobalParam::MixerVolume);
    }
}

fn waveform_to_u8(waveform: LfoWaveform) -> u8 {
    match waveform {
        LfoWaveform::Sine => 0,
        LfoWaveform::Triangle => 1,
        LfoWaveform::Saw => 2,
        LfoWaveform::Square => 3,
        LfoWaveform::SampleAndHold => 4,
    }
}

fn waveform_from_u8(value: u8) -> LfoWaveform {
    match value {
        1 => LfoWaveform::Triangle,
        2 => LfoWaveform::Saw,
        3 => LfoWaveform::Square,
        4 => LfoWaveform::SampleAndHold,
        _ => LfoWaveform::Sine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let params = GlobalParams::new();
        for p in GlobalParam::ALL {
            let (min, max) = p.range();
            let v = params.get(p);
            assert!((min..=max).contains(&v), "{} = {v}", p.name());
        }
    }

    #[test]
    fn set_clamps_and_ignores_nan() {
        let params = GlobalParams::new();
        params.set(GlobalParam::TempoBpm, 1000.0);
        assert_eq!(params.get(GlobalParam::TempoBpm), MAX_BPM);
        params.set(GlobalParam::TempoBpm, f32::NAN);
        assert_eq!(params.get(GlobalParam::TempoBpm), MAX_BPM);
    }

    #[test]
    fn template_round_trip() {
        let params = GlobalParams::new();
        let mut t = VoiceTemplate::default();
        t.global_lfo.waveform = LfoWaveform::SampleAndHold;
        t.global_lfo.to_delay_time = 0.05;
        t.effects.mixer_volume = 0.3;
        params.load_template(&t);

        let mut out = VoiceTemplate::default();
        params.store_into(&mut out);
        assert_eq!(out.global_lfo.waveform, LfoWaveform::SampleAndHold);
        assert_eq!(out.global_lfo.to_delay_time, 0.05);
        assert_eq!(out.effects.mixer_volume, 0.3);
    }
}
