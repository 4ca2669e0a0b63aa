//! The engine context object.
//!
//! [`Engine`] is built once and owns everything the two execution contexts
//! share: the voice pool (event side), the control loop or the scheduler
//! running it (control side), the global parameters, and the effects stage.
//! Dropping it stops the scheduler and the backend graphs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use polykey_core::combine::{DELAY_TIME_RANGE, GAIN_RANGE};
use polykey_core::{EnvelopeShape, MAX_BPM, MIN_BPM};
use polykey_voice::{
    GlobalLfoSettings, KeyIndex, LfoSettings, ModulationAmounts, PitchModifiers, PoolConfig,
    SharedClock, TemplateOverrides, VoiceGraph, VoicePool, VoiceSnapshot, VoiceTemplate, Waveform,
};
use tracing::debug;

use crate::control::{ControlLoop, SharedEffects};
use crate::effects::{EffectsGraph, EffectsParam};
use crate::error::EngineError;
use crate::params::{GlobalParam, GlobalParams};
use crate::scheduler::Scheduler;

/// Shortest allowed control interval.
pub const MIN_CONTROL_INTERVAL: Duration = Duration::from_millis(5);
/// Longest allowed control interval.
pub const MAX_CONTROL_INTERVAL: Duration = Duration::from_millis(20);
/// Largest voice arena an engine may build.
pub const MAX_POLYPHONY: usize = 64;

/// Everything needed to build an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Time between control cycles.
    pub control_interval: Duration,
    /// Voice pool sizing and per-voice settings.
    pub pool: PoolConfig,
    /// Initial tempo in BPM.
    pub tempo_bpm: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            control_interval: Duration::from_millis(10),
            pool: PoolConfig::default(),
            tempo_bpm: 120.0,
        }
    }
}

impl EngineSettings {
    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_CONTROL_INTERVAL..=MAX_CONTROL_INTERVAL).contains(&self.control_interval) {
            return Err(EngineError::invalid(
                "control_interval",
                format!(
                    "{:?} is outside {:?}..={:?}",
                    self.control_interval, MIN_CONTROL_INTERVAL, MAX_CONTROL_INTERVAL
                ),
            ));
        }
        if !(1..=MAX_POLYPHONY).contains(&self.pool.max_polyphony) {
            return Err(EngineError::invalid(
                "max_polyphony",
                format!("{} is outside 1..={MAX_POLYPHONY}", self.pool.max_polyphony),
            ));
        }
        if self.pool.polyphony == 0 || self.pool.polyphony > self.pool.max_polyphony {
            return Err(EngineError::invalid(
                "polyphony",
                format!(
                    "{} is outside 1..={}",
                    self.pool.polyphony, self.pool.max_polyphony
                ),
            ));
        }
        let voice = &self.pool.voice;
        if !(1.0..=4.0).contains(&voice.release_multiplier) {
            return Err(EngineError::invalid(
                "release_multiplier",
                format!("{} is outside 1.0..=4.0", voice.release_multiplier),
            ));
        }
        if !(voice.level_tolerance.is_finite() && voice.level_tolerance > 0.0) {
            return Err(EngineError::invalid("level_tolerance", "must be positive"));
        }
        if !(voice.max_trigger_latency.is_finite() && voice.max_trigger_latency > 0.0) {
            return Err(EngineError::invalid("max_trigger_latency", "must be positive"));
        }
        if !(MIN_BPM..=MAX_BPM).contains(&self.tempo_bpm) {
            return Err(EngineError::invalid(
                "tempo_bpm",
                format!("{} is outside {MIN_BPM}..={MAX_BPM}", self.tempo_bpm),
            ));
        }
        Ok(())
    }
}

/// Which of a template's three envelopes to edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTarget {
    /// FM index envelope.
    Modulator,
    /// Pitch and filter envelope.
    Auxiliary,
    /// Output gain envelope.
    Loudness,
}

/// The polyphonic control core.
pub struct Engine<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    pool: VoicePool<G>,
    params: Arc<GlobalParams>,
    effects: SharedEffects<E>,
    clock: SharedClock,
    settings: EngineSettings,
    control: Option<ControlLoop<G, E>>,
    scheduler: Option<Scheduler<G, E>>,
}

impl<G, E> Engine<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    /// Build an engine with its scheduler stopped.
    ///
    /// `voice_factory` is called once per arena slot to create that voice's
    /// backend graph.
    pub fn new(
        mut settings: EngineSettings,
        template: VoiceTemplate,
        clock: SharedClock,
        voice_factory: impl FnMut(usize) -> G,
        effects: E,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        settings.pool.voice.ramp_time = settings.control_interval.as_secs_f32();

        let pool = VoicePool::new(settings.pool, template, Arc::clone(&clock), voice_factory);
        let params = Arc::new(GlobalParams::new());
        params.load_template(pool.template());
        params.set(GlobalParam::TempoBpm, settings.tempo_bpm);

        let effects = Arc::new(Mutex::new(effects));
        {
            let mut fx = effects.lock();
            fx.ramp_parameter(EffectsParam::DelayTime, params.get(GlobalParam::DelayTime), 0.0);
            fx.ramp_parameter(
                EffectsParam::MixerVolume,
                params.get(GlobalParam::MixerVolume),
                0.0,
            );
        }

        let control = ControlLoop::new(
            pool.arena(),
            Arc::clone(&params),
            Arc::clone(&effects),
            Arc::clone(&clock),
            settings.control_interval,
        );
        debug!(
            max_polyphony = settings.pool.max_polyphony,
            polyphony = settings.pool.polyphony,
            template = %pool.template().name,
            "engine built"
        );
        Ok(Self {
            pool,
            params,
            effects,
            clock,
            settings,
            control: Some(control),
            scheduler: None,
        })
    }

    // -- lifecycle --------------------------------------------------------

    /// Start the control-rate thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let control = self.control.take().ok_or(EngineError::AlreadyRunning)?;
        self.scheduler = Some(Scheduler::start(control)?);
        Ok(())
    }

    /// Stop the control-rate thread. Does nothing if it is not running.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(scheduler) = self.scheduler.take() {
            self.control = Some(scheduler.stop()?);
        }
        Ok(())
    }

    /// Whether the control-rate thread is running.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Run one control cycle on the calling thread.
    ///
    /// Only allowed while the scheduler is stopped; used by tests and
    /// scripted scenarios together with a manual clock.
    pub fn step(&mut self) -> Result<(), EngineError> {
        let control = self.control.as_mut().ok_or(EngineError::SchedulerRunning)?;
        control.cycle();
        Ok(())
    }

    // -- input API --------------------------------------------------------

    /// Start a note; see [`VoicePool::note_on`].
    pub fn note_on(
        &mut self,
        frequency: f32,
        key: KeyIndex,
        pitch: PitchModifiers,
        touch_x: f32,
    ) -> Option<usize> {
        self.pool.note_on(frequency, key, pitch, touch_x)
    }

    /// Start a note with per-note overrides.
    pub fn note_on_with_overrides(
        &mut self,
        frequency: f32,
        key: KeyIndex,
        pitch: PitchModifiers,
        touch_x: f32,
        overrides: TemplateOverrides,
    ) -> Option<usize> {
        self.pool
            .note_on_with_overrides(frequency, key, pitch, touch_x, overrides)
    }

    /// Release a note.
    pub fn note_off(&mut self, key: KeyIndex) {
        self.pool.note_off(key);
    }

    /// Update the touch position of a held key.
    pub fn update_touch_position(&mut self, key: KeyIndex, touch_x: f32) {
        self.pool.update_touch_position(key, touch_x);
    }

    /// Release everything.
    pub fn all_notes_off(&mut self) {
        self.pool.all_notes_off();
    }

    /// Voices in use; 1 means mono.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.pool.set_polyphony(polyphony);
    }

    /// Legato in mono mode.
    pub fn set_legato(&mut self, legato: bool) {
        self.pool.set_legato(legato);
    }

    // -- sound edits ------------------------------------------------------

    /// Tempo for tempo-synced LFOs.
    pub fn set_tempo(&mut self, bpm: f32) {
        self.params.set(GlobalParam::TempoBpm, bpm);
    }

    /// Filter base cutoff in Hz.
    pub fn set_filter_cutoff(&mut self, hz: f32) {
        self.pool.set_filter_cutoff(hz);
    }

    /// Oscillator amplitude.
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.pool.set_amplitude(amplitude);
    }

    /// FM index base.
    pub fn set_mod_index(&mut self, index: f32) {
        self.pool.set_mod_index(index);
    }

    /// FM ratio base.
    pub fn set_mod_ratio(&mut self, ratio: f32) {
        self.pool.set_mod_ratio(ratio);
    }

    /// Carrier waveform; reconfigures every graph in place.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.pool.update_template(|t| t.waveform = waveform);
    }

    /// Replace one envelope shape.
    pub fn set_envelope(&mut self, target: EnvelopeTarget, shape: EnvelopeShape) {
        self.pool.update_template(|t| match target {
            EnvelopeTarget::Modulator => t.modulator_env = shape,
            EnvelopeTarget::Auxiliary => t.auxiliary_env = shape,
            EnvelopeTarget::Loudness => t.loudness_env = shape,
        });
    }

    /// Replace the per-voice LFO settings.
    pub fn set_voice_lfo(&mut self, lfo: LfoSettings) {
        self.pool.update_template(|t| t.lfo = lfo);
    }

    /// Replace the modulation amounts.
    pub fn set_modulation_amounts(&mut self, amounts: ModulationAmounts) {
        self.pool.update_template(|t| t.amounts = amounts);
    }

    /// Replace the global LFO settings.
    pub fn set_global_lfo(&mut self, lfo: GlobalLfoSettings) {
        self.pool.update_template(|t| t.global_lfo = lfo);
        self.params.load_template(self.pool.template());
        self.push_unmodulated_effects();
    }

    /// Effects delay time base in seconds.
    ///
    /// Sent to the effects stage right away unless the global LFO modulates
    /// it, in which case the next control cycle picks it up.
    pub fn set_delay_time(&mut self, seconds: f32) {
        let seconds = seconds.clamp(DELAY_TIME_RANGE.0, DELAY_TIME_RANGE.1);
        self.params.set(GlobalParam::DelayTime, seconds);
        self.pool.update_template(|t| t.effects.delay_time = seconds);
        self.push_unmodulated_effects();
    }

    /// Mixer volume base, with the same deferral rule as the delay time.
    pub fn set_mixer_volume(&mut self, volume: f32) {
        let volume = volume.clamp(GAIN_RANGE.0, GAIN_RANGE.1);
        self.params.set(GlobalParam::MixerVolume, volume);
        self.pool.update_template(|t| t.effects.mixer_volume = volume);
        self.push_unmodulated_effects();
    }

    /// Apply a whole template: voices, global LFO, and effects bases.
    pub fn apply_template(&mut self, template: VoiceTemplate) {
        self.pool.apply_template(template);
        self.params.load_template(self.pool.template());
        self.push_unmodulated_effects();
    }

    /// The current sound as a template named `name`.
    pub fn capture_current_as_template(&self, name: impl Into<String>) -> VoiceTemplate {
        let mut template = self.pool.template().clone();
        template.name = name.into();
        self.params.store_into(&mut template);
        template
    }

    fn push_unmodulated_effects(&mut self) {
        let ramp = self.settings.control_interval.as_secs_f32();
        let mut fx = self.effects.lock();
        if self.params.get(GlobalParam::LfoToDelayTime) == 0.0 {
            fx.ramp_parameter(
                EffectsParam::DelayTime,
                self.params.get(GlobalParam::DelayTime),
                ramp,
            );
        }
        if self.params.get(GlobalParam::LfoToMixerVolume) == 0.0 {
            fx.ramp_parameter(
                EffectsParam::MixerVolume,
                self.params.get(GlobalParam::MixerVolume),
                ramp,
            );
        }
    }

    // -- inspection -------------------------------------------------------

    /// Voices currently producing sound.
    pub fn sounding_voice_count(&self) -> usize {
        self.pool.sounding_voice_count()
    }

    /// Summary of every voice.
    pub fn snapshots(&self) -> Vec<VoiceSnapshot> {
        self.pool.snapshots()
    }

    /// The voice pool.
    pub fn pool(&self) -> &VoicePool<G> {
        &self.pool
    }

    /// The effects stage.
    pub fn effects(&self) -> SharedEffects<E> {
        Arc::clone(&self.effects)
    }

    /// Global parameter store.
    pub fn params(&self) -> &GlobalParams {
        &self.params
    }

    /// The engine clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl<G, E> Drop for Engine<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            let _ = scheduler.stop();
        }
        self.pool.shutdown();
    }
}

impl<G, E> std::fmt::Debug for Engine<G, E>
where
    G: VoiceGraph + 'static,
    E: EffectsGraph + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pool", &self.pool)
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn interval_out_of_range_is_rejected() {
        let settings = EngineSettings {
            control_interval: Duration::from_millis(50),
            ..EngineSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSetting { field: "control_interval", .. }));
    }

    #[test]
    fn polyphony_above_max_is_rejected() {
        let mut settings = EngineSettings::default();
        settings.pool.max_polyphony = 4;
        settings.pool.polyphony = 8;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn release_multiplier_range() {
        let mut settings = EngineSettings::default();
        settings.pool.voice.release_multiplier = 0.5;
        assert!(settings.validate().is_err());
        settings.pool.voice.release_multiplier = 4.0;
        assert!(settings.validate().is_ok());
    }
}
