//! A single voice: runtime state plus the backend graph it drives.
//!
//! Two contexts touch a voice. The note-event path calls [`Voice::trigger`],
//! [`Voice::retrigger`], and [`Voice::release`]; the control loop calls
//! [`Voice::tick`]. Both compute envelope levels analytically from time
//! (see [`polykey_core::curves`]), so whichever runs last sees a consistent
//! picture and the backend only ever receives short linear ramps.

use std::sync::Arc;

use polykey_core::combine::{self, Contributions};
use polykey_core::{
    LfoMode, MIN_STAGE_TIME, OnePoleSmoother, key_tracking_value, lfo_value, wrap_phase,
};
use tracing::{debug, trace, warn};

use crate::graph::{VoiceGraph, VoiceParam};
use crate::pool::KeyIndex;
use crate::state::{
    AttackCapture, EnvelopeLevels, EnvelopeSet, VoiceRuntimeState, VoiceStage,
};
use crate::template::{TemplateOverrides, VoiceTemplate};

/// Engine-wide knobs every voice needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    /// Length of each control-rate ramp; equal to the control interval.
    pub ramp_time: f32,
    /// A release finishes after `release × release_multiplier` seconds.
    pub release_multiplier: f32,
    /// Largest disagreement between the analytic output level and the
    /// backend's reported value before the backend wins.
    pub level_tolerance: f32,
    /// Largest plausible delay between a trigger and the first tick that
    /// observes it, in seconds.
    pub max_trigger_latency: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            ramp_time: 0.01,
            release_multiplier: 1.25,
            level_tolerance: 0.1,
            max_trigger_latency: 0.25,
        }
    }
}

/// Inputs for one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Clock time of this tick.
    pub now: f64,
    /// Seconds since the previous tick.
    pub delta_time: f32,
    /// Current global LFO value in `[-1, 1]`.
    pub global_lfo: f32,
    /// Tempo for tempo-synced LFOs.
    pub tempo_bpm: f32,
}

/// Note parameters for a full trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteStart {
    /// Frequency in Hz, pitch modifiers already applied.
    pub frequency: f32,
    /// Touch position at note-on.
    pub touch_x: f32,
    /// Per-note template overrides.
    pub overrides: TemplateOverrides,
}

impl NoteStart {
    /// A note with no overrides.
    pub fn new(frequency: f32, touch_x: f32) -> Self {
        Self {
            frequency,
            touch_x,
            overrides: TemplateOverrides::default(),
        }
    }
}

/// Read-only view of a voice for inspection and display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSnapshot {
    /// Arena index.
    pub slot: usize,
    /// Lifecycle stage.
    pub stage: VoiceStage,
    /// Key currently mapped to this voice, if any.
    pub key: Option<KeyIndex>,
    /// Note frequency in Hz.
    pub frequency: f32,
    /// Octave offset frozen at trigger.
    pub key_tracking_value: f32,
    /// Clock time of the last trigger or retrigger.
    pub last_trigger_time: f64,
    /// Analytic loudness level at snapshot time.
    pub output_level: f32,
    /// Whether the allocator may hand this voice out.
    pub available: bool,
}

/// One voice of the pool.
pub struct Voice<G: VoiceGraph> {
    slot: usize,
    graph: G,
    template: Arc<VoiceTemplate>,
    settings: VoiceSettings,
    state: VoiceRuntimeState,
    stage: VoiceStage,
    available: bool,
    sounding: bool,
    last_trigger_time: f64,
}

impl<G: VoiceGraph> Voice<G> {
    /// Build an idle voice and start its graph.
    pub fn new(slot: usize, mut graph: G, template: Arc<VoiceTemplate>, settings: VoiceSettings) -> Self {
        let mut state = VoiceRuntimeState::new(template.touch_smoothing);
        state.base.amplitude = template.base.amplitude;
        state.base.filter_cutoff = template.base.filter_cutoff;
        state.base.mod_index = template.base.mod_index;
        state.base.mod_ratio = template.base.mod_ratio;

        graph.set_waveform(template.waveform);
        graph.start();
        graph.ramp_parameter(VoiceParam::OutputGain, 0.0, 0.0);
        graph.ramp_parameter(VoiceParam::Amplitude, state.base.amplitude, 0.0);
        graph.ramp_parameter(VoiceParam::ModRatio, state.base.mod_ratio, 0.0);
        state.issued.mod_ratio = state.base.mod_ratio;

        Self {
            slot,
            graph,
            template,
            settings,
            state,
            stage: VoiceStage::Idle,
            available: true,
            sounding: false,
            last_trigger_time: f64::NEG_INFINITY,
        }
    }

    // -- event path -------------------------------------------------------

    /// Start a note, resetting every envelope clock.
    ///
    /// If the voice was still sounding (stolen, or the same key pressed
    /// again during its release) every envelope starts from the level it is
    /// at right now, so there is no click.
    pub fn trigger(&mut self, now: f64, note: NoteStart) {
        if !(note.frequency.is_finite() && note.frequency > 0.0) {
            warn!(slot = self.slot, frequency = note.frequency, "ignoring trigger with invalid frequency");
            return;
        }
        let env = self.envelopes();
        let was_sounding = self.sounding;
        let current = self.levels_at(now);
        let start_gain = if was_sounding {
            self.cross_checked_output(current.loudness)
        } else {
            0.0
        };
        let touch = sanitize_touch(note.touch_x);

        let template = Arc::clone(&self.template);
        let st = &mut self.state;
        st.base.frequency = note.frequency;
        st.base.filter_cutoff = note
            .overrides
            .filter_cutoff
            .filter(|hz| hz.is_finite())
            .map(|hz| hz.clamp(combine::FILTER_CUTOFF_RANGE.0, combine::FILTER_CUTOFF_RANGE.1))
            .unwrap_or(template.base.filter_cutoff);
        st.key_tracking_value = key_tracking_value(note.frequency);
        st.initial_touch_x = touch;
        st.current_touch_x = touch;
        st.touch_smoother.reset();
        st.gate_open = true;
        st.clocks.reset();
        st.trigger_timestamp = now;
        st.trigger_sequence = st.trigger_sequence.wrapping_add(1);
        st.attack_start = EnvelopeLevels {
            modulator: current.modulator,
            auxiliary: current.auxiliary,
            loudness: start_gain,
        };
        st.release_from = EnvelopeLevels::default();
        if template.lfo.mode == LfoMode::Trigger {
            st.lfo_phase = 0.0;
            st.lfo_cycle = 0;
        }
        st.lfo_ramp = if template.lfo.delay > MIN_STAGE_TIME { 0.0 } else { 1.0 };

        let lfo = self.lfo_output();
        let start = self.state.attack_start;
        let pitch_start = self.pitch_at(start.auxiliary, lfo);
        let pitch_peak = self.pitch_at(1.0, lfo);
        let filter_peak = self.filter_at(1.0, lfo, 0.0);
        let index_peak = self.index_at(1.0, lfo);
        let (filter_start, index_start) = if was_sounding {
            (
                self.graph.current_value(VoiceParam::FilterCutoff),
                self.graph.current_value(VoiceParam::ModIndex),
            )
        } else {
            let filter = self.filter_at(start.auxiliary, lfo, 0.0);
            let index = self.index_at(start.modulator, lfo);
            self.graph.ramp_parameter(VoiceParam::FilterCutoff, filter, 0.0);
            self.graph.ramp_parameter(VoiceParam::ModIndex, index, 0.0);
            (filter, index)
        };

        self.state.pitch_attack = AttackCapture::open(pitch_start, pitch_peak, &env.auxiliary);
        self.state.filter_attack = AttackCapture::open(filter_start, filter_peak, &env.auxiliary);
        self.state.index_attack = AttackCapture::open(index_start, index_peak, &env.modulator);

        // Pitch jumps to the new note; everything else glides from where it is.
        self.graph.ramp_parameter(VoiceParam::Frequency, pitch_start, 0.0);
        self.ramp_over_attack(VoiceParam::Frequency, pitch_peak, env.auxiliary.attack);
        self.ramp_over_attack(VoiceParam::FilterCutoff, filter_peak, env.auxiliary.attack);
        self.ramp_over_attack(VoiceParam::ModIndex, index_peak, env.modulator.attack);
        self.ramp_over_attack(VoiceParam::OutputGain, 1.0, env.loudness.attack);

        self.stage = if env.loudness.has_attack() {
            VoiceStage::Attacking
        } else {
            VoiceStage::Sustaining
        };
        self.available = false;
        self.sounding = true;
        self.last_trigger_time = now;
        debug!(
            slot = self.slot,
            frequency = note.frequency,
            start_gain,
            stolen = was_sounding,
            "voice triggered"
        );
    }

    /// Change the note of a held voice without restarting its envelopes.
    ///
    /// Pitch snaps to the new note; filter and FM index glide to their
    /// recomputed values over one control interval. Any open attack windows
    /// close: from here on the combination formulas drive every destination.
    /// Returns `false` (and does nothing) when the gate is not open.
    pub fn retrigger(
        &mut self,
        now: f64,
        frequency: f32,
        touch_x: f32,
        filter_cutoff: Option<f32>,
    ) -> bool {
        if !self.sounding || !self.state.gate_open {
            return false;
        }
        if !(frequency.is_finite() && frequency > 0.0) {
            warn!(slot = self.slot, frequency, "ignoring retrigger with invalid frequency");
            return false;
        }
        let current = self.levels_at(now);
        let touch = sanitize_touch(touch_x);

        let st = &mut self.state;
        st.base.frequency = frequency;
        st.base.filter_cutoff = filter_cutoff
            .filter(|hz| hz.is_finite())
            .map(|hz| hz.clamp(combine::FILTER_CUTOFF_RANGE.0, combine::FILTER_CUTOFF_RANGE.1))
            .unwrap_or(self.template.base.filter_cutoff);
        st.key_tracking_value = key_tracking_value(frequency);
        st.initial_touch_x = touch;
        st.current_touch_x = touch;
        st.touch_smoother.reset();
        st.close_attack_windows();

        let lfo = self.lfo_output();
        let ramp = self.settings.ramp_time;
        let pitch = self.pitch_at(current.auxiliary, lfo);
        let filter = self.filter_at(current.auxiliary, lfo, 0.0);
        let index = self.index_at(current.modulator, lfo);
        self.issue(VoiceParam::Frequency, pitch, 0.0);
        self.issue(VoiceParam::FilterCutoff, filter, ramp);
        self.issue(VoiceParam::ModIndex, index, ramp);

        self.last_trigger_time = now;
        debug!(slot = self.slot, frequency, "voice retriggered (legato)");
        true
    }

    /// Close the gate and start every envelope's release from its current
    /// level. Does nothing if the gate is already closed.
    pub fn release(&mut self, now: f64) {
        if !self.sounding || !self.state.gate_open {
            return;
        }
        let levels = self.levels_at(now);
        let st = &mut self.state;
        st.release_from = levels;
        st.gate_open = false;
        st.clocks.reset();
        st.release_started_at = now;
        st.close_attack_windows();
        self.stage = VoiceStage::Releasing;

        let ramp = self.settings.ramp_time;
        let next = self.template.loudness_env.released_level(levels.loudness, ramp);
        self.issue(VoiceParam::OutputGain, combine::output_gain(next), ramp);
        debug!(slot = self.slot, from = levels.loudness, "voice released");
    }

    /// Hand the voice back to the allocator right away.
    ///
    /// Used for stealing: the voice keeps sounding until the trigger that
    /// follows, which captures its in-flight levels.
    pub fn mark_available(&mut self) {
        self.available = true;
    }

    /// Record a new touch position; the next tick applies it.
    pub fn set_touch_position(&mut self, touch_x: f32) {
        if touch_x.is_finite() {
            self.state.current_touch_x = touch_x.clamp(0.0, 1.0);
        }
    }

    /// Stop the backend graph. The voice is unusable afterwards.
    pub fn shutdown(&mut self) {
        self.graph.stop();
        self.sounding = false;
        self.available = false;
        self.stage = VoiceStage::Idle;
    }

    // -- control loop -----------------------------------------------------

    /// One control-rate update.
    pub fn tick(&mut self, ctx: &TickContext) {
        if self.stage == VoiceStage::Idle {
            return;
        }
        let dt = if ctx.delta_time.is_finite() { ctx.delta_time.max(0.0) } else { 0.0 };
        self.update_clocks(ctx.now, dt);
        self.advance_lfo(ctx.now, dt, ctx.tempo_bpm);

        let env = self.envelopes();
        if self.state.gate_open {
            self.stage = if env.loudness.in_attack(self.state.clocks.loudness) {
                VoiceStage::Attacking
            } else {
                VoiceStage::Sustaining
            };
        } else if self.release_complete() {
            self.finish_release();
            return;
        }

        let ramp = self.settings.ramp_time;
        let ahead = self.state.clocks.ahead(ramp);
        let levels = if self.state.gate_open {
            env.gated(self.state.attack_start, ahead)
        } else {
            env.released(self.state.release_from, ahead)
        };
        let lfo = self.lfo_output();

        let aux_clock = self.state.clocks.auxiliary;
        let pitch = if self.state.pitch_attack.covers(aux_clock) {
            self.state.pitch_attack.value_at(aux_clock + ramp)
        } else {
            self.state.pitch_attack.close();
            self.pitch_at(levels.auxiliary, lfo)
        };

        let touch = self.filter_touch_term(dt);
        let filter = if self.state.filter_attack.covers(aux_clock) {
            self.state.filter_attack.value_at(aux_clock + ramp)
        } else {
            self.state.filter_attack.close();
            self.filter_at(levels.auxiliary, lfo, touch)
        };

        let mod_clock = self.state.clocks.modulator;
        let index = if self.state.index_attack.covers(mod_clock) {
            self.state.index_attack.value_at(mod_clock + ramp)
        } else {
            self.state.index_attack.close();
            self.index_at(levels.modulator, lfo)
        };

        let ratio = combine::mod_ratio(
            self.state.base.mod_ratio,
            ctx.global_lfo,
            self.template.global_lfo.to_mod_ratio,
        );

        self.issue(VoiceParam::Frequency, pitch, ramp);
        self.issue(VoiceParam::FilterCutoff, filter, ramp);
        self.issue(VoiceParam::ModIndex, index, ramp);
        self.issue(VoiceParam::ModRatio, ratio, ramp);

        // During the loudness attack the trigger-time ramp owns the gain.
        let in_loudness_attack =
            self.state.gate_open && env.loudness.in_attack(self.state.clocks.loudness);
        if !in_loudness_attack {
            self.issue(VoiceParam::OutputGain, combine::output_gain(levels.loudness), ramp);
        }
    }

    fn update_clocks(&mut self, now: f64, dt: f32) {
        let st = &mut self.state;
        if !st.gate_open {
            st.clocks.advance(dt);
            return;
        }
        let mut elapsed = (now - st.trigger_timestamp) as f32;
        if st.trigger_sequence != st.observed_sequence {
            st.observed_sequence = st.trigger_sequence;
            if !(0.0..=self.settings.max_trigger_latency).contains(&elapsed) {
                debug!(slot = self.slot, elapsed, "implausible trigger latency, restarting clocks at zero");
                st.trigger_timestamp = now;
                elapsed = 0.0;
            }
        }
        st.clocks.set_all(elapsed.max(0.0));
    }

    fn advance_lfo(&mut self, now: f64, dt: f32, tempo_bpm: f32) {
        let lfo = self.template.lfo;
        let st = &mut self.state;
        match lfo.mode {
            LfoMode::Free => step_phase(st, lfo.rate_hz, dt),
            LfoMode::TempoSync => step_phase(st, lfo.division.to_hz(tempo_bpm), dt),
            LfoMode::Trigger => {
                let cycles = (now - st.trigger_timestamp).max(0.0) * f64::from(lfo.rate_hz.max(0.0));
                st.lfo_cycle = cycles.floor() as u32;
                st.lfo_phase = wrap_phase(cycles.fract() as f32);
            }
        }
        st.lfo_ramp = if lfo.delay > MIN_STAGE_TIME {
            (st.lfo_ramp + dt / lfo.delay).min(1.0)
        } else {
            1.0
        };
    }

    fn release_complete(&self) -> bool {
        let limit = self.template.loudness_env.release * self.settings.release_multiplier;
        self.state.clocks.loudness >= limit && self.state.release_started_at >= self.last_trigger_time
    }

    fn finish_release(&mut self) {
        self.stage = VoiceStage::Idle;
        self.available = true;
        self.sounding = false;
        self.state.close_attack_windows();
        let ramp = self.settings.ramp_time;
        self.issue(VoiceParam::OutputGain, 0.0, ramp);
        debug!(slot = self.slot, "release complete, voice idle");
    }

    // -- template and base edits -----------------------------------------

    /// Swap in a new template. Base values are left alone; use the base
    /// setters to apply those.
    pub fn set_template(&mut self, template: Arc<VoiceTemplate>) {
        if template.waveform != self.template.waveform {
            self.graph.set_waveform(template.waveform);
        }
        if template.touch_smoothing != self.template.touch_smoothing {
            self.state.touch_smoother = OnePoleSmoother::new(template.touch_smoothing);
        }
        self.template = template;
    }

    /// Oscillator amplitude. Never modulated, so it applies immediately.
    pub fn set_base_amplitude(&mut self, amplitude: f32) {
        let amplitude = amplitude.clamp(combine::GAIN_RANGE.0, combine::GAIN_RANGE.1);
        self.state.base.amplitude = amplitude;
        self.graph
            .ramp_parameter(VoiceParam::Amplitude, amplitude, self.settings.ramp_time);
    }

    /// Filter base cutoff.
    ///
    /// On a sounding voice with active filter modulation the new base only
    /// takes effect through the next tick's combination; otherwise it is
    /// sent to the backend right away.
    pub fn set_base_filter_cutoff(&mut self, hz: f32) {
        if !hz.is_finite() {
            return;
        }
        self.state.base.filter_cutoff =
            hz.clamp(combine::FILTER_CUTOFF_RANGE.0, combine::FILTER_CUTOFF_RANGE.1);
        if self.sounding && self.template.amounts.modulates_filter() {
            return;
        }
        self.state.filter_attack.close();
        let target = combine::filter_cutoff_hz(self.filter_base(), Contributions::default());
        self.issue(VoiceParam::FilterCutoff, target, self.settings.ramp_time);
    }

    /// FM index base, with the same deferral rule as the filter.
    pub fn set_base_mod_index(&mut self, index: f32) {
        if !index.is_finite() {
            return;
        }
        self.state.base.mod_index = index.clamp(combine::MOD_INDEX_RANGE.0, combine::MOD_INDEX_RANGE.1);
        if self.sounding && self.template.amounts.modulates_index() {
            return;
        }
        self.state.index_attack.close();
        let target = combine::mod_index(self.state.base.mod_index, Contributions::default());
        self.issue(VoiceParam::ModIndex, target, self.settings.ramp_time);
    }

    /// FM ratio base; deferred while the global LFO modulates it.
    pub fn set_base_mod_ratio(&mut self, ratio: f32) {
        if !ratio.is_finite() {
            return;
        }
        self.state.base.mod_ratio = ratio.clamp(combine::MOD_RATIO_RANGE.0, combine::MOD_RATIO_RANGE.1);
        if self.sounding && self.template.global_lfo.to_mod_ratio != 0.0 {
            return;
        }
        let target = self.state.base.mod_ratio;
        self.issue(VoiceParam::ModRatio, target, self.settings.ramp_time);
    }

    /// Replace the engine-wide settings.
    pub fn set_settings(&mut self, settings: VoiceSettings) {
        self.settings = settings;
    }

    // -- queries ----------------------------------------------------------

    /// Arena index.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Lifecycle stage.
    pub fn stage(&self) -> VoiceStage {
        self.stage
    }

    /// Whether the allocator may hand this voice out.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Whether the voice is producing sound (gated or releasing).
    pub fn is_sounding(&self) -> bool {
        self.sounding
    }

    /// Whether the note is held.
    pub fn is_gate_open(&self) -> bool {
        self.sounding && self.state.gate_open
    }

    /// Clock time of the last trigger or retrigger.
    pub fn last_trigger_time(&self) -> f64 {
        self.last_trigger_time
    }

    /// Current note frequency.
    pub fn frequency(&self) -> f32 {
        self.state.base.frequency
    }

    /// Octave offset frozen at trigger.
    pub fn key_tracking_value(&self) -> f32 {
        self.state.key_tracking_value
    }

    /// Analytic loudness level at `now`.
    pub fn output_level(&self, now: f64) -> f32 {
        self.levels_at(now).loudness
    }

    /// Runtime state, read-only.
    pub fn state(&self) -> &VoiceRuntimeState {
        &self.state
    }

    /// The template this voice plays.
    pub fn template(&self) -> &Arc<VoiceTemplate> {
        &self.template
    }

    /// The backend graph.
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// The backend graph, mutably.
    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Read-only summary at `now`; `key` is filled in by the pool.
    pub fn snapshot(&self, now: f64, key: Option<KeyIndex>) -> VoiceSnapshot {
        VoiceSnapshot {
            slot: self.slot,
            stage: self.stage,
            key,
            frequency: self.state.base.frequency,
            key_tracking_value: self.state.key_tracking_value,
            last_trigger_time: self.last_trigger_time,
            output_level: self.output_level(now),
            available: self.available,
        }
    }

    // -- helpers ----------------------------------------------------------

    fn envelopes(&self) -> EnvelopeSet {
        EnvelopeSet {
            modulator: self.template.modulator_env,
            auxiliary: self.template.auxiliary_env,
            loudness: self.template.loudness_env,
        }
    }

    /// Envelope levels at an arbitrary instant, from the stage and timestamps.
    fn levels_at(&self, now: f64) -> EnvelopeLevels {
        let env = self.envelopes();
        if !self.sounding {
            return EnvelopeLevels::default();
        }
        if self.state.gate_open {
            let elapsed = (now - self.state.trigger_timestamp).max(0.0) as f32;
            env.gated(self.state.attack_start, EnvelopeLevels::splat(elapsed))
        } else {
            let elapsed = (now - self.state.release_started_at).max(0.0) as f32;
            env.released(self.state.release_from, EnvelopeLevels::splat(elapsed))
        }
    }

    /// Check the analytic loudness against what the backend reports.
    fn cross_checked_output(&self, analytic: f32) -> f32 {
        let reported = self.graph.current_value(VoiceParam::OutputGain);
        if reported.is_finite() && (reported - analytic).abs() > self.settings.level_tolerance {
            warn!(
                slot = self.slot,
                analytic,
                reported,
                "analytic output level diverged from backend, using backend value"
            );
            return combine::output_gain(reported);
        }
        combine::output_gain(analytic)
    }

    fn lfo_output(&self) -> f32 {
        lfo_value(self.template.lfo.waveform, self.state.lfo_phase, self.state.lfo_cycle)
    }

    fn filter_base(&self) -> f32 {
        combine::key_tracked_cutoff(
            self.state.base.filter_cutoff,
            self.state.key_tracking_value,
            self.template.amounts.key_tracking,
        )
    }

    fn pitch_at(&self, auxiliary: f32, lfo: f32) -> f32 {
        let a = &self.template.amounts;
        combine::pitch_hz(
            self.state.base.frequency,
            Contributions::new(
                auxiliary,
                a.aux_env_to_pitch,
                lfo,
                a.lfo_to_pitch,
                self.state.lfo_ramp,
                self.state.touch_delta(),
                a.touch_to_pitch,
            ),
        )
    }

    fn filter_at(&self, auxiliary: f32, lfo: f32, touch: f32) -> f32 {
        let a = &self.template.amounts;
        combine::filter_cutoff_hz(
            self.filter_base(),
            Contributions {
                envelope: auxiliary * a.aux_env_to_filter,
                lfo: lfo * a.lfo_to_filter * self.state.lfo_ramp,
                touch,
            },
        )
    }

    fn index_at(&self, modulator: f32, lfo: f32) -> f32 {
        let a = &self.template.amounts;
        combine::mod_index(
            self.state.base.mod_index,
            Contributions::new(
                modulator,
                a.mod_env_to_index,
                lfo,
                a.lfo_to_index,
                self.state.lfo_ramp,
                self.state.touch_delta(),
                a.touch_to_index,
            ),
        )
    }

    /// Touch contribution to the filter, smoothed when touch is its only source.
    fn filter_touch_term(&mut self, dt: f32) -> f32 {
        let amounts = self.template.amounts;
        let raw = self.state.touch_delta() * amounts.touch_to_filter;
        if amounts.touch_only_filter() {
            self.state.touch_smoother.process(raw, dt)
        } else {
            raw
        }
    }

    fn ramp_over_attack(&mut self, param: VoiceParam, peak: f32, attack: f32) {
        let duration = if attack > MIN_STAGE_TIME { attack } else { 0.0 };
        self.issue(param, peak, duration);
    }

    /// Send a ramp and remember the target.
    fn issue(&mut self, param: VoiceParam, target: f32, duration: f32) {
        let issued = &mut self.state.issued;
        let field = match param {
            VoiceParam::Frequency => &mut issued.frequency,
            VoiceParam::FilterCutoff => &mut issued.filter_cutoff,
            VoiceParam::ModIndex => &mut issued.mod_index,
            VoiceParam::ModRatio => &mut issued.mod_ratio,
            VoiceParam::OutputGain => &mut issued.output_gain,
            VoiceParam::Amplitude => {
                self.graph.ramp_parameter(param, target, duration);
                return;
            }
        };
        *field = target;
        self.graph.ramp_parameter(param, target, duration);
        trace!(slot = self.slot, param = %param, target, duration, "ramp");
    }
}

impl<G: VoiceGraph> std::fmt::Debug for Voice<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("slot", &self.slot)
            .field("stage", &self.stage)
            .field("available", &self.available)
            .field("sounding", &self.sounding)
            .field("frequency", &self.state.base.frequency)
            .field("last_trigger_time", &self.last_trigger_time)
            .finish_non_exhaustive()
    }
}

fn sanitize_touch(touch_x: f32) -> f32 {
    if touch_x.is_finite() { touch_x.clamp(0.0, 1.0) } else { 0.0 }
}

fn step_phase(state: &mut VoiceRuntimeState, rate_hz: f32, dt: f32) {
    let next = state.lfo_phase + rate_hz.max(0.0) * dt;
    if next >= 1.0 {
        state.lfo_cycle = state.lfo_cycle.wrapping_add(next as u32);
    }
    state.lfo_phase = wrap_phase(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::graph::SimulatedGraph;
    use polykey_core::EnvelopeShape;

    fn template() -> VoiceTemplate {
        let mut t = VoiceTemplate::default();
        t.loudness_env = EnvelopeShape::new(0.1, 0.2, 0.5, 0.3);
        t.auxiliary_env = EnvelopeShape::new(0.1, 0.2, 0.0, 0.3);
        t.modulator_env = EnvelopeShape::new(0.05, 0.2, 0.5, 0.3);
        t
    }

    fn voice_with(t: VoiceTemplate) -> (Arc<ManualClock>, Voice<SimulatedGraph>) {
        let (clock, shared) = ManualClock::shared(0.0);
        let graph = SimulatedGraph::recording(shared);
        let voice = Voice::new(0, graph, Arc::new(t), VoiceSettings::default());
        (clock, voice)
    }

    fn tick_until(voice: &mut Voice<SimulatedGraph>, clock: &ManualClock, until: f64) {
        let dt = 0.01;
        while clock.now() + 1e-9 < until {
            clock.advance(dt);
            voice.tick(&TickContext {
                now: clock.now(),
                delta_time: dt as f32,
                global_lfo: 0.0,
                tempo_bpm: 120.0,
            });
        }
    }

    #[test]
    fn new_voice_is_idle_and_available() {
        let (_clock, voice) = voice_with(template());
        assert_eq!(voice.stage(), VoiceStage::Idle);
        assert!(voice.is_available());
        assert!(!voice.is_sounding());
        assert!(voice.graph().is_running());
    }

    #[test]
    fn trigger_ramps_output_over_attack() {
        let (_clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        assert_eq!(voice.stage(), VoiceStage::Attacking);
        assert!(!voice.is_available());
        let gain = voice.graph().last_ramp(VoiceParam::OutputGain).unwrap();
        assert_eq!(gain.target, 1.0);
        assert!((gain.duration - 0.1).abs() < 1e-6);
    }

    #[test]
    fn invalid_frequency_is_ignored() {
        let (_clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(f32::NAN, 0.5));
        voice.trigger(0.0, NoteStart::new(-10.0, 0.5));
        assert_eq!(voice.stage(), VoiceStage::Idle);
        assert!(voice.is_available());
    }

    #[test]
    fn attack_progresses_to_sustaining() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.05);
        assert_eq!(voice.stage(), VoiceStage::Attacking);
        tick_until(&mut voice, &clock, 0.15);
        assert_eq!(voice.stage(), VoiceStage::Sustaining);
    }

    #[test]
    fn release_completes_after_multiplied_release_time() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.5);
        voice.release(clock.now());
        assert_eq!(voice.stage(), VoiceStage::Releasing);
        assert!(!voice.is_available());

        // release 0.3 × 1.25 = 0.375 s
        let released_at = clock.now();
        tick_until(&mut voice, &clock, released_at + 0.3);
        assert_eq!(voice.stage(), VoiceStage::Releasing);
        tick_until(&mut voice, &clock, released_at + 0.4);
        assert_eq!(voice.stage(), VoiceStage::Idle);
        assert!(voice.is_available());
        assert_eq!(voice.graph().last_ramp(VoiceParam::OutputGain).unwrap().target, 0.0);
    }

    #[test]
    fn zero_release_completes_on_next_tick() {
        let mut t = template();
        t.loudness_env.release = 0.0;
        let (clock, mut voice) = voice_with(t);
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.2);
        voice.release(clock.now());
        tick_until(&mut voice, &clock, clock.now() + 0.01);
        assert!(voice.is_available());
    }

    #[test]
    fn release_captures_current_level() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.05);
        voice.release(clock.now());
        // Halfway through a 0.1 s attack from silence.
        assert!((voice.state().release_from.loudness - 0.5).abs() < 1e-3);
    }

    #[test]
    fn retrigger_keeps_envelope_clocks() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.3);
        let sequence = voice.state().trigger_sequence;
        assert!(voice.retrigger(clock.now(), 660.0, 0.2, None));
        assert_eq!(voice.state().trigger_sequence, sequence);
        assert_eq!(voice.frequency(), 660.0);
        assert_eq!(voice.last_trigger_time(), clock.now());
        let pitch = voice.graph().last_ramp(VoiceParam::Frequency).unwrap();
        assert_eq!(pitch.duration, 0.0);
        assert!((pitch.target - 660.0).abs() < 1e-2);
    }

    #[test]
    fn retrigger_requires_open_gate() {
        let (clock, mut voice) = voice_with(template());
        assert!(!voice.retrigger(0.0, 440.0, 0.5, None));
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.2);
        voice.release(clock.now());
        assert!(!voice.retrigger(clock.now(), 440.0, 0.5, None));
    }

    #[test]
    fn key_tracking_frozen_at_trigger() {
        let (_clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(523.2511, 0.5));
        assert!((voice.key_tracking_value() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn stolen_voice_starts_from_captured_level() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 1.0);
        let level = voice.output_level(clock.now());
        voice.mark_available();
        voice.trigger(clock.now(), NoteStart::new(330.0, 0.5));
        assert!((voice.state().attack_start.loudness - level).abs() < 1e-4);
    }

    #[test]
    fn filter_edit_defers_when_modulated() {
        let mut t = template();
        t.amounts.lfo_to_filter = 1.0;
        let (_clock, mut voice) = voice_with(t);
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        let before = voice.graph().ramps_for(VoiceParam::FilterCutoff).count();
        voice.set_base_filter_cutoff(500.0);
        assert_eq!(voice.graph().ramps_for(VoiceParam::FilterCutoff).count(), before);
        assert_eq!(voice.state().base.filter_cutoff, 500.0);
    }

    #[test]
    fn filter_edit_applies_immediately_when_unmodulated() {
        let (_clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(261.62558, 0.5));
        voice.set_base_filter_cutoff(500.0);
        let last = voice.graph().last_ramp(VoiceParam::FilterCutoff).unwrap();
        assert!((last.target - 500.0).abs() < 0.5);
    }

    #[test]
    fn late_first_tick_restarts_clocks() {
        let (clock, mut voice) = voice_with(template());
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        clock.set(5.0);
        voice.tick(&TickContext {
            now: 5.0,
            delta_time: 0.01,
            global_lfo: 0.0,
            tempo_bpm: 120.0,
        });
        assert_eq!(voice.state().clocks.loudness, 0.0);
        assert_eq!(voice.stage(), VoiceStage::Attacking);
    }

    #[test]
    fn lfo_delay_ramps_depth_in() {
        let mut t = template();
        t.lfo.delay = 0.1;
        let (clock, mut voice) = voice_with(t);
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        assert_eq!(voice.state().lfo_ramp, 0.0);
        tick_until(&mut voice, &clock, 0.05);
        assert!((voice.state().lfo_ramp - 0.5).abs() < 0.02);
        tick_until(&mut voice, &clock, 0.2);
        assert_eq!(voice.state().lfo_ramp, 1.0);
    }

    #[test]
    fn trigger_mode_lfo_restarts_phase() {
        let mut t = template();
        t.lfo.mode = LfoMode::Trigger;
        t.lfo.rate_hz = 2.0;
        let (clock, mut voice) = voice_with(t);
        voice.trigger(0.0, NoteStart::new(440.0, 0.5));
        tick_until(&mut voice, &clock, 0.3);
        assert!(voice.state().lfo_phase > 0.5);
        voice.trigger(clock.now(), NoteStart::new(440.0, 0.5));
        assert_eq!(voice.state().lfo_phase, 0.0);
    }
}
