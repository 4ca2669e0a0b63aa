//! One control-rate cycle: advance the global LFO, tick every voice, and
//! move the effects destinations.
//!
//! [`ControlLoop`] owns the global LFO phase outright; nothing else writes
//! it. It reaches the voices through the shared [`VoiceArena`] and reads the
//! global parameters from the lock-free [`GlobalParams`] store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use polykey_voice::{SharedClock, TickContext, VoiceArena, VoiceGraph, VoiceTemplate};
use tracing::trace;

use crate::effects::{EffectsGraph, EffectsParam};
use crate::modulation::{EffectsTargets, GlobalModulation};
use crate::params::{GlobalParam, GlobalParams};

/// Effects stage shared between the engine and the control loop.
pub type SharedEffects<E> = Arc<Mutex<E>>;

/// State of the control-rate context.
pub struct ControlLoop<G: VoiceGraph, E: EffectsGraph> {
    arena: VoiceArena<G>,
    params: Arc<GlobalParams>,
    effects: SharedEffects<E>,
    clock: SharedClock,
    modulation: GlobalModulation,
    interval: Duration,
    last_cycle: Option<f64>,
    last_effects: Option<EffectsTargets>,
    cycles: u64,
}

impl<G: VoiceGraph, E: EffectsGraph> ControlLoop<G, E> {
    /// Build a loop that has not run yet.
    pub fn new(
        arena: VoiceArena<G>,
        params: Arc<GlobalParams>,
        effects: SharedEffects<E>,
        clock: SharedClock,
        interval: Duration,
    ) -> Self {
        Self {
            arena,
            params,
            effects,
            clock,
            modulation: GlobalModulation::new(),
            interval,
            last_cycle: None,
            last_effects: None,
            cycles: 0,
        }
    }

    /// Nominal time between cycles.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Current global LFO value.
    pub fn global_lfo(&self) -> f32 {
        self.modulation.value(self.params.lfo_waveform())
    }

    /// Run one cycle at the clock's current time.
    ///
    /// The first cycle uses the nominal interval as its delta time; later
    /// cycles use the measured time since the previous one.
    pub fn cycle(&mut self) {
        let now = self.clock.now();
        let nominal = self.interval.as_secs_f32();
        let delta_time = match self.last_cycle {
            Some(last) => ((now - last) as f32).max(0.0),
            None => nominal,
        };
        self.last_cycle = Some(now);
        self.cycles += 1;

        let global_lfo = self.modulation.advance(
            self.params.lfo_waveform(),
            self.params.get(GlobalParam::LfoRate),
            delta_time,
        );
        let ctx = TickContext {
            now,
            delta_time,
            global_lfo,
            tempo_bpm: self.params.get(GlobalParam::TempoBpm),
        };
        for voice in self.arena.iter() {
            voice.lock().tick(&ctx);
        }

        self.update_effects(global_lfo, nominal);
        trace!(cycle = self.cycles, delta_time, global_lfo, "control cycle");
    }

    fn update_effects(&mut self, lfo: f32, ramp: f32) {
        let targets = EffectsTargets::compute(
            self.params.get(GlobalParam::DelayTime),
            self.params.get(GlobalParam::MixerVolume),
            lfo,
            self.params.get(GlobalParam::LfoToDelayTime),
            self.params.get(GlobalParam::LfoToMixerVolume),
        );
        if self.last_effects == Some(targets) {
            return;
        }
        let mut effects = self.effects.lock();
        if self.last_effects.map(|t| t.delay_time) != Some(targets.delay_time) {
            effects.ramp_parameter(EffectsParam::DelayTime, targets.delay_time, ramp);
        }
        if self.last_effects.map(|t| t.mixer_volume) != Some(targets.mixer_volume) {
            effects.ramp_parameter(EffectsParam::MixerVolume, targets.mixer_volume, ramp);
        }
        self.last_effects = Some(targets);
    }

    /// Forget the previous cycle time, e.g. after the loop was paused.
    pub fn reset_timing(&mut self) {
        self.last_cycle = None;
    }

    /// Copy the global-LFO and effects settings into `template`.
    pub fn store_globals(&self, template: &mut VoiceTemplate) {
        self.params.store_into(template);
    }
}

impl<G: VoiceGraph, E: EffectsGraph> std::fmt::Debug for ControlLoop<G, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("interval", &self.interval)
            .field("cycles", &self.cycles)
            .field("lfo_phase", &self.modulation.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::SimulatedEffects;
    use polykey_core::LfoWaveform;
    use polykey_voice::{ManualClock, PitchModifiers, PoolConfig, SimulatedGraph, VoicePool};

    #[test]
    fn cycle_measures_delta_time_from_clock() {
        let (clock, shared) = ManualClock::shared(0.0);
        let graph_clock = shared.clone();
        let pool = VoicePool::new(PoolConfig::default(), VoiceTemplate::default(), shared.clone(), move |_| {
            SimulatedGraph::new(graph_clock.clone())
        });
        let params = Arc::new(GlobalParams::new());
        params.set(GlobalParam::LfoRate, 1.0);
        params.set_lfo_waveform(LfoWaveform::Saw);
        let effects = Arc::new(Mutex::new(SimulatedEffects::new(shared.clone())));
        let mut control = ControlLoop::new(
            pool.arena(),
            params,
            effects,
            shared,
            Duration::from_millis(10),
        );

        control.cycle();
        assert!((control.modulation.phase() - 0.01).abs() < 1e-6);
        clock.advance(0.25);
        control.cycle();
        assert!((control.modulation.phase() - 0.26).abs() < 1e-5);
        assert_eq!(control.cycles(), 2);
    }

    #[test]
    fn global_lfo_moves_effects() {
        let (clock, shared) = ManualClock::shared(0.0);
        let graph_clock = shared.clone();
        let mut pool = VoicePool::new(PoolConfig::default(), VoiceTemplate::default(), shared.clone(), move |_| {
            SimulatedGraph::new(graph_clock.clone())
        });
        pool.note_on(440.0, 1, PitchModifiers::NONE, 0.5);
        let params = Arc::new(GlobalParams::new());
        params.set(GlobalParam::LfoRate, 2.0);
        params.set(GlobalParam::LfoToDelayTime, 0.1);
        let effects = Arc::new(Mutex::new(SimulatedEffects::new(shared.clone())));
        let mut control = ControlLoop::new(
            pool.arena(),
            params,
            Arc::clone(&effects),
            shared,
            Duration::from_millis(10),
        );
        for _ in 0..20 {
            clock.advance(0.01);
            control.cycle();
        }
        let delays: Vec<f32> = effects
            .lock()
            .history()
            .iter()
            .filter(|r| r.param == EffectsParam::DelayTime)
            .map(|r| r.target)
            .collect();
        assert!(delays.len() > 10);
        assert!(delays.iter().any(|&d| d > 0.3));
        // Mixer depth is zero, so it is only sent once.
        let mixer = effects
            .lock()
            .history()
            .iter()
            .filter(|r| r.param == EffectsParam::MixerVolume)
            .count();
        assert_eq!(mixer, 1);
    }
}
