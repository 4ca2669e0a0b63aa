//! Backend interface for the shared effects stage.

use std::fmt;

use polykey_voice::SharedClock;

/// Rampable parameter of the effects stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectsParam {
    /// Delay line time in seconds.
    DelayTime,
    /// Voice-mixer output volume.
    MixerVolume,
}

impl EffectsParam {
    fn index(self) -> usize {
        match self {
            EffectsParam::DelayTime => 0,
            EffectsParam::MixerVolume => 1,
        }
    }

    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            EffectsParam::DelayTime => "delay_time",
            EffectsParam::MixerVolume => "mixer_volume",
        }
    }
}

impl fmt::Display for EffectsParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the control core needs from the effects stage.
pub trait EffectsGraph: Send {
    /// Move `param` linearly to `target` over `duration` seconds.
    fn ramp_parameter(&mut self, param: EffectsParam, target: f32, duration: f32);

    /// Current value of `param`, mid-ramp included.
    fn current_value(&self, param: EffectsParam) -> f32;
}

/// One effects ramp request as received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsRamp {
    /// Clock time of the request.
    pub time: f64,
    /// Parameter moved.
    pub param: EffectsParam,
    /// Ramp end value.
    pub target: f32,
    /// Ramp length in seconds.
    pub duration: f32,
}

/// In-memory effects stage that follows the linear-ramp contract.
pub struct SimulatedEffects {
    clock: SharedClock,
    // (from, to, start, duration)
    ramps: [(f32, f32, f64, f32); 2],
    history: Vec<EffectsRamp>,
}

impl SimulatedEffects {
    /// Create an effects stage at the default delay time and volume.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            ramps: [(0.25, 0.25, 0.0, 0.0), (0.7, 0.7, 0.0, 0.0)],
            history: Vec::new(),
        }
    }

    /// Every request so far, oldest first.
    pub fn history(&self) -> &[EffectsRamp] {
        &self.history
    }

    /// Most recent request for `param`.
    pub fn last_ramp(&self, param: EffectsParam) -> Option<EffectsRamp> {
        self.history.iter().rev().find(|r| r.param == param).copied()
    }

    fn value_at(&self, param: EffectsParam, now: f64) -> f32 {
        let (from, to, start, duration) = self.ramps[param.index()];
        if duration <= 0.0 {
            return to;
        }
        let p = ((now - start) / f64::from(duration)).clamp(0.0, 1.0) as f32;
        from + (to - from) * p
    }
}

impl fmt::Debug for SimulatedEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedEffects")
            .field("recorded", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl EffectsGraph for SimulatedEffects {
    fn ramp_parameter(&mut self, param: EffectsParam, target: f32, duration: f32) {
        let now = self.clock.now();
        let from = self.value_at(param, now);
        self.ramps[param.index()] = (from, target, now, duration.max(0.0));
        self.history.push(EffectsRamp {
            time: now,
            param,
            target,
            duration,
        });
    }

    fn current_value(&self, param: EffectsParam) -> f32 {
        self.value_at(param, self.clock.now())
    }
}
