//! Backend interface for one voice's sound-generation graph.
//!
//! The control core never produces samples. It only asks the backend to move
//! parameters: "reach `target` linearly over `duration` seconds, starting from
//! wherever you are now". Everything else (oscillators, filters, gain stages)
//! belongs to the backend.
//!
//! [`SimulatedGraph`] models that contract in memory against a [`Clock`] so
//! the whole engine can be exercised without audio hardware.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;

/// A smoothly rampable parameter of a voice graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoiceParam {
    /// Carrier frequency in Hz.
    Frequency,
    /// Oscillator amplitude before the envelope.
    Amplitude,
    /// Filter cutoff in Hz.
    FilterCutoff,
    /// FM modulation index.
    ModIndex,
    /// FM modulator/carrier frequency ratio.
    ModRatio,
    /// Final envelope-controlled gain.
    OutputGain,
}

impl VoiceParam {
    /// Every parameter, in storage order.
    pub const ALL: [VoiceParam; 6] = [
        VoiceParam::Frequency,
        VoiceParam::Amplitude,
        VoiceParam::FilterCutoff,
        VoiceParam::ModIndex,
        VoiceParam::ModRatio,
        VoiceParam::OutputGain,
    ];

    /// Index into per-parameter storage.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            VoiceParam::Frequency => 0,
            VoiceParam::Amplitude => 1,
            VoiceParam::FilterCutoff => 2,
            VoiceParam::ModIndex => 3,
            VoiceParam::ModRatio => 4,
            VoiceParam::OutputGain => 5,
        }
    }

    /// Short name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            VoiceParam::Frequency => "frequency",
            VoiceParam::Amplitude => "amplitude",
            VoiceParam::FilterCutoff => "filter_cutoff",
            VoiceParam::ModIndex => "mod_index",
            VoiceParam::ModRatio => "mod_ratio",
            VoiceParam::OutputGain => "output_gain",
        }
    }
}

impl fmt::Display for VoiceParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Carrier oscillator waveform.
///
/// Changing it reconfigures the graph in place; parameter values survive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Pure sine.
    #[default]
    Sine,
    /// Triangle.
    Triangle,
    /// Sawtooth.
    Saw,
    /// Square.
    Square,
}

/// What the control core needs from a voice's sound-generation graph.
pub trait VoiceGraph: Send {
    /// Move `param` linearly from its current value to `target` over
    /// `duration` seconds. A zero duration sets the value immediately.
    ///
    /// A new request replaces any ramp still in flight for that parameter.
    fn ramp_parameter(&mut self, param: VoiceParam, target: f32, duration: f32);

    /// The value `param` has right now, mid-ramp included.
    fn current_value(&self, param: VoiceParam) -> f32;

    /// Start producing sound. Called once when the voice is built.
    fn start(&mut self);

    /// Stop producing sound. Called once at teardown.
    fn stop(&mut self);

    /// Swap the oscillator waveform without rebuilding the graph.
    fn set_waveform(&mut self, waveform: Waveform);
}

/// One ramp request as the backend received it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampRecord {
    /// Clock time the request arrived.
    pub time: f64,
    /// Parameter being moved.
    pub param: VoiceParam,
    /// Value the ramp ends at.
    pub target: f32,
    /// Ramp length in seconds.
    pub duration: f32,
}

#[derive(Clone, Copy, Debug)]
struct Ramp {
    from: f32,
    to: f32,
    start: f64,
    duration: f32,
}

impl Ramp {
    fn hold(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            start: 0.0,
            duration: 0.0,
        }
    }

    fn value_at(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        let progress = ((now - self.start) / f64::from(self.duration)).clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * progress
    }
}

/// In-memory voice graph following the linear-ramp contract.
///
/// Optionally records every request, which is what the tests and the CLI
/// scenarios inspect.
pub struct SimulatedGraph {
    clock: SharedClock,
    ramps: [Ramp; 6],
    running: bool,
    waveform: Waveform,
    recording: bool,
    history: Vec<RampRecord>,
}

impl SimulatedGraph {
    /// Create a silent graph driven by `clock`.
    pub fn new(clock: SharedClock) -> Self {
        let mut ramps = [Ramp::hold(0.0); 6];
        ramps[VoiceParam::Frequency.index()] = Ramp::hold(440.0);
        ramps[VoiceParam::Amplitude.index()] = Ramp::hold(1.0);
        ramps[VoiceParam::FilterCutoff.index()] = Ramp::hold(20_000.0);
        ramps[VoiceParam::ModRatio.index()] = Ramp::hold(1.0);
        Self {
            clock,
            ramps,
            running: false,
            waveform: Waveform::default(),
            recording: false,
            history: Vec::new(),
        }
    }

    /// Create a graph that keeps a history of every ramp request.
    pub fn recording(clock: SharedClock) -> Self {
        let mut graph = Self::new(clock);
        graph.recording = true;
        graph
    }

    /// Whether [`VoiceGraph::start`] has been called without a matching stop.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current oscillator waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Recorded ramp requests, oldest first.
    pub fn history(&self) -> &[RampRecord] {
        &self.history
    }

    /// Recorded requests for one parameter.
    pub fn ramps_for(&self, param: VoiceParam) -> impl Iterator<Item = &RampRecord> {
        self.history.iter().filter(move |r| r.param == param)
    }

    /// The most recent request for `param`, if any.
    pub fn last_ramp(&self, param: VoiceParam) -> Option<RampRecord> {
        self.ramps_for(param).last().copied()
    }

    /// Drain the recorded history.
    pub fn take_history(&mut self) -> Vec<RampRecord> {
        std::mem::take(&mut self.history)
    }
}

impl fmt::Debug for SimulatedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedGraph")
            .field("running", &self.running)
            .field("waveform", &self.waveform)
            .field("recorded", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl VoiceGraph for SimulatedGraph {
    fn ramp_parameter(&mut self, param: VoiceParam, target: f32, duration: f32) {
        let now = self.clock.now();
        let from = self.ramps[param.index()].value_at(now);
        self.ramps[param.index()] = Ramp {
            from,
            to: target,
            start: now,
            duration: duration.max(0.0),
        };
        if self.recording {
            self.history.push(RampRecord {
                time: now,
                param,
                target,
                duration,
            });
        }
    }

    fn current_value(&self, param: VoiceParam) -> f32 {
        self.ramps[param.index()].value_at(self.clock.now())
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }
}
