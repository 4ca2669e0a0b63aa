//! Polykey Engine - control-rate scheduling and global modulation
//!
//! Ties a [`VoicePool`](polykey_voice::VoicePool) to a periodic control loop.
//! Note events arrive on the caller's thread and go straight to the pool;
//! a dedicated thread runs [`ControlLoop::cycle`] every few milliseconds,
//! advancing the global LFO, ticking each voice, and moving the shared
//! effects stage.
//!
//! ```text
//!  caller thread            control thread
//!  ─────────────            ──────────────
//!  Engine::note_on ──┐      Scheduler ──► ControlLoop::cycle
//!  Engine::set_*     │                      │  GlobalModulation::advance
//!                    ▼                      │  Voice::tick (per slot lock)
//!             VoiceArena ◄──────────────────┘  EffectsGraph::ramp_parameter
//!             GlobalParams (atomics)
//! ```
//!
//! # Example
//!
//! ```rust
//! use polykey_engine::{Engine, EngineSettings, SimulatedEffects};
//! use polykey_voice::{ManualClock, PitchModifiers, SimulatedGraph, VoiceTemplate};
//!
//! let (clock, shared) = ManualClock::shared(0.0);
//! let graph_clock = shared.clone();
//! let mut engine = Engine::new(
//!     EngineSettings::default(),
//!     VoiceTemplate::default(),
//!     shared.clone(),
//!     move |_| SimulatedGraph::new(graph_clock.clone()),
//!     SimulatedEffects::new(shared),
//! )
//! .unwrap();
//!
//! engine.note_on(220.0, 1, PitchModifiers::NONE, 0.5);
//! for _ in 0..10 {
//!     clock.advance(0.01);
//!     engine.step().unwrap();
//! }
//! assert_eq!(engine.sounding_voice_count(), 1);
//! ```

pub mod control;
pub mod effects;
pub mod engine;
pub mod error;
pub mod modulation;
pub mod params;
pub mod scheduler;

pub use control::{ControlLoop, SharedEffects};
pub use effects::{EffectsGraph, EffectsParam, EffectsRamp, SimulatedEffects};
pub use engine::{
    Engine, EngineSettings, EnvelopeTarget, MAX_CONTROL_INTERVAL, MAX_POLYPHONY,
    MIN_CONTROL_INTERVAL,
};
pub use error::EngineError;
pub use modulation::{EffectsTargets, GlobalModulation};
pub use params::{GlobalParam, GlobalParams};
pub use scheduler::Scheduler;
