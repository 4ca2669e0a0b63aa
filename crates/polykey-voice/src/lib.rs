//! Polykey Voice - voice pool and per-voice modulation for a control core
//!
//! This crate turns note events into parameter ramps for a set of backend
//! voice graphs. It never touches audio samples: each voice asks its
//! [`VoiceGraph`] to move parameters linearly over short durations, and the
//! backend does the rest.
//!
//! # Architecture
//!
//! ```text
//!  note on/off, touch ──► VoicePool ──► Voice::trigger / retrigger / release
//!                             │
//!                        VoiceArena (one lock per voice)
//!                             │
//!  control loop ─────────────►└──► Voice::tick ──► VoiceGraph::ramp_parameter
//! ```
//!
//! # Example
//!
//! ```rust
//! use polykey_voice::{
//!     ManualClock, PitchModifiers, PoolConfig, SimulatedGraph, VoicePool, VoiceTemplate,
//! };
//!
//! let (clock, shared) = ManualClock::shared(0.0);
//! let graph_clock = shared.clone();
//! let mut pool = VoicePool::new(PoolConfig::default(), VoiceTemplate::default(), shared, move |_| {
//!     SimulatedGraph::new(graph_clock.clone())
//! });
//!
//! let slot = pool.note_on(440.0, 60, PitchModifiers::NONE, 0.5).unwrap();
//! assert_eq!(pool.voice_for_key(60), Some(slot));
//! clock.advance(0.1);
//! pool.note_off(60);
//! assert_eq!(pool.sounding_voice_count(), 1); // still releasing
//! ```

pub mod clock;
pub mod graph;
pub mod pool;
pub mod state;
pub mod template;
pub mod voice;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use graph::{RampRecord, SimulatedGraph, VoiceGraph, VoiceParam, Waveform};
pub use pool::{KeyIndex, PoolConfig, VoiceArena, VoicePool};
pub use state::{VoiceRuntimeState, VoiceStage};
pub use template::{
    BaseValues, EffectsSettings, GlobalLfoSettings, LfoSettings, ModulationAmounts,
    PitchModifiers, TemplateOverrides, VoiceTemplate,
};
pub use voice::{NoteStart, TickContext, Voice, VoiceSettings, VoiceSnapshot};
