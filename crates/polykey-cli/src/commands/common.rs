//! Shared helpers for the CLI commands.

use std::path::Path;

use anyhow::Context;
use polykey_config::{EngineConfig, engine_config_path, resolve_template};
use polykey_engine::{Engine, SimulatedEffects};
use polykey_voice::{PitchModifiers, SharedClock, SimulatedGraph, VoiceStage, VoiceTemplate};
use tracing::debug;

use super::script::Action;

/// Engine driving the in-memory backend.
pub type SimEngine = Engine<SimulatedGraph, SimulatedEffects>;

/// Load the engine config from `path`, else from the user config file if it
/// exists, else the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = path {
        return EngineConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    let default_path = engine_config_path();
    if default_path.is_file() {
        debug!(path = %default_path.display(), "using user engine config");
        return Ok(EngineConfig::load(&default_path)?);
    }
    Ok(EngineConfig::default())
}

/// Template named on the command line, else the config's, else "init".
pub fn select_template(
    cli_choice: Option<&str>,
    config: &EngineConfig,
) -> anyhow::Result<VoiceTemplate> {
    let name = cli_choice.or(config.template.as_deref()).unwrap_or("init");
    resolve_template(name).with_context(|| format!("loading template '{name}'"))
}

/// Build an engine on the simulated backend.
pub fn build_engine(
    config: &EngineConfig,
    template: VoiceTemplate,
    clock: SharedClock,
) -> anyhow::Result<SimEngine> {
    let settings = config.to_settings()?;
    let graph_clock = clock.clone();
    let engine = Engine::new(
        settings,
        template,
        clock.clone(),
        move |_| SimulatedGraph::new(graph_clock.clone()),
        SimulatedEffects::new(clock),
    )?;
    Ok(engine)
}

/// Send one script action to the engine.
pub fn apply_action(engine: &mut SimEngine, action: Action, pitch: PitchModifiers) {
    match action {
        Action::On { key, touch } => {
            engine.note_on(Action::frequency(key), Action::key_index(key), pitch, touch);
        }
        Action::Off { key } => engine.note_off(Action::key_index(key)),
        Action::Touch { key, x } => engine.update_touch_position(Action::key_index(key), x),
        Action::AllOff => engine.all_notes_off(),
        Action::Polyphony(n) => engine.set_polyphony(n),
        Action::Legato(on) => engine.set_legato(on),
        Action::End => {}
    }
}

/// Print one line per sounding voice.
pub fn print_voices(engine: &SimEngine, at: f64) {
    let sounding: Vec<_> = engine
        .snapshots()
        .into_iter()
        .filter(|s| s.stage != VoiceStage::Idle)
        .collect();
    if sounding.is_empty() {
        println!("{:>8.3}s  (silent)", at);
        return;
    }
    for (i, snap) in sounding.iter().enumerate() {
        let time = if i == 0 {
            format!("{:>8.3}s", at)
        } else {
            " ".repeat(9)
        };
        let key = snap.key.map_or_else(|| "-".to_string(), |k| k.to_string());
        println!(
            "{time}  slot {:>2}  key {:>3}  {:<10} {:>8.2} Hz  level {:.3}",
            snap.slot,
            key,
            snap.stage.name(),
            snap.frequency,
            snap.output_level,
        );
    }
}
