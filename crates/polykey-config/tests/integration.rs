//! Integration tests for polykey-config.
//!
//! File round trips go through a temporary directory; the engine tests check
//! that what the config crate produces is accepted by the engine as-is.

use polykey_config::{
    ConfigError, EngineConfig, factory_templates, get_factory_template, load_template,
    resolve_template, save_template,
};
use polykey_engine::{Engine, SimulatedEffects};
use polykey_voice::{ManualClock, PitchModifiers, SimulatedGraph, VoiceTemplate, Waveform};
use tempfile::TempDir;

#[test]
fn engine_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("engine.toml");

    let config = EngineConfig {
        polyphony: 1,
        legato: true,
        tempo_bpm: 96.0,
        template: Some("legato_lead".to_string()),
        ..EngineConfig::default()
    };
    config.save(&path).unwrap();
    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn missing_config_file_is_a_read_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = EngineConfig::load(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn malformed_template_is_a_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "name = \"Broken\"\n[base\n").unwrap();
    assert!(matches!(load_template(&path), Err(ConfigError::TomlParse(_))));
}

#[test]
fn template_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bell.toml");

    let mut template = get_factory_template("fm_bell").unwrap();
    template.name = "Darker Bell".to_string();
    template.base.filter_cutoff = 2500.0;
    template.waveform = Waveform::Triangle;
    save_template(&template, &path).unwrap();

    let loaded = load_template(&path).unwrap();
    assert_eq!(loaded, template);

    // a path resolves like a name
    let resolved = resolve_template(path.to_str().unwrap()).unwrap();
    assert_eq!(resolved.name, "Darker Bell");
}

#[test]
fn captured_template_reloads_into_engine() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("captured.toml");

    let settings = EngineConfig::default().to_settings().unwrap();
    let (_, shared) = ManualClock::shared(0.0);
    let graph_clock = shared.clone();
    let mut engine = Engine::new(
        settings,
        resolve_template("touch_pad").unwrap(),
        shared.clone(),
        move |_| SimulatedGraph::new(graph_clock.clone()),
        SimulatedEffects::new(shared),
    )
    .unwrap();
    engine.set_filter_cutoff(1800.0);
    engine.set_mixer_volume(0.4);

    let captured = engine.capture_current_as_template("Captured Pad");
    save_template(&captured, &path).unwrap();
    let reloaded = load_template(&path).unwrap();
    assert_eq!(reloaded.base.filter_cutoff, 1800.0);
    assert!((reloaded.effects.mixer_volume - 0.4).abs() < 1e-6);

    engine.apply_template(VoiceTemplate::default());
    engine.apply_template(reloaded.clone());
    assert_eq!(engine.pool().template(), &reloaded);
}

#[test]
fn every_factory_template_plays() {
    let settings = EngineConfig::default().to_settings().unwrap();
    for template in factory_templates() {
        let (clock, shared) = ManualClock::shared(0.0);
        let graph_clock = shared.clone();
        let mut engine = Engine::new(
            settings,
            template.clone(),
            shared.clone(),
            move |_| SimulatedGraph::new(graph_clock.clone()),
            SimulatedEffects::new(shared),
        )
        .unwrap();
        engine.note_on(261.63, 60, PitchModifiers::NONE, 0.7);
        for _ in 0..50 {
            clock.advance(0.01);
            engine.step().unwrap();
        }
        assert_eq!(engine.sounding_voice_count(), 1, "{}", template.name);
    }
}
