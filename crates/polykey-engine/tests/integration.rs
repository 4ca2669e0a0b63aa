//! Integration tests for polykey-engine.
//!
//! Most tests step the engine by hand against a manual clock; the scheduler
//! tests use the monotonic clock and a real control thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use polykey_core::{EnvelopeShape, LfoWaveform};
use polykey_engine::{
    EffectsGraph as _, EffectsParam, Engine, EngineError, EngineSettings, EnvelopeTarget,
    GlobalParam, SimulatedEffects,
};
use polykey_voice::{
    GlobalLfoSettings, ManualClock, MonotonicClock, PitchModifiers, SimulatedGraph, VoiceParam,
    VoiceStage, VoiceTemplate, Waveform,
};

type TestEngine = Engine<SimulatedGraph, SimulatedEffects>;

fn manual_engine(settings: EngineSettings) -> (Arc<ManualClock>, TestEngine) {
    let (clock, shared) = ManualClock::shared(0.0);
    let graph_clock = shared.clone();
    let mut template = VoiceTemplate::named("test");
    template.loudness_env = EnvelopeShape::new(0.05, 0.1, 0.5, 0.2);
    let engine = Engine::new(
        settings,
        template,
        shared.clone(),
        move |_| SimulatedGraph::recording(graph_clock.clone()),
        SimulatedEffects::new(shared),
    )
    .expect("valid settings");
    (clock, engine)
}

fn run(clock: &ManualClock, engine: &mut TestEngine, seconds: f64) {
    let steps = (seconds / 0.01).round() as usize;
    for _ in 0..steps {
        clock.advance(0.01);
        engine.step().expect("scheduler stopped");
    }
}

// ---------------------------------------------------------------------------
// 1. Construction
// ---------------------------------------------------------------------------

#[test]
fn invalid_settings_are_rejected() {
    let mut settings = EngineSettings::default();
    settings.pool.max_polyphony = 0;
    let (_, shared) = ManualClock::shared(0.0);
    let graph_clock = shared.clone();
    let result = Engine::new(
        settings,
        VoiceTemplate::default(),
        shared.clone(),
        move |_| SimulatedGraph::new(graph_clock.clone()),
        SimulatedEffects::new(shared),
    );
    assert!(matches!(
        result,
        Err(EngineError::InvalidSetting { field: "max_polyphony", .. })
    ));
}

#[test]
fn ramp_time_follows_control_interval() {
    let settings = EngineSettings {
        control_interval: Duration::from_millis(20),
        ..EngineSettings::default()
    };
    let (_, engine) = manual_engine(settings);
    assert!((engine.pool().voice_settings().ramp_time - 0.02).abs() < 1e-6);
}

#[test]
fn effects_start_at_template_values() {
    let (_, engine) = manual_engine(EngineSettings::default());
    let effects = engine.effects();
    let fx = effects.lock();
    assert!((fx.current_value(EffectsParam::DelayTime) - 0.25).abs() < 1e-6);
    assert!((fx.current_value(EffectsParam::MixerVolume) - 0.7).abs() < 1e-6);
}

// ---------------------------------------------------------------------------
// 2. Manual stepping
// ---------------------------------------------------------------------------

#[test]
fn note_lifecycle_through_engine() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    let slot = engine.note_on(330.0, 7, PitchModifiers::NONE, 0.5).unwrap();
    run(&clock, &mut engine, 0.2);

    let snap = engine.snapshots()[slot];
    assert_eq!(snap.stage, VoiceStage::Sustaining);
    assert_eq!(snap.key, Some(7));
    assert!((snap.output_level - 0.5).abs() < 0.05);

    engine.note_off(7);
    run(&clock, &mut engine, 0.1);
    assert_eq!(engine.snapshots()[slot].stage, VoiceStage::Releasing);

    // release 0.2 s x 1.25
    run(&clock, &mut engine, 0.3);
    assert_eq!(engine.sounding_voice_count(), 0);
    assert_eq!(engine.snapshots()[slot].stage, VoiceStage::Idle);
}

#[test]
fn all_notes_off_releases_everything() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    for key in 0..5 {
        engine.note_on(200.0 + key as f32 * 20.0, key, PitchModifiers::NONE, 0.5);
    }
    run(&clock, &mut engine, 0.1);
    assert_eq!(engine.sounding_voice_count(), 5);
    engine.all_notes_off();
    run(&clock, &mut engine, 0.5);
    assert_eq!(engine.sounding_voice_count(), 0);
}

#[test]
fn set_polyphony_one_switches_to_mono() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    engine.set_polyphony(1);
    engine.set_legato(true);
    let a = engine.note_on(220.0, 1, PitchModifiers::NONE, 0.5).unwrap();
    run(&clock, &mut engine, 0.05);
    let b = engine.note_on(330.0, 2, PitchModifiers::NONE, 0.5).unwrap();
    assert_eq!(a, b);
    assert!(engine.pool().is_mono());
    assert_eq!(engine.pool().mono_owner(), Some(2));
}

#[test]
fn waveform_change_reaches_every_graph() {
    let (_, mut engine) = manual_engine(EngineSettings::default());
    engine.set_waveform(Waveform::Saw);
    let arena = engine.pool().arena();
    for voice in arena.iter() {
        assert_eq!(voice.lock().graph().waveform(), Waveform::Saw);
    }
}

#[test]
fn envelope_edit_applies_to_next_note() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    engine.set_envelope(EnvelopeTarget::Loudness, EnvelopeShape::new(0.5, 0.1, 1.0, 0.1));
    let slot = engine.note_on(440.0, 1, PitchModifiers::NONE, 0.5).unwrap();
    run(&clock, &mut engine, 0.25);
    let level = engine.snapshots()[slot].output_level;
    assert!(level > 0.4 && level < 0.6, "halfway through attack: {level}");
}

// ---------------------------------------------------------------------------
// 3. Global modulation and effects
// ---------------------------------------------------------------------------

#[test]
fn unmodulated_delay_time_is_sent_immediately() {
    let (_, mut engine) = manual_engine(EngineSettings::default());
    engine.set_delay_time(0.4);
    let effects = engine.effects();
    let last = effects.lock().last_ramp(EffectsParam::DelayTime);
    assert_eq!(last.map(|r| r.target), Some(0.4));
}

#[test]
fn modulated_delay_time_waits_for_control_cycle() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    engine.set_global_lfo(GlobalLfoSettings {
        waveform: LfoWaveform::Square,
        rate_hz: 1.0,
        to_delay_time: 0.1,
        ..GlobalLfoSettings::default()
    });
    let effects = engine.effects();
    let delay_ramps = |fx: &SimulatedEffects| {
        fx.history()
            .iter()
            .filter(|r| r.param == EffectsParam::DelayTime)
            .count()
    };
    let before = delay_ramps(&effects.lock());
    engine.set_delay_time(0.4);
    assert_eq!(delay_ramps(&effects.lock()), before);

    run(&clock, &mut engine, 0.01);
    let last = effects.lock().last_ramp(EffectsParam::DelayTime).map(|r| r.target);
    // square is +1 in the first half of the cycle
    assert!(last.is_some_and(|d| (d - 0.5).abs() < 1e-5), "{last:?}");
}

#[test]
fn global_lfo_modulates_mod_ratio() {
    let (clock, mut engine) = manual_engine(EngineSettings::default());
    engine.set_global_lfo(GlobalLfoSettings {
        waveform: LfoWaveform::Square,
        rate_hz: 1.0,
        to_mod_ratio: 0.5,
        ..GlobalLfoSettings::default()
    });
    let slot = engine.note_on(440.0, 1, PitchModifiers::NONE, 0.5).unwrap();
    run(&clock, &mut engine, 0.1);
    let arena = engine.pool().arena();
    let ratio = arena
        .lock(slot)
        .graph()
        .last_ramp(VoiceParam::ModRatio)
        .map(|r| r.target);
    assert!(ratio.is_some_and(|r| (r - 2.5).abs() < 1e-4), "{ratio:?}");
}

#[test]
fn tempo_is_clamped() {
    let (_, mut engine) = manual_engine(EngineSettings::default());
    engine.set_tempo(1000.0);
    assert_eq!(engine.params().get(GlobalParam::TempoBpm), 300.0);
}

// ---------------------------------------------------------------------------
// 4. Templates
// ---------------------------------------------------------------------------

#[test]
fn capture_reflects_live_edits() {
    let (_, mut engine) = manual_engine(EngineSettings::default());
    engine.set_filter_cutoff(1234.0);
    engine.set_mod_index(3.0);
    engine.set_mixer_volume(0.5);
    engine.set_delay_time(0.1);

    let captured = engine.capture_current_as_template("mine");
    assert_eq!(captured.name, "mine");
    assert_eq!(captured.base.filter_cutoff, 1234.0);
    assert_eq!(captured.base.mod_index, 3.0);
    assert!((captured.effects.mixer_volume - 0.5).abs() < 1e-6);
    assert!((captured.effects.delay_time - 0.1).abs() < 1e-6);
}

#[test]
fn apply_template_loads_globals() {
    let (_, mut engine) = manual_engine(EngineSettings::default());
    let mut template = VoiceTemplate::named("other");
    template.global_lfo.rate_hz = 3.0;
    template.global_lfo.waveform = LfoWaveform::Triangle;
    template.effects.mixer_volume = 0.2;
    engine.apply_template(template);

    assert_eq!(engine.params().get(GlobalParam::LfoRate), 3.0);
    assert_eq!(engine.params().lfo_waveform(), LfoWaveform::Triangle);
    assert_eq!(engine.pool().template().name, "other");
    let effects = engine.effects();
    let last = effects.lock().last_ramp(EffectsParam::MixerVolume);
    assert_eq!(last.map(|r| r.target), Some(0.2));
}

// ---------------------------------------------------------------------------
// 5. Scheduler
// ---------------------------------------------------------------------------

fn realtime_engine() -> Engine<SimulatedGraph, SimulatedEffects> {
    let shared = MonotonicClock::shared();
    let graph_clock = shared.clone();
    Engine::new(
        EngineSettings::default(),
        VoiceTemplate::default(),
        shared.clone(),
        move |_| SimulatedGraph::new(graph_clock.clone()),
        SimulatedEffects::new(shared),
    )
    .expect("valid settings")
}

#[test]
fn scheduler_start_stop() {
    let mut engine = realtime_engine();
    assert!(!engine.is_running());
    engine.start().unwrap();
    assert!(engine.is_running());
    assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
    assert!(matches!(engine.step(), Err(EngineError::SchedulerRunning)));

    engine.stop().unwrap();
    assert!(!engine.is_running());
    engine.step().unwrap();
    // stopping twice is a no-op
    engine.stop().unwrap();
}

#[test]
fn scheduler_ticks_voices_in_background() {
    let mut engine = realtime_engine();
    engine.start().unwrap();
    engine.note_on(440.0, 1, PitchModifiers::NONE, 0.5);
    thread::sleep(Duration::from_millis(100));
    engine.note_off(1);
    // default release 0.4 s x 1.25
    thread::sleep(Duration::from_millis(800));
    assert_eq!(engine.sounding_voice_count(), 0);
    engine.stop().unwrap();
}

#[test]
fn dropping_a_running_engine_stops_it() {
    let mut engine = realtime_engine();
    engine.start().unwrap();
    engine.note_on(440.0, 1, PitchModifiers::NONE, 0.5);
    drop(engine);
}
