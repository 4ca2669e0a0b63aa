//! Real-time playback: note events from this thread, control cycles from
//! the engine's scheduler thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Args;
use polykey_voice::{MonotonicClock, PitchModifiers};
use tracing::info;

use super::common::{apply_action, build_engine, load_config, print_voices, select_template};
use super::script::{Action, Script, ScriptEvent};

#[derive(Args)]
pub struct PlayArgs {
    /// Script file with timed note events
    #[arg(short, long, value_name = "FILE", conflicts_with = "notes")]
    script: Option<PathBuf>,

    /// Comma-separated MIDI notes to play as a chord (e.g., "60,64,67")
    #[arg(short, long)]
    notes: Option<String>,

    /// How long to hold the chord before releasing it
    #[arg(long, default_value = "1000")]
    hold_ms: u64,

    /// Keep the chord held until Ctrl+C
    #[arg(long)]
    until_stopped: bool,

    /// Template name or path
    #[arg(short, long)]
    template: Option<String>,

    /// Print the voice table every N milliseconds
    #[arg(long, default_value = "100")]
    report_ms: u64,
}

pub fn run(args: PlayArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let template = select_template(args.template.as_deref(), &config)?;
    let script = match (&args.script, &args.notes) {
        (Some(path), _) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            Script::parse(&text)?
        }
        (None, Some(notes)) => chord_script(notes, args.hold_ms, args.until_stopped)?,
        (None, None) => chord_script("60,64,67", args.hold_ms, args.until_stopped)?,
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut engine = build_engine(&config, template, MonotonicClock::shared())?;
    engine.start()?;
    info!(
        template = %engine.pool().template().name,
        polyphony = engine.pool().polyphony(),
        "playing; press Ctrl+C to stop"
    );

    let report_every = Duration::from_millis(args.report_ms.max(10));
    let start = Instant::now();
    let mut next_report = start;
    let mut events = script.events.iter().peekable();
    let tail = release_tail(&engine);

    while running.load(Ordering::SeqCst) {
        let elapsed = start.elapsed().as_secs_f64();
        while let Some(event) = events.next_if(|e| e.at <= elapsed) {
            apply_action(&mut engine, event.action, PitchModifiers::NONE);
        }

        let now = Instant::now();
        if now >= next_report {
            print_voices(&engine, elapsed);
            next_report += report_every;
        }

        let finished = events.peek().is_none() && elapsed >= script.duration() + tail;
        if finished && !args.until_stopped {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    engine.all_notes_off();
    engine.stop()?;
    println!(
        "\n{} voice(s) still releasing at exit",
        engine.sounding_voice_count()
    );
    Ok(())
}

/// Build a script that strikes `notes` together and releases them after
/// `hold_ms`, or never when `hold_forever` is set.
fn chord_script(notes: &str, hold_ms: u64, hold_forever: bool) -> anyhow::Result<Script> {
    let keys = notes
        .split(',')
        .map(|n| n.trim().parse::<u8>().with_context(|| format!("bad note '{n}'")))
        .collect::<anyhow::Result<Vec<u8>>>()?;
    if keys.is_empty() || keys.iter().any(|&k| k > 127) {
        bail!("notes must be MIDI numbers 0-127");
    }
    let release_at = hold_ms as f64 / 1000.0;
    let mut events: Vec<ScriptEvent> = keys
        .iter()
        .map(|&key| ScriptEvent {
            at: 0.0,
            action: Action::On { key, touch: 0.5 },
        })
        .collect();
    if !hold_forever {
        events.extend(keys.iter().map(|&key| ScriptEvent {
            at: release_at,
            action: Action::Off { key },
        }));
    }
    Ok(Script { events })
}

/// Time for the longest possible release to finish after the last event.
fn release_tail(engine: &super::common::SimEngine) -> f64 {
    let template = engine.pool().template();
    let multiplier = engine.pool().voice_settings().release_multiplier;
    f64::from(template.loudness_env.release * multiplier) + 0.05
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_releases_after_hold() {
        let script = chord_script("60, 64,67", 500, false).unwrap();
        assert_eq!(script.events.len(), 6);
        assert!((script.duration() - 0.5).abs() < 1e-9);
        assert!(matches!(script.events[5].action, Action::Off { key: 67 }));
    }

    #[test]
    fn held_chord_has_no_release() {
        let script = chord_script("48", 500, true).unwrap();
        assert_eq!(script.events.len(), 1);
        assert!(chord_script("60,x", 500, false).is_err());
        assert!(chord_script("200", 500, false).is_err());
    }
}
