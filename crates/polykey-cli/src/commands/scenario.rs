//! Deterministic scenario runner.
//!
//! Runs a note script on a manual clock, stepping the control loop once per
//! control interval, so the printed voice table is identical on every run.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Args;
use polykey_voice::{Clock, ManualClock, PitchModifiers};
use tracing::info;

use super::common::{apply_action, build_engine, load_config, print_voices, select_template};
use super::script::Script;

/// Mono legato: a held note, an overlapping note that glides, then release
/// back to the first held key.
const LEGATO_SCRIPT: &str = "
0     poly 1
0     legato on
0     on 60 0.4
300   on 64 0.6
600   off 64
900   off 60
1500  end
";

/// Two voices, three notes: the third steals the oldest voice.
const STEAL_SCRIPT: &str = "
0     poly 2
0     on 60 0.5
100   on 64 0.5
200   on 67 0.5
450   all-off
1200  end
";

/// Built-in scenario names.
pub const BUILTIN_SCENARIOS: &[(&str, &str)] = &[("legato", LEGATO_SCRIPT), ("steal", STEAL_SCRIPT)];

#[derive(Args)]
pub struct ScenarioArgs {
    /// Built-in scenario: legato or steal
    #[arg(conflicts_with = "script")]
    name: Option<String>,

    /// Script file to run instead of a built-in scenario
    #[arg(short, long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Template name or path
    #[arg(short, long)]
    template: Option<String>,

    /// Print the voice table every N milliseconds as well as after events
    #[arg(long, default_value = "50")]
    report_ms: u64,

    /// Transpose every note by this many semitones
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    transpose: f32,
}

pub fn run(args: ScenarioArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let script = load_script(args.name.as_deref(), args.script.as_deref())?;
    let config = load_config(config_path)?;
    let template = select_template(args.template.as_deref(), &config)?;

    let (clock, shared) = ManualClock::shared(0.0);
    let mut engine = build_engine(&config, template, shared)?;
    let pitch = PitchModifiers {
        semitones: args.transpose,
        cents: 0.0,
    };
    let step = engine.settings().control_interval.as_secs_f64();
    let report_every = (args.report_ms as f64 / 1000.0).max(step);

    info!(
        events = script.events.len(),
        duration_s = script.duration(),
        template = %engine.pool().template().name,
        "running scenario"
    );

    let mut next_event = 0;
    let mut next_report = 0.0;
    loop {
        let now = clock.now();
        let mut fired = false;
        while let Some(event) = script.events.get(next_event)
            && event.at <= now + 1e-9
        {
            apply_action(&mut engine, event.action, pitch);
            next_event += 1;
            fired = true;
        }
        engine.step()?;

        if fired || now + 1e-9 >= next_report {
            print_voices(&engine, now);
            next_report = now + report_every;
        }
        if next_event >= script.events.len() && now >= script.duration() {
            break;
        }
        clock.advance(step);
    }

    println!(
        "\n{} voice(s) sounding at the end",
        engine.sounding_voice_count()
    );
    Ok(())
}

fn load_script(name: Option<&str>, path: Option<&Path>) -> anyhow::Result<Script> {
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        return Script::parse(&text);
    }
    let name = name.unwrap_or("legato");
    match BUILTIN_SCENARIOS.iter().find(|(n, _)| *n == name) {
        Some((_, text)) => Script::parse(text),
        None => {
            let known: Vec<_> = BUILTIN_SCENARIOS.iter().map(|(n, _)| *n).collect();
            bail!("unknown scenario '{name}' (built-in: {})", known.join(", "))
        }
    }
}
