//! Factory templates bundled with the library.
//!
//! These are always available without external files and serve as starting
//! points for user templates.

use polykey_voice::VoiceTemplate;

use crate::template_file::template_from_toml;

/// Factory template names for external access.
pub static FACTORY_TEMPLATE_NAMES: &[&str] = &["init", "fm_bell", "touch_pad", "legato_lead"];

static FACTORY_TEMPLATES_TOML: &[(&str, &str)] = &[
    ("init", INIT_TEMPLATE),
    ("fm_bell", FM_BELL_TEMPLATE),
    ("touch_pad", TOUCH_PAD_TEMPLATE),
    ("legato_lead", LEGATO_LEAD_TEMPLATE),
];

/// Plain sine with a short envelope and no modulation.
const INIT_TEMPLATE: &str = r#"
name = "Init"
waveform = "sine"
"#;

/// Struck FM tone: the modulator envelope decays to nothing, so the index
/// falls away and leaves a pure partial.
const FM_BELL_TEMPLATE: &str = r#"
name = "FM Bell"
waveform = "sine"

[base]
amplitude = 0.8
filter_cutoff = 6000.0
mod_index = 0.5
mod_ratio = 3.5

[modulator_env]
attack = 0.0
decay = 1.2
sustain = 0.0
release = 1.0

[auxiliary_env]
attack = 0.0
decay = 0.4
sustain = 0.0
release = 0.5

[loudness_env]
attack = 0.0
decay = 2.5
sustain = 0.0
release = 1.5

[amounts]
mod_env_to_index = 6.0
aux_env_to_pitch = 0.3
key_tracking = 0.5
"#;

/// Slow pad whose filter follows the touch position.
const TOUCH_PAD_TEMPLATE: &str = r#"
name = "Touch Pad"
waveform = "triangle"
touch_smoothing = 0.08

[base]
amplitude = 0.7
filter_cutoff = 800.0
mod_index = 0.3
mod_ratio = 1.0

[loudness_env]
attack = 0.6
decay = 0.5
sustain = 0.8
release = 1.2

[lfo]
waveform = "triangle"
mode = "free"
rate_hz = 0.3

[amounts]
touch_to_filter = 3.0
touch_to_index = 1.0
key_tracking = 1.0

[global_lfo]
waveform = "sine"
rate_hz = 0.2
to_delay_time = 0.02
to_mixer_volume = 0.1

[effects]
delay_time = 0.35
mixer_volume = 0.6
"#;

/// Mono lead with tempo-synced vibrato that fades in after each attack.
const LEGATO_LEAD_TEMPLATE: &str = r#"
name = "Legato Lead"
waveform = "saw"

[base]
amplitude = 0.8
filter_cutoff = 1500.0
mod_index = 0.0
mod_ratio = 1.0

[auxiliary_env]
attack = 0.02
decay = 0.3
sustain = 0.2
release = 0.3

[loudness_env]
attack = 0.01
decay = 0.2
sustain = 0.9
release = 0.25

[lfo]
waveform = "sine"
mode = "tempo_sync"
division = "sixteenth"
delay = 0.4

[amounts]
aux_env_to_filter = 2.0
lfo_to_pitch = 0.25
touch_to_pitch = 1.0
key_tracking = 0.7
"#;

/// All factory templates.
///
/// ```rust
/// use polykey_config::factory_templates;
///
/// for template in factory_templates() {
///     println!("  - {}", template.name);
/// }
/// ```
pub fn factory_templates() -> Vec<VoiceTemplate> {
    FACTORY_TEMPLATES_TOML
        .iter()
        .filter_map(|(_, toml)| template_from_toml(toml).ok())
        .collect()
}

/// Get a factory template by identifier or display name, case-insensitive.
///
/// ```rust
/// use polykey_config::get_factory_template;
///
/// assert_eq!(get_factory_template("FM Bell").map(|t| t.name), Some("FM Bell".to_string()));
/// ```
pub fn get_factory_template(name: &str) -> Option<VoiceTemplate> {
    let name_lower = name.to_lowercase();

    for (id, toml) in FACTORY_TEMPLATES_TOML {
        if id.to_lowercase() == name_lower {
            return template_from_toml(toml).ok();
        }
    }

    factory_templates()
        .into_iter()
        .find(|t| t.name.to_lowercase() == name_lower)
}

/// Identifiers of all factory templates.
pub fn factory_template_names() -> Vec<&'static str> {
    FACTORY_TEMPLATES_TOML.iter().map(|(name, _)| *name).collect()
}

/// Whether `name` refers to a factory template.
pub fn is_factory_template(name: &str) -> bool {
    get_factory_template(name).is_some()
}
