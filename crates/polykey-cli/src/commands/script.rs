//! Timed note scripts.
//!
//! One event per line: a time in milliseconds, a verb, and its arguments.
//! Blank lines and `#` comments are ignored; events may appear in any order.
//!
//! ```text
//! 0     on 60 0.5      # key 60, touch 0.5
//! 250   touch 60 0.9
//! 500   off 60
//! 600   poly 1
//! 600   legato on
//! 800   all-off
//! 1500  end
//! ```

use anyhow::{Context, bail};
use polykey_core::midi_to_freq;
use polykey_voice::KeyIndex;

/// What happens at one point of a script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Start MIDI note `key` with an initial touch position.
    On {
        /// MIDI note number, also used as the key index.
        key: u8,
        /// Initial touch position.
        touch: f32,
    },
    /// Release a key.
    Off {
        /// MIDI note number.
        key: u8,
    },
    /// Move the touch position of a held key.
    Touch {
        /// MIDI note number.
        key: u8,
        /// New touch position.
        x: f32,
    },
    /// Release everything.
    AllOff,
    /// Change the number of voices in use.
    Polyphony(usize),
    /// Switch legato.
    Legato(bool),
    /// Mark the end of the script; nothing happens.
    End,
}

impl Action {
    /// Key index for a MIDI note.
    pub fn key_index(key: u8) -> KeyIndex {
        KeyIndex::from(key)
    }

    /// Oscillator frequency for a MIDI note.
    pub fn frequency(key: u8) -> f32 {
        midi_to_freq(key)
    }
}

/// One timed event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEvent {
    /// Seconds from the start of the script.
    pub at: f64,
    /// What to do.
    pub action: Action,
}

/// A parsed script, sorted by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    /// Events, earliest first; ties keep file order.
    pub events: Vec<ScriptEvent>,
}

impl Script {
    /// Parse a script.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut events = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let event =
                parse_line(line).with_context(|| format!("line {}: '{}'", number + 1, raw.trim()))?;
            events.push(event);
        }
        events.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(Self { events })
    }

    /// Time of the last event in seconds.
    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.at)
    }
}

fn parse_line(line: &str) -> anyhow::Result<ScriptEvent> {
    let mut words = line.split_whitespace();
    let at_ms: f64 = words
        .next()
        .context("missing time")?
        .parse()
        .context("time must be a number of milliseconds")?;
    if !(at_ms.is_finite() && at_ms >= 0.0) {
        bail!("time must be non-negative");
    }
    let verb = words.next().context("missing event")?;
    let args: Vec<&str> = words.collect();

    let action = match (verb, args.as_slice()) {
        ("on", [key]) => Action::On {
            key: parse_key(key)?,
            touch: 0.5,
        },
        ("on", [key, touch]) => Action::On {
            key: parse_key(key)?,
            touch: parse_unit(touch)?,
        },
        ("off", [key]) => Action::Off { key: parse_key(key)? },
        ("touch", [key, x]) => Action::Touch {
            key: parse_key(key)?,
            x: parse_unit(x)?,
        },
        ("all-off", []) => Action::AllOff,
        ("poly", [n]) => Action::Polyphony(n.parse().context("polyphony must be an integer")?),
        ("legato", ["on"]) => Action::Legato(true),
        ("legato", ["off"]) => Action::Legato(false),
        ("end", []) => Action::End,
        _ => bail!("unknown event '{verb}' with {} argument(s)", args.len()),
    };
    Ok(ScriptEvent {
        at: at_ms / 1000.0,
        action,
    })
}

fn parse_key(s: &str) -> anyhow::Result<u8> {
    let key: u8 = s.parse().context("key must be a MIDI note number")?;
    if key > 127 {
        bail!("key {key} is above 127");
    }
    Ok(key)
}

fn parse_unit(s: &str) -> anyhow::Result<f32> {
    let value: f32 = s.parse().context("touch must be a number")?;
    if !(0.0..=1.0).contains(&value) {
        bail!("touch {value} is outside 0..1");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts() {
        let script = Script::parse(
            "# chord\n500 off 60\n0 on 60 0.2\n  \n0 on 64\n250 touch 60 0.9 # swell\n",
        )
        .unwrap();
        let actions: Vec<_> = script.events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                Action::On { key: 60, touch: 0.2 },
                Action::On { key: 64, touch: 0.5 },
                Action::Touch { key: 60, x: 0.9 },
                Action::Off { key: 60 },
            ]
        );
        assert!((script.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mode_changes() {
        let script = Script::parse("0 poly 1\n0 legato on\n10 all-off\n20 end").unwrap();
        assert_eq!(script.events[0].action, Action::Polyphony(1));
        assert_eq!(script.events[1].action, Action::Legato(true));
        assert_eq!(script.events[2].action, Action::AllOff);
        assert_eq!(script.events[3].action, Action::End);
    }

    #[test]
    fn errors_name_the_line() {
        let err = Script::parse("0 on 60\n10 strum 60\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
        assert!(Script::parse("0 on 200").is_err());
        assert!(Script::parse("0 touch 60 1.5").is_err());
        assert!(Script::parse("-5 on 60").is_err());
    }

    #[test]
    fn note_frequency() {
        assert!((Action::frequency(69) - 440.0).abs() < 1e-3);
        assert_eq!(Action::key_index(60), 60);
    }
}
