//! Voice pool: allocation, stealing, key mapping, and mono/legato handling.
//!
//! The pool owns the bookkeeping that only the note-event path touches (the
//! key map, the mono note stack, the round-robin cursor). The voices
//! themselves live in a [`VoiceArena`] shared with the control loop; each
//! voice sits behind its own lock so a tick on one voice never waits for an
//! event on another.
//!
//! # Allocation
//!
//! 1. Scan the active slots round-robin for an available voice.
//! 2. If none is free, steal the voice with the oldest trigger time and mark
//!    it available on the spot. Its in-flight levels become the start of the
//!    new note's envelopes.
//!
//! # Mono mode
//!
//! Polyphony 1 is mono. Held keys form a stack; releasing the sounding key
//! resumes the most recent key still held. With legato on, a new key while
//! the gate is open changes pitch without restarting the envelopes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::graph::VoiceGraph;
use crate::template::{PitchModifiers, TemplateOverrides, VoiceTemplate};
use crate::voice::{NoteStart, Voice, VoiceSettings, VoiceSnapshot};

/// Identifier of a physical key or touch zone.
pub type KeyIndex = u32;

/// Fixed set of voices shared between the event path and the control loop.
pub struct VoiceArena<G: VoiceGraph> {
    voices: Arc<[Mutex<Voice<G>>]>,
}

impl<G: VoiceGraph> Clone for VoiceArena<G> {
    fn clone(&self) -> Self {
        Self {
            voices: Arc::clone(&self.voices),
        }
    }
}

impl<G: VoiceGraph> VoiceArena<G> {
    /// Wrap already-built voices.
    pub fn new(voices: Vec<Voice<G>>) -> Self {
        Self {
            voices: voices.into_iter().map(Mutex::new).collect(),
        }
    }

    /// Number of voices ever allocated.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Whether the arena has no voices.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Lock one voice.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn lock(&self, slot: usize) -> MutexGuard<'_, Voice<G>> {
        self.voices[slot].lock()
    }

    /// Iterate over every voice lock.
    pub fn iter(&self) -> impl Iterator<Item = &Mutex<Voice<G>>> {
        self.voices.iter()
    }
}

/// Pool sizing and behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    /// Voices built up front; polyphony can never exceed this.
    pub max_polyphony: usize,
    /// Voices in use; 1 means mono.
    pub polyphony: usize,
    /// Legato in mono mode.
    pub legato: bool,
    /// Per-voice settings.
    pub voice: VoiceSettings,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_polyphony: 16,
            polyphony: 8,
            legato: false,
            voice: VoiceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeldNote {
    key: KeyIndex,
    frequency: f32,
    touch_x: f32,
    filter_cutoff: Option<f32>,
}

/// Voice allocation front end.
pub struct VoicePool<G: VoiceGraph> {
    arena: VoiceArena<G>,
    clock: SharedClock,
    template: Arc<VoiceTemplate>,
    settings: VoiceSettings,
    polyphony: usize,
    legato: bool,
    key_to_voice: HashMap<KeyIndex, usize>,
    mono_owner: Option<KeyIndex>,
    mono_stack: Vec<HeldNote>,
    next_slot: usize,
}

impl<G: VoiceGraph> VoicePool<G> {
    /// Build `config.max_polyphony` voices with `factory` and start them.
    ///
    /// `factory` receives the slot index and returns that voice's graph.
    pub fn new(
        config: PoolConfig,
        template: VoiceTemplate,
        clock: SharedClock,
        mut factory: impl FnMut(usize) -> G,
    ) -> Self {
        let max = config.max_polyphony.max(1);
        let template = Arc::new(template.sanitized());
        let voices = (0..max)
            .map(|slot| Voice::new(slot, factory(slot), Arc::clone(&template), config.voice))
            .collect();
        Self {
            arena: VoiceArena::new(voices),
            clock,
            template,
            settings: config.voice,
            polyphony: config.polyphony.clamp(1, max),
            legato: config.legato,
            key_to_voice: HashMap::new(),
            mono_owner: None,
            mono_stack: Vec::new(),
            next_slot: 0,
        }
    }

    /// Handle on the voices for the control loop.
    pub fn arena(&self) -> VoiceArena<G> {
        self.arena.clone()
    }

    /// The clock all timestamps come from.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    // -- note events ------------------------------------------------------

    /// Start a note. Returns the slot that plays it, or `None` when the
    /// frequency after pitch modifiers is not a positive finite number, in
    /// which case nothing changes.
    pub fn note_on(
        &mut self,
        frequency: f32,
        key: KeyIndex,
        pitch: PitchModifiers,
        touch_x: f32,
    ) -> Option<usize> {
        self.note_on_with_overrides(frequency, key, pitch, touch_x, TemplateOverrides::default())
    }

    /// Start a note with per-note template overrides.
    pub fn note_on_with_overrides(
        &mut self,
        frequency: f32,
        key: KeyIndex,
        pitch: PitchModifiers,
        touch_x: f32,
        overrides: TemplateOverrides,
    ) -> Option<usize> {
        let frequency = pitch.apply(frequency);
        if !(frequency.is_finite() && frequency > 0.0) {
            warn!(key, frequency, "ignoring note on with invalid frequency");
            return None;
        }
        self.prune_mappings();
        let now = self.clock.now();

        if self.is_mono() {
            self.mono_stack.retain(|n| n.key != key);
            self.mono_stack.push(HeldNote {
                key,
                frequency,
                touch_x,
                filter_cutoff: overrides.filter_cutoff,
            });
            if self.legato
                && let Some(slot) = self.mono_slot()
            {
                let retriggered = self
                    .arena
                    .lock(slot)
                    .retrigger(now, frequency, touch_x, overrides.filter_cutoff);
                if retriggered {
                    self.map_key(key, slot);
                    self.mono_owner = Some(key);
                    debug!(key, slot, frequency, "legato note change");
                    return Some(slot);
                }
            }
        }

        let slot = match self.key_to_voice.get(&key) {
            Some(&slot) if slot < self.polyphony => slot,
            _ => self.allocate(),
        };
        self.map_key(key, slot);
        self.arena.lock(slot).trigger(
            now,
            NoteStart {
                frequency,
                touch_x,
                overrides,
            },
        );
        if self.is_mono() {
            self.mono_owner = Some(key);
        }
        debug!(key, slot, frequency, "note on");
        Some(slot)
    }

    /// Release a note.
    ///
    /// In mono mode releasing the sounding key resumes the most recent key
    /// still held, if any.
    pub fn note_off(&mut self, key: KeyIndex) {
        self.prune_mappings();
        let now = self.clock.now();

        if !self.is_mono() {
            if let Some(&slot) = self.key_to_voice.get(&key) {
                self.arena.lock(slot).release(now);
                debug!(key, slot, "note off");
            }
            return;
        }

        self.mono_stack.retain(|n| n.key != key);
        if self.mono_owner != Some(key) {
            return;
        }
        let Some(&slot) = self.key_to_voice.get(&key) else {
            self.mono_owner = None;
            return;
        };

        match self.mono_stack.last().copied() {
            Some(next) => {
                let mut voice = self.arena.lock(slot);
                if !voice.retrigger(now, next.frequency, next.touch_x, next.filter_cutoff) {
                    let mut note = NoteStart::new(next.frequency, next.touch_x);
                    note.overrides.filter_cutoff = next.filter_cutoff;
                    voice.trigger(now, note);
                }
                drop(voice);
                self.key_to_voice.remove(&key);
                self.map_key(next.key, slot);
                self.mono_owner = Some(next.key);
                debug!(released = key, resumed = next.key, slot, "mono stack resume");
            }
            None => {
                self.arena.lock(slot).release(now);
                self.mono_owner = None;
                debug!(key, slot, "mono note off");
            }
        }
    }

    /// Route a touch-position update to the voice playing `key`.
    ///
    /// In mono mode only the sounding key reaches the voice; held keys just
    /// remember their position for when they resume.
    pub fn update_touch_position(&mut self, key: KeyIndex, touch_x: f32) {
        self.prune_mappings();
        if self.is_mono() {
            if let Some(held) = self.mono_stack.iter_mut().find(|n| n.key == key) {
                held.touch_x = touch_x;
            }
            if self.mono_owner != Some(key) {
                return;
            }
        }
        if let Some(&slot) = self.key_to_voice.get(&key) {
            self.arena.lock(slot).set_touch_position(touch_x);
        }
    }

    /// Release every sounding voice and forget all held keys.
    pub fn all_notes_off(&mut self) {
        let now = self.clock.now();
        for voice in self.arena.iter() {
            voice.lock().release(now);
        }
        self.key_to_voice.clear();
        self.mono_stack.clear();
        self.mono_owner = None;
        debug!("all notes off");
    }

    // -- mode -------------------------------------------------------------

    /// Change the number of voices in use, clamped to `[1, max_polyphony]`.
    ///
    /// Voices at or above the new count are released and unmapped. Going
    /// mono, a key still held on slot 0 becomes the sounding key of the
    /// mono stack, so releasing it still ends the note.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        let polyphony = polyphony.clamp(1, self.arena.len());
        if polyphony == self.polyphony {
            return;
        }
        let was_mono = self.is_mono();
        let now = self.clock.now();
        for slot in polyphony..self.arena.len() {
            self.arena.lock(slot).release(now);
        }
        self.key_to_voice.retain(|_, slot| *slot < polyphony);
        self.polyphony = polyphony;
        self.next_slot = 0;
        if was_mono != self.is_mono() {
            self.mono_stack.clear();
            self.mono_owner = None;
            if self.is_mono() {
                self.adopt_held_note();
            }
        }
        debug!(polyphony, "polyphony changed");
    }

    /// Turn legato on or off. Only matters in mono mode.
    pub fn set_legato(&mut self, legato: bool) {
        self.legato = legato;
    }

    /// Voices in use.
    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    /// Voices built.
    pub fn max_polyphony(&self) -> usize {
        self.arena.len()
    }

    /// Whether the pool runs in mono mode.
    pub fn is_mono(&self) -> bool {
        self.polyphony == 1
    }

    /// Whether legato is on.
    pub fn legato(&self) -> bool {
        self.legato
    }

    /// Key currently sounding in mono mode.
    pub fn mono_owner(&self) -> Option<KeyIndex> {
        self.mono_owner
    }

    // -- template ---------------------------------------------------------

    /// The template every voice plays.
    pub fn template(&self) -> &VoiceTemplate {
        &self.template
    }

    /// Replace the template, including base values, on every voice.
    pub fn apply_template(&mut self, template: VoiceTemplate) {
        let template = Arc::new(template.sanitized());
        self.template = Arc::clone(&template);
        for voice in self.arena.iter() {
            let mut voice = voice.lock();
            voice.set_template(Arc::clone(&template));
            voice.set_base_amplitude(template.base.amplitude);
            voice.set_base_filter_cutoff(template.base.filter_cutoff);
            voice.set_base_mod_index(template.base.mod_index);
            voice.set_base_mod_ratio(template.base.mod_ratio);
        }
        debug!(name = %template.name, "template applied");
    }

    /// Edit the template in place. Base values are not pushed; use the
    /// dedicated base setters for those.
    pub fn update_template(&mut self, edit: impl FnOnce(&mut VoiceTemplate)) {
        let mut next = (*self.template).clone();
        edit(&mut next);
        let template = Arc::new(next.sanitized());
        self.template = Arc::clone(&template);
        for voice in self.arena.iter() {
            voice.lock().set_template(Arc::clone(&template));
        }
    }

    /// Oscillator amplitude for every voice.
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.update_template(|t| t.base.amplitude = amplitude);
        let value = self.template.base.amplitude;
        self.each_voice(|v| v.set_base_amplitude(value));
    }

    /// Filter base cutoff for every voice.
    pub fn set_filter_cutoff(&mut self, hz: f32) {
        self.update_template(|t| t.base.filter_cutoff = hz);
        let value = self.template.base.filter_cutoff;
        self.each_voice(|v| v.set_base_filter_cutoff(value));
    }

    /// FM index base for every voice.
    pub fn set_mod_index(&mut self, index: f32) {
        self.update_template(|t| t.base.mod_index = index);
        let value = self.template.base.mod_index;
        self.each_voice(|v| v.set_base_mod_index(value));
    }

    /// FM ratio base for every voice.
    pub fn set_mod_ratio(&mut self, ratio: f32) {
        self.update_template(|t| t.base.mod_ratio = ratio);
        let value = self.template.base.mod_ratio;
        self.each_voice(|v| v.set_base_mod_ratio(value));
    }

    /// Replace the per-voice settings.
    pub fn set_voice_settings(&mut self, settings: VoiceSettings) {
        self.settings = settings;
        self.each_voice(|v| v.set_settings(settings));
    }

    /// Current per-voice settings.
    pub fn voice_settings(&self) -> VoiceSettings {
        self.settings
    }

    // -- inspection -------------------------------------------------------

    /// Voices currently producing sound.
    pub fn sounding_voice_count(&self) -> usize {
        self.arena.iter().filter(|v| v.lock().is_sounding()).count()
    }

    /// Slot mapped to `key`, if any. A voice that has finished its release
    /// counts as unmapped even before the next event prunes it.
    pub fn voice_for_key(&self, key: KeyIndex) -> Option<usize> {
        self.key_to_voice
            .get(&key)
            .copied()
            .filter(|&slot| !self.arena.lock(slot).is_available())
    }

    /// Summary of every voice in the arena.
    pub fn snapshots(&self) -> Vec<VoiceSnapshot> {
        let now = self.clock.now();
        let mut keys: HashMap<usize, KeyIndex> = HashMap::with_capacity(self.key_to_voice.len());
        for (&key, &slot) in &self.key_to_voice {
            keys.insert(slot, key);
        }
        self.arena
            .iter()
            .enumerate()
            .map(|(slot, v)| {
                let voice = v.lock();
                let key = keys.get(&slot).copied().filter(|_| !voice.is_available());
                voice.snapshot(now, key)
            })
            .collect()
    }

    /// Stop every backend graph.
    pub fn shutdown(&mut self) {
        self.each_voice(|v| v.shutdown());
        self.key_to_voice.clear();
        self.mono_stack.clear();
        self.mono_owner = None;
    }

    // -- internals --------------------------------------------------------

    fn each_voice(&self, mut f: impl FnMut(&mut Voice<G>)) {
        for voice in self.arena.iter() {
            f(&mut voice.lock());
        }
    }

    /// Put the gate-open key on slot 0, if any, at the bottom of a fresh
    /// mono stack.
    fn adopt_held_note(&mut self) {
        let Some(key) = self
            .key_to_voice
            .iter()
            .find_map(|(&key, &slot)| (slot == 0).then_some(key))
        else {
            return;
        };
        let voice = self.arena.lock(0);
        if !voice.is_gate_open() {
            return;
        }
        let held = HeldNote {
            key,
            frequency: voice.frequency(),
            touch_x: voice.state().current_touch_x,
            filter_cutoff: None,
        };
        drop(voice);
        self.mono_stack.push(held);
        self.mono_owner = Some(key);
        debug!(key, "held note adopted by mono stack");
    }

    /// The slot sounding in mono mode.
    fn mono_slot(&self) -> Option<usize> {
        self.mono_owner.and_then(|key| self.key_to_voice.get(&key).copied())
    }

    fn map_key(&mut self, key: KeyIndex, slot: usize) {
        self.key_to_voice.retain(|&k, &mut s| s != slot || k == key);
        self.key_to_voice.insert(key, slot);
    }

    /// Drop mappings whose voice has finished its release.
    fn prune_mappings(&mut self) {
        let arena = &self.arena;
        self.key_to_voice
            .retain(|_, slot| !arena.lock(*slot).is_available());
    }

    fn allocate(&mut self) -> usize {
        let n = self.polyphony;
        for offset in 0..n {
            let slot = (self.next_slot + offset) % n;
            if self.arena.lock(slot).is_available() {
                self.next_slot = (slot + 1) % n;
                return slot;
            }
        }

        let mut oldest = 0;
        let mut oldest_time = f64::INFINITY;
        for slot in 0..n {
            let t = self.arena.lock(slot).last_trigger_time();
            if t < oldest_time {
                oldest = slot;
                oldest_time = t;
            }
        }
        self.arena.lock(oldest).mark_available();
        self.key_to_voice.retain(|_, s| *s != oldest);
        self.next_slot = (oldest + 1) % n;
        debug!(slot = oldest, last_trigger = oldest_time, "stealing oldest voice");
        oldest
    }
}

impl<G: VoiceGraph> std::fmt::Debug for VoicePool<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("polyphony", &self.polyphony)
            .field("max_polyphony", &self.arena.len())
            .field("legato", &self.legato)
            .field("mapped_keys", &self.key_to_voice.len())
            .field("mono_owner", &self.mono_owner)
            .finish_non_exhaustive()
    }
}
