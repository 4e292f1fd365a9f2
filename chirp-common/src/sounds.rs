//! Sound registration documents and the event registry
//!
//! Each namespace ships one JSON document mapping event names to a weighted
//! list of candidate sounds:
//!
//! ```json
//! {
//!   "block.door.open": {
//!     "replace": false,
//!     "subtitle": "subtitles.block.door.open",
//!     "sounds": [
//!       "block/door/open1",
//!       { "name": "block/door/open2", "volume": 0.8, "weight": 2 },
//!       { "name": "block.door.creak", "type": "event" }
//!     ]
//!   }
//! }
//! ```
//!
//! A candidate is either a direct file reference or a reference to another
//! event. Event references are resolved when a sound is picked, so a later
//! registration of the referenced event is honoured.

use crate::location::{ResourceLocation, DEFAULT_NAMESPACE};
use crate::{Error, Result};
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Default attenuation distance (blocks) for a sound entry
pub const DEFAULT_ATTENUATION_DISTANCE: u32 = 16;

/// Event references nested deeper than this resolve to the empty sound
const MAX_EVENT_DEPTH: usize = 16;

/// How a candidate name is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    /// Direct reference to an audio file
    #[default]
    File,
    /// Reference to another registered event
    Event,
}

/// A concrete playable sound picked from an event
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    location: ResourceLocation,
    volume: f32,
    pitch: f32,
    weight: u32,
    kind: SoundKind,
    stream: bool,
    preload: bool,
    attenuation_distance: u32,
}

impl Sound {
    /// Location of the shared "nothing registered" sound
    pub const EMPTY: &'static str = "chirp:empty";

    /// Location of the deliberately silent sound
    pub const INTENTIONALLY_EMPTY: &'static str = "chirp:intentionally_empty";

    /// File sound with default parameters
    pub fn file(location: ResourceLocation) -> Self {
        Self {
            location,
            volume: 1.0,
            pitch: 1.0,
            weight: 1,
            kind: SoundKind::File,
            stream: false,
            preload: false,
            attenuation_distance: DEFAULT_ATTENUATION_DISTANCE,
        }
    }

    pub fn empty() -> Self {
        Self::file(ResourceLocation::builtin(DEFAULT_NAMESPACE, "empty"))
    }

    pub fn intentionally_empty() -> Self {
        Self::file(ResourceLocation::builtin(DEFAULT_NAMESPACE, "intentionally_empty"))
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_attenuation_distance(mut self, distance: u32) -> Self {
        self.attenuation_distance = distance;
        self
    }

    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    /// Resource path of the audio file: `ns:foo/bar` -> `ns:sounds/foo/bar.ogg`
    pub fn path(&self) -> ResourceLocation {
        self.location.with_path(|p| format!("sounds/{}.ogg", p))
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn kind(&self) -> SoundKind {
        self.kind
    }

    pub fn should_stream(&self) -> bool {
        self.stream
    }

    pub fn should_preload(&self) -> bool {
        self.preload
    }

    pub fn attenuation_distance(&self) -> u32 {
        self.attenuation_distance
    }

    pub fn is_empty(&self) -> bool {
        self.location.namespace() == DEFAULT_NAMESPACE && self.location.path() == "empty"
    }

    pub fn is_intentionally_empty(&self) -> bool {
        self.location.namespace() == DEFAULT_NAMESPACE
            && self.location.path() == "intentionally_empty"
    }
}

/// One weighted candidate of an event
#[derive(Debug, Clone)]
enum Candidate {
    File(Sound),
    /// Reference to another event; the stored sound carries the volume,
    /// pitch and flags that compose with whatever the target resolves to.
    Event(Sound),
}

/// All candidates registered for one event name
#[derive(Debug, Clone)]
pub struct WeighedSoundEvents {
    location: ResourceLocation,
    subtitle: Option<String>,
    candidates: Vec<Candidate>,
}

impl WeighedSoundEvents {
    fn new(location: ResourceLocation, subtitle: Option<String>) -> Self {
        Self {
            location,
            subtitle,
            candidates: Vec::new(),
        }
    }

    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Total weight, following event references through `registry`.
    ///
    /// Weights are summed as `u64` and saturate, so any mix of `u32` weights
    /// is representable.
    pub fn weight(&self, registry: &SoundRegistry) -> u64 {
        self.weight_at_depth(registry, 0)
    }

    fn weight_at_depth(&self, registry: &SoundRegistry, depth: usize) -> u64 {
        self.candidates
            .iter()
            .map(|candidate| candidate_weight(candidate, registry, depth))
            .fold(0u64, u64::saturating_add)
    }

    /// Pick one sound at random, honouring weights.
    ///
    /// Returns the empty sound when nothing with positive weight is registered.
    pub fn pick<R: Rng + ?Sized>(&self, registry: &SoundRegistry, rng: &mut R) -> Sound {
        self.pick_at_depth(registry, rng, 0)
    }

    fn pick_at_depth<R: Rng + ?Sized>(
        &self,
        registry: &SoundRegistry,
        rng: &mut R,
        depth: usize,
    ) -> Sound {
        if depth > MAX_EVENT_DEPTH {
            warn!("Event reference chain too deep at {}", self.location);
            return Sound::empty();
        }

        let total = self.weight_at_depth(registry, depth);
        if self.candidates.is_empty() || total == 0 {
            return Sound::empty();
        }

        let mut roll = rng.gen_range(0..total);
        for candidate in &self.candidates {
            let weight = candidate_weight(candidate, registry, depth);
            if roll < weight {
                return resolve_candidate(candidate, registry, rng, depth);
            }
            roll -= weight;
        }

        Sound::empty()
    }
}

fn candidate_weight(candidate: &Candidate, registry: &SoundRegistry, depth: usize) -> u64 {
    match candidate {
        Candidate::File(sound) => u64::from(sound.weight),
        Candidate::Event(reference) => {
            if depth >= MAX_EVENT_DEPTH {
                return 0;
            }
            registry
                .get(&reference.location)
                .map(|events| events.weight_at_depth(registry, depth + 1))
                .unwrap_or(0)
        }
    }
}

fn resolve_candidate<R: Rng + ?Sized>(
    candidate: &Candidate,
    registry: &SoundRegistry,
    rng: &mut R,
    depth: usize,
) -> Sound {
    match candidate {
        Candidate::File(sound) => sound.clone(),
        Candidate::Event(reference) => match registry.get(&reference.location) {
            None => Sound::empty(),
            Some(target) => {
                let picked = target.pick_at_depth(registry, rng, depth + 1);
                Sound {
                    location: picked.location,
                    volume: picked.volume * reference.volume,
                    pitch: picked.pitch * reference.pitch,
                    weight: picked.weight,
                    kind: SoundKind::File,
                    stream: picked.stream || reference.stream,
                    preload: picked.preload,
                    attenuation_distance: picked.attenuation_distance,
                }
            }
        },
    }
}

/// Registration of one event as written in a namespace document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SoundEventRegistration {
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
}

/// One entry of the `sounds` array: a bare name or a full object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SoundEntry {
    Name(String),
    Full(SoundEntryDef),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoundEntryDef {
    pub name: String,
    #[serde(default = "one")]
    pub volume: f32,
    #[serde(default = "one")]
    pub pitch: f32,
    #[serde(default = "one_u32")]
    pub weight: u32,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub preload: bool,
    #[serde(default = "default_attenuation")]
    pub attenuation_distance: u32,
    #[serde(default, rename = "type")]
    pub kind: SoundKind,
}

fn one() -> f32 {
    1.0
}

fn one_u32() -> u32 {
    1
}

fn default_attenuation() -> u32 {
    DEFAULT_ATTENUATION_DISTANCE
}

/// Registry of every known sound event
#[derive(Debug, Clone)]
pub struct SoundRegistry {
    events: HashMap<ResourceLocation, WeighedSoundEvents>,
}

impl Default for SoundRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundRegistry {
    /// Registry containing only the intentionally-empty event
    pub fn new() -> Self {
        let mut registry = Self {
            events: HashMap::new(),
        };
        let silent = Sound::intentionally_empty();
        let mut events = WeighedSoundEvents::new(silent.location.clone(), None);
        events.candidates.push(Candidate::File(silent.clone()));
        registry.events.insert(silent.location.clone(), events);
        registry
    }

    /// Parse and register a namespace document.
    pub fn register_document(&mut self, namespace: &str, json: &str) -> Result<usize> {
        let document: BTreeMap<String, SoundEventRegistration> = serde_json::from_str(json)
            .map_err(|source| Error::Registration {
                namespace: namespace.to_string(),
                source,
            })?;

        let mut registered = 0;
        for (name, registration) in document {
            let event = ResourceLocation::new(namespace, name)?;
            self.register(event, registration)?;
            registered += 1;
        }

        debug!("Registered {} sound events for namespace {}", registered, namespace);
        Ok(registered)
    }

    /// Register (or extend) a single event.
    ///
    /// `replace` discards earlier candidates for the event instead of appending.
    pub fn register(
        &mut self,
        event: ResourceLocation,
        registration: SoundEventRegistration,
    ) -> Result<()> {
        let namespace = event.namespace().to_string();
        let entry = self
            .events
            .entry(event.clone())
            .or_insert_with(|| WeighedSoundEvents::new(event.clone(), None));

        if registration.replace {
            debug!("Replacing sound event {}", event);
            entry.candidates.clear();
        }
        if registration.subtitle.is_some() {
            entry.subtitle = registration.subtitle;
        }

        for raw in registration.sounds {
            let def = match raw {
                SoundEntry::Name(name) => SoundEntryDef {
                    name,
                    volume: 1.0,
                    pitch: 1.0,
                    weight: 1,
                    stream: false,
                    preload: false,
                    attenuation_distance: DEFAULT_ATTENUATION_DISTANCE,
                    kind: SoundKind::File,
                },
                SoundEntry::Full(def) => def,
            };

            let location = ResourceLocation::parse_with_default(&def.name, &namespace)?;
            let sound = Sound {
                location,
                volume: def.volume,
                pitch: def.pitch,
                weight: def.weight,
                kind: def.kind,
                stream: def.stream,
                preload: def.preload,
                attenuation_distance: def.attenuation_distance,
            };

            entry.candidates.push(match def.kind {
                SoundKind::File => Candidate::File(sound),
                SoundKind::Event => Candidate::Event(sound),
            });
        }

        Ok(())
    }

    pub fn get(&self, event: &ResourceLocation) -> Option<&WeighedSoundEvents> {
        self.events.get(event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sounds flagged `preload` in any registered file candidate
    pub fn preload_sounds(&self) -> Vec<Sound> {
        self.events
            .values()
            .flat_map(|events| events.candidates.iter())
            .filter_map(|candidate| match candidate {
                Candidate::File(sound) if sound.preload => Some(sound.clone()),
                _ => None,
            })
            .collect()
    }

    /// Events from `expected` that have no registration.
    pub fn missing_events<'a>(
        &self,
        expected: impl IntoIterator<Item = &'a ResourceLocation>,
    ) -> Vec<ResourceLocation> {
        expected
            .into_iter()
            .filter(|event| !self.events.contains_key(*event))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn loc(s: &str) -> ResourceLocation {
        s.parse().unwrap()
    }

    #[test]
    fn test_register_document_defaults() {
        let mut registry = SoundRegistry::new();
        let json = r#"{
            "ui.click": { "sounds": ["ui/click1", { "name": "ui/click2", "volume": 0.5, "stream": true }] }
        }"#;
        assert_eq!(registry.register_document("game", json).unwrap(), 1);

        let events = registry.get(&loc("game:ui.click")).unwrap();
        assert_eq!(events.candidate_count(), 2);
        assert_eq!(events.weight(&registry), 2);
    }

    #[test]
    fn test_replace_discards_previous_candidates() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document("game", r#"{ "step": { "sounds": ["a", "b"] } }"#)
            .unwrap();
        registry
            .register_document("game", r#"{ "step": { "sounds": ["c"] } }"#)
            .unwrap();
        assert_eq!(registry.get(&loc("game:step")).unwrap().candidate_count(), 3);

        registry
            .register_document("game", r#"{ "step": { "replace": true, "sounds": ["d"] } }"#)
            .unwrap();
        let events = registry.get(&loc("game:step")).unwrap();
        assert_eq!(events.candidate_count(), 1);

        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(events.pick(&registry, &mut rng).location(), &loc("game:d"));
    }

    #[test]
    fn test_event_reference_composes_volume_and_pitch() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document(
                "game",
                r#"{
                    "base": { "sounds": [{ "name": "base1", "volume": 0.5, "pitch": 2.0, "weight": 3 }] },
                    "alias": { "sounds": [{ "name": "base", "type": "event", "volume": 0.5, "pitch": 0.5, "stream": true }] }
                }"#,
            )
            .unwrap();

        let alias = registry.get(&loc("game:alias")).unwrap();
        assert_eq!(alias.weight(&registry), 3);

        let mut rng = StdRng::seed_from_u64(1);
        let sound = alias.pick(&registry, &mut rng);
        assert_eq!(sound.location(), &loc("game:base1"));
        assert!((sound.volume() - 0.25).abs() < f32::EPSILON);
        assert!((sound.pitch() - 1.0).abs() < f32::EPSILON);
        assert!(sound.should_stream());
    }

    #[test]
    fn test_dangling_reference_picks_empty() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document("game", r#"{ "alias": { "sounds": [{ "name": "nowhere", "type": "event" }] } }"#)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let sound = registry.get(&loc("game:alias")).unwrap().pick(&registry, &mut rng);
        assert!(sound.is_empty());
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document("game", r#"{ "loop": { "sounds": [{ "name": "loop", "type": "event" }] } }"#)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let sound = registry.get(&loc("game:loop")).unwrap().pick(&registry, &mut rng);
        assert!(sound.is_empty());
    }

    #[test]
    fn test_extreme_weights_do_not_overflow() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document(
                "game",
                r#"{ "heavy": { "sounds": [
                    { "name": "big", "weight": 4294967295 },
                    { "name": "small", "weight": 1 }
                ] } }"#,
            )
            .unwrap();

        let events = registry.get(&loc("game:heavy")).unwrap();
        assert_eq!(events.weight(&registry), 4_294_967_296);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..32 {
            let sound = events.pick(&registry, &mut rng);
            assert!(!sound.is_empty());
        }
    }

    #[test]
    fn test_sound_path() {
        let sound = Sound::file(loc("music:menu/theme"));
        assert_eq!(sound.path(), loc("music:sounds/menu/theme.ogg"));
    }

    #[test]
    fn test_missing_events_and_preload() {
        let mut registry = SoundRegistry::new();
        registry
            .register_document("game", r#"{ "a": { "sounds": [{ "name": "a1", "preload": true }] } }"#)
            .unwrap();
        let expected = [loc("game:a"), loc("game:b")];
        assert_eq!(registry.missing_events(expected.iter()), vec![loc("game:b")]);
        assert_eq!(registry.preload_sounds().len(), 1);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let mut registry = SoundRegistry::new();
        let err = registry.register_document("game", "{ not json").unwrap_err();
        assert!(matches!(err, Error::Registration { .. }));
    }
}
