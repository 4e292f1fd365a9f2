//! Active sound registry
//!
//! Generational arena holding per-sound state. A `SoundId` is handed out when
//! a sound is first accepted (started, delayed or queued) and stays valid
//! until the engine forgets the sound; the slot can then be reused under a
//! new generation, so stale ids never alias a newer sound.

use super::channel_access::ChannelHandle;
use super::instance::SoundInstance;
use chirp_common::{Sound, SoundSource};
use std::sync::Arc;

/// Stable handle to a sound accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId {
    index: u32,
    generation: u32,
}

/// State of a sound that owns a channel
pub(crate) struct ActiveSound {
    pub instance: Arc<dyn SoundInstance>,
    pub sound: Sound,
    pub source: SoundSource,
    pub handle: ChannelHandle,

    /// Earliest tick at which a stopped channel may be reaped
    pub remove_after_tick: u64,

    /// Stopped on request; suppresses a manual loop restart
    pub stop_requested: bool,
}

enum Slot {
    Free,
    /// Accepted but not currently playing (delayed, queued, awaiting a loop restart)
    Reserved(Arc<dyn SoundInstance>),
    Active(ActiveSound),
}

struct Entry {
    generation: u32,
    slot: Slot,
}

#[derive(Default)]
pub(crate) struct SoundArena {
    entries: Vec<Entry>,
    free: Vec<u32>,
    active: usize,
}

impl SoundArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: SoundId) -> Option<&Entry> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
    }

    fn entry_mut(&mut self, id: SoundId) -> Option<&mut Entry> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
    }

    /// Assign an id to `instance` without starting it.
    pub fn reserve(&mut self, instance: Arc<dyn SoundInstance>) -> SoundId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.slot = Slot::Reserved(instance);
            return SoundId {
                index,
                generation: entry.generation,
            };
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            slot: Slot::Reserved(instance),
        });
        SoundId {
            index,
            generation: 0,
        }
    }

    /// Instance behind a reserved or active id
    pub fn instance(&self, id: SoundId) -> Option<&Arc<dyn SoundInstance>> {
        match &self.entry(id)?.slot {
            Slot::Reserved(instance) => Some(instance),
            Slot::Active(active) => Some(&active.instance),
            Slot::Free => None,
        }
    }

    /// Turn a reserved id into an active sound. Returns false if `id` is not
    /// currently reserved.
    pub fn activate(&mut self, id: SoundId, active: ActiveSound) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        if !matches!(entry.slot, Slot::Reserved(_)) {
            return false;
        }
        entry.slot = Slot::Active(active);
        self.active += 1;
        true
    }

    /// Drop the channel state but keep the id reserved.
    pub fn deactivate(&mut self, id: SoundId) -> Option<ActiveSound> {
        let entry = self.entry_mut(id)?;
        if !matches!(entry.slot, Slot::Active(_)) {
            return None;
        }
        let Slot::Active(active) = std::mem::replace(&mut entry.slot, Slot::Free) else {
            return None;
        };
        entry.slot = Slot::Reserved(Arc::clone(&active.instance));
        self.active -= 1;
        Some(active)
    }

    /// Forget `id`. Returns the channel state if it was active.
    pub fn remove(&mut self, id: SoundId) -> Option<ActiveSound> {
        let entry = self.entry_mut(id)?;
        let slot = std::mem::replace(&mut entry.slot, Slot::Free);
        if matches!(slot, Slot::Free) {
            return None;
        }
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);

        match slot {
            Slot::Active(active) => {
                self.active -= 1;
                Some(active)
            }
            _ => None,
        }
    }

    pub fn get(&self, id: SoundId) -> Option<&ActiveSound> {
        match &self.entry(id)?.slot {
            Slot::Active(active) => Some(active),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: SoundId) -> Option<&mut ActiveSound> {
        match &mut self.entry_mut(id)?.slot {
            Slot::Active(active) => Some(active),
            _ => None,
        }
    }

    pub fn is_reserved(&self, id: SoundId) -> bool {
        matches!(self.entry(id).map(|e| &e.slot), Some(Slot::Reserved(_)))
    }

    /// Ids of every sound that owns a channel
    pub fn active_ids(&self) -> Vec<SoundId> {
        self.iter_active().map(|(id, _)| id).collect()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (SoundId, &ActiveSound)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| match &entry.slot {
            Slot::Active(active) => Some((
                SoundId {
                    index: index as u32,
                    generation: entry.generation,
                },
                active,
            )),
            _ => None,
        })
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Forget every sound, invalidating all outstanding ids.
    pub fn clear(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if !matches!(entry.slot, Slot::Free) {
                entry.slot = Slot::Free;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.active = 0;
    }
}
