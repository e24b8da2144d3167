//! Live-object registry
//!
//! A generation-checked slot map of every tracked object alive in the
//! process. The registry never owns the objects: entries hold a weak
//! reference and the object's shared label, so a report can be produced
//! without upgrading (and therefore without ever running a destructor while
//! the registry lock is held).
//!
//! Entries are also indexed by object address, which lets the ABI reject a
//! handle that does not point at a registered object.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::tracked_object::{ObjectLabel, ObjectType, TrackedObject};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Key of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    index: u32,
    generation: u32,
}

struct Entry {
    label: Arc<ObjectLabel>,
    object: Weak<TrackedObject>,
    address: usize,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Diagnostic snapshot of one live object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveObject {
    pub object_type: ObjectType,
    pub name: String,
    /// Approximate, the count may change as soon as it is read
    pub ref_count: usize,
}

/// Registry of live tracked objects
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_address: HashMap<usize, u32>,
    /// Objects dropped from the registry by a forced shutdown. Their handles
    /// stay releasable but they no longer count as live.
    orphans: HashSet<usize>,
    len: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under its address
    pub fn insert(
        &mut self,
        label: Arc<ObjectLabel>,
        object: Weak<TrackedObject>,
        address: usize,
    ) -> ObjectKey {
        let entry = Entry {
            label,
            object,
            address,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.by_address.insert(address, index);
        self.orphans.remove(&address);
        self.len += 1;
        ObjectKey {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Remove an entry. Stale keys only clear the orphan mark of `address`.
    pub fn remove(&mut self, key: ObjectKey, address: usize) -> bool {
        let slot = match self.slots.get_mut(key.index as usize) {
            Some(slot) if slot.generation == key.generation && slot.entry.is_some() => slot,
            _ => {
                self.orphans.remove(&address);
                return false;
            }
        };
        if let Some(entry) = slot.entry.take() {
            self.by_address.remove(&entry.address);
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        true
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.slots
            .get(key.index as usize)
            .is_some_and(|slot| slot.generation == key.generation && slot.entry.is_some())
    }

    /// Whether `address` belongs to an object that has not been destroyed
    pub fn is_live_address(&self, address: usize) -> bool {
        self.by_address.contains_key(&address) || self.orphans.contains(&address)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Snapshot of every registered object, in slot order
    pub fn snapshot(&self) -> Vec<LiveObject> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .map(|entry| LiveObject {
                object_type: entry.label.object_type(),
                name: entry.label.name(),
                ref_count: entry.object.strong_count(),
            })
            .collect()
    }

    /// Forget every entry, turning them into orphans. Returns how many were
    /// registered.
    pub fn clear(&mut self) -> usize {
        let cleared = self.len;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                self.orphans.insert(entry.address);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.by_address.clear();
        self.len = 0;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> Arc<ObjectLabel> {
        Arc::new(ObjectLabel::new(ObjectType::PeerConnection, name.to_string()))
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = Registry::new();
        let a = registry.insert(label("a"), Weak::new(), 0x1000);
        let b = registry.insert(label("b"), Weak::new(), 0x2000);
        assert_eq!(registry.len(), 2);
        assert!(registry.is_live_address(0x1000));

        assert!(registry.remove(a, 0x1000));
        assert!(!registry.remove(a, 0x1000));
        assert!(!registry.is_live_address(0x1000));
        assert!(registry.contains(b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reused_slot_rejects_stale_key() {
        let mut registry = Registry::new();
        let old = registry.insert(label("old"), Weak::new(), 0x1000);
        registry.remove(old, 0x1000);
        let new = registry.insert(label("new"), Weak::new(), 0x3000);

        assert_ne!(old, new);
        assert!(!registry.remove(old, 0x1000));
        assert!(registry.contains(new));
        assert_eq!(registry.snapshot()[0].name, "new");
    }

    #[test]
    fn test_clear_orphans_entries() {
        let mut registry = Registry::new();
        let key = registry.insert(label("a"), Weak::new(), 0x1000);
        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());

        // Still releasable through its handle after a forced shutdown
        assert!(registry.is_live_address(0x1000));
        assert!(!registry.remove(key, 0x1000));
        assert!(!registry.is_live_address(0x1000));
    }
}
