//! EntryStore: append-only ordered slots with tombstones.
//!
//! The store is the single definition of iteration order. Positions handed
//! out by `append` stay valid until `compact` renumbers them; removal only
//! marks a slot dead so the index's back-references never shift.

use crate::hash_index::ChainKey;
use std::collections::TryReserveError;

/// Compaction is never attempted below this many slots.
pub(crate) const MIN_COMPACT_LEN: usize = 8;

#[derive(Debug, Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    /// `S::hash_one(key)` at insertion; never recomputed.
    pub(crate) hash: u64,
    /// Same-key chain this entry belongs to.
    pub(crate) chain: ChainKey,
}

#[derive(Debug, Clone)]
pub(crate) enum Slot<K, V> {
    Live(Entry<K, V>),
    Tombstone,
}

#[derive(Debug, Clone)]
pub(crate) struct EntryStore<K, V> {
    slots: Vec<Slot<K, V>>,
    live: usize,
}

impl<K, V> EntryStore<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Number of live entries.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Number of physical slots, live or dead. Positions are `< slots_len()`.
    #[inline]
    pub(crate) fn slots_len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn tombstones(&self) -> usize {
        self.slots.len() - self.live
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.slots.try_reserve(additional)
    }

    /// Append a live entry and return its position. Amortized O(1).
    pub(crate) fn append(&mut self, entry: Entry<K, V>) -> usize {
        let pos = self.slots.len();
        self.slots.push(Slot::Live(entry));
        self.live += 1;
        pos
    }

    #[inline]
    pub(crate) fn get(&self, pos: usize) -> Option<&Entry<K, V>> {
        match self.slots.get(pos) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, pos: usize) -> Option<&mut Entry<K, V>> {
        match self.slots.get_mut(pos) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    /// Mark `pos` dead and hand back its entry.
    ///
    /// Trailing tombstones are dropped from the end of the store right away:
    /// no position past the last live slot is referenced by the index, so
    /// this never renumbers anything and keeps `last_live` O(1) amortized.
    pub(crate) fn tombstone(&mut self, pos: usize) -> Option<Entry<K, V>> {
        let slot = self.slots.get_mut(pos)?;
        match core::mem::replace(slot, Slot::Tombstone) {
            Slot::Live(entry) => {
                self.live -= 1;
                while let Some(Slot::Tombstone) = self.slots.last() {
                    self.slots.pop();
                }
                Some(entry)
            }
            Slot::Tombstone => None,
        }
    }

    /// Position of the most recently appended live entry.
    pub(crate) fn last_live(&self) -> Option<usize> {
        self.slots
            .iter()
            .rposition(|slot| matches!(slot, Slot::Live(_)))
    }

    /// Whether dead slots take up at least a third of the store.
    pub(crate) fn needs_compaction(&self) -> bool {
        self.slots.len() >= MIN_COMPACT_LEN && self.tombstones() * 3 >= self.slots.len()
    }

    /// Rewrite the store densely, preserving order.
    ///
    /// Returns the remap indexed by old position: `Some(new)` for live
    /// slots, `None` for tombstones. The remap is strictly increasing over
    /// live slots, so any ordered list of positions stays ordered.
    pub(crate) fn compact(&mut self) -> Vec<Option<usize>> {
        let mut remap = Vec::with_capacity(self.slots.len());
        let mut next = 0;
        for slot in &self.slots {
            match slot {
                Slot::Live(_) => {
                    remap.push(Some(next));
                    next += 1;
                }
                Slot::Tombstone => remap.push(None),
            }
        }
        self.slots.retain(|slot| matches!(slot, Slot::Live(_)));
        debug_assert_eq!(self.slots.len(), self.live);
        remap
    }

    /// Drop every slot, returning the live entries in order.
    pub(crate) fn take_all(&mut self) -> Vec<Entry<K, V>> {
        self.live = 0;
        core::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(Slot::into_live)
            .collect()
    }

    /// Live entries with their positions, in store order.
    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &Entry<K, V>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(pos, slot)| match slot {
                Slot::Live(e) => Some((pos, e)),
                Slot::Tombstone => None,
            })
    }

    /// First live entry at or after `pos`.
    pub(crate) fn next_live_from(&self, pos: usize) -> Option<(usize, &Entry<K, V>)> {
        self.slots
            .get(pos..)?
            .iter()
            .enumerate()
            .find_map(|(off, slot)| match slot {
                Slot::Live(e) => Some((pos + off, e)),
                Slot::Tombstone => None,
            })
    }

    /// Raw slots, tombstones included, for the public iterators.
    pub(crate) fn slots(&self) -> &[Slot<K, V>] {
        &self.slots
    }

    pub(crate) fn into_slots(self) -> Vec<Slot<K, V>> {
        self.slots
    }
}

impl<K, V> Slot<K, V> {
    #[inline]
    pub(crate) fn as_live(&self) -> Option<&Entry<K, V>> {
        match self {
            Slot::Live(e) => Some(e),
            Slot::Tombstone => None,
        }
    }

    #[inline]
    pub(crate) fn into_live(self) -> Option<Entry<K, V>> {
        match self {
            Slot::Live(e) => Some(e),
            Slot::Tombstone => None,
        }
    }
}
