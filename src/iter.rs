//! Iterators over a `MultiDict`.
//!
//! `Iter`, `Keys`, `Values` and `GetAll` borrow the map, so the borrow
//! checker already rules out mutation while they are alive. `Cursor` holds
//! no borrow at all; it remembers the version it was created at and refuses
//! to advance once the map has changed.

use crate::entry_store::{EntryStore, Slot};
use crate::error::Error;
use crate::multi_dict::MultiDict;
use core::iter::FusedIterator;
use core::slice;
use std::collections::vec_deque;
use std::vec;

/// Entries in insertion order.
pub struct Iter<'a, K, V> {
    slots: slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(store: &'a EntryStore<K, V>) -> Self {
        Self {
            slots: store.slots().iter(),
            remaining: store.len(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.slots.by_ref().find_map(Slot::as_live)?;
        self.remaining -= 1;
        Some((&entry.key, &entry.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let entry = self.slots.by_ref().rev().find_map(Slot::as_live)?;
        self.remaining -= 1;
        Some((&entry.key, &entry.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            remaining: self.remaining,
        }
    }
}

/// Keys in insertion order, one per entry (duplicates repeat).
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Keys<'a, K, V> {
    pub(crate) fn new(inner: Iter<'a, K, V>) -> Self {
        Self { inner }
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// Values in insertion order.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Values<'a, K, V> {
    pub(crate) fn new(inner: Iter<'a, K, V>) -> Self {
        Self { inner }
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, v)| v)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// Owned entries in insertion order.
pub struct IntoIter<K, V> {
    slots: vec::IntoIter<Slot<K, V>>,
    remaining: usize,
}

impl<K, V> IntoIter<K, V> {
    pub(crate) fn new(store: EntryStore<K, V>) -> Self {
        let remaining = store.len();
        Self {
            slots: store.into_slots().into_iter(),
            remaining,
        }
    }
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let entry = self.slots.by_ref().find_map(Slot::into_live)?;
        self.remaining -= 1;
        Some((entry.key, entry.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<(K, V)> {
        let entry = self.slots.by_ref().rev().find_map(Slot::into_live)?;
        self.remaining -= 1;
        Some((entry.key, entry.value))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

/// Values of one key in insertion order, walked along its same-key chain.
pub struct GetAll<'a, K, V> {
    store: &'a EntryStore<K, V>,
    positions: vec_deque::Iter<'a, usize>,
}

impl<'a, K, V> GetAll<'a, K, V> {
    pub(crate) fn new(
        store: &'a EntryStore<K, V>,
        positions: &'a std::collections::VecDeque<usize>,
    ) -> Self {
        Self {
            store,
            positions: positions.iter(),
        }
    }

    fn value_at(&self, pos: usize) -> &'a V {
        let store: &'a EntryStore<K, V> = self.store;
        &store
            .get(pos)
            .expect("chained position must be live")
            .value
    }
}

impl<'a, K, V> Iterator for GetAll<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        let &pos = self.positions.next()?;
        Some(self.value_at(pos))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for GetAll<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let &pos = self.positions.next_back()?;
        Some(self.value_at(pos))
    }
}

impl<K, V> ExactSizeIterator for GetAll<'_, K, V> {}
impl<K, V> FusedIterator for GetAll<'_, K, V> {}

/// A detached position in a map's iteration order.
///
/// The cursor stores only the map version it was created at and the next
/// store position to visit. Each `next` call re-checks the version, so any
/// structural change made in between (add, removal, replace, clear,
/// update, compaction) is reported as `Error::ConcurrentModification`
/// instead of yielding stale or skipped entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    version: u64,
    pos: usize,
}

impl Cursor {
    pub(crate) fn new(version: u64) -> Self {
        Self { version, pos: 0 }
    }

    /// Version of the map this cursor was created from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advance to the next live entry of `map`.
    ///
    /// Returns `Ok(None)` once the end is reached, and keeps returning it.
    pub fn next<'a, K, V, S>(
        &mut self,
        map: &'a MultiDict<K, V, S>,
    ) -> Result<Option<(&'a K, &'a V)>, Error> {
        if map.version != self.version {
            return Err(Error::ConcurrentModification);
        }
        let store = &map.table.store;
        match store.next_live_from(self.pos) {
            Some((pos, entry)) => {
                self.pos = pos + 1;
                Ok(Some((&entry.key, &entry.value)))
            }
            None => {
                self.pos = store.slots_len();
                Ok(None)
            }
        }
    }
}
