//! Table: the entry store and hash index, kept in lockstep.
//!
//! Every method leaves both halves consistent before returning. The table
//! never hashes keys (callers pass the hash) and never drops user data:
//! removed entries are handed back so the caller decides when they drop.

use crate::entry_store::{Entry, EntryStore};
use crate::error::Error;
use crate::hash_index::{ChainKey, HashIndex};
use core::borrow::Borrow;
use std::collections::VecDeque;

/// Old value and removed duplicates left over from an in-place overwrite.
pub(crate) type Displaced<K, V> = (Option<V>, Vec<Entry<K, V>>);

#[derive(Debug, Clone)]
pub(crate) struct Table<K, V> {
    pub(crate) store: EntryStore<K, V>,
    pub(crate) index: HashIndex,
}

impl<K, V> Table<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            store: EntryStore::with_capacity(capacity),
            index: HashIndex::with_capacity(capacity),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.store.try_reserve(additional)?;
        self.index.try_reserve(additional)?;
        Ok(())
    }

    pub(crate) fn find_chain<Q>(&self, hash: u64, q: &Q) -> Option<ChainKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let store = &self.store;
        self.index.find_chain(hash, |pos| {
            store.get(pos).map_or(false, |e| e.key.borrow() == q)
        })
    }

    /// Earliest live position holding a key equal to `q`.
    pub(crate) fn find_first<Q>(&self, hash: u64, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let store = &self.store;
        self.index.find_first(hash, |pos| {
            store.get(pos).map_or(false, |e| e.key.borrow() == q)
        })
    }

    /// Every live position holding a key equal to `q`, in insertion order.
    pub(crate) fn find_all<Q>(&self, hash: u64, q: &Q) -> Option<&VecDeque<usize>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let store = &self.store;
        self.index.find_all(hash, |pos| {
            store.get(pos).map_or(false, |e| e.key.borrow() == q)
        })
    }

    /// Entry at the head of a chain.
    pub(crate) fn first_entry(&self, ck: ChainKey) -> &Entry<K, V> {
        self.store
            .get(self.index[ck].first())
            .expect("chain head must be live")
    }

    /// Append after every live entry, linking into the key's chain.
    pub(crate) fn push(&mut self, key: K, value: V, hash: u64) -> ChainKey
    where
        K: Eq,
    {
        let store = &self.store;
        let pos = store.slots_len();
        let ck = self.index.insert(hash, pos, |p| {
            store.get(p).map_or(false, |e| e.key == key)
        });
        let appended = self.store.append(Entry {
            key,
            value,
            hash,
            chain: ck,
        });
        debug_assert_eq!(appended, pos);
        ck
    }

    /// Overwrite the head of `ck` in place and tombstone the rest of it.
    pub(crate) fn replace_in_chain(&mut self, ck: ChainKey, value: V) -> Displaced<K, V> {
        let first = self.index[ck].first();
        let rest = self.index.truncate_to_first(ck);
        let old = self
            .store
            .get_mut(first)
            .map(|entry| core::mem::replace(&mut entry.value, value));
        let dropped = rest
            .into_iter()
            .filter_map(|pos| self.store.tombstone(pos))
            .collect();
        (old, dropped)
    }

    /// Remove the head of `ck`; later duplicates stay linked.
    pub(crate) fn pop_first(&mut self, ck: ChainKey) -> Entry<K, V> {
        let pos = self.index[ck].first();
        self.index.remove(ck, pos);
        self.store
            .tombstone(pos)
            .expect("chained position must be live")
    }

    /// Remove the most recently appended live entry.
    pub(crate) fn pop_last(&mut self) -> Option<Entry<K, V>> {
        let pos = self.store.last_live()?;
        let entry = self.store.tombstone(pos)?;
        debug_assert_eq!(entry.hash, self.index[entry.chain].hash());
        self.index.remove(entry.chain, pos);
        Some(entry)
    }

    /// Remove every entry of `ck`, in insertion order.
    pub(crate) fn remove_chain(&mut self, ck: ChainKey) -> Vec<Entry<K, V>> {
        self.index
            .remove_chain(ck)
            .into_iter()
            .filter_map(|pos| self.store.tombstone(pos))
            .collect()
    }

    pub(crate) fn take_all(&mut self) -> Vec<Entry<K, V>> {
        self.index.clear();
        self.store.take_all()
    }

    /// Compact the store once a third of it is dead, renumbering the
    /// index's positions through the returned remap.
    pub(crate) fn maybe_compact(&mut self) {
        if !self.store.needs_compaction() {
            return;
        }
        let before = self.store.slots_len();
        let tombstones = self.store.tombstones();
        let remap = self.store.compact();
        self.index.remap(&remap);
        log::debug!(
            "multidict compacted: {} slots -> {} ({} tombstones reclaimed, {} keys)",
            before,
            self.store.slots_len(),
            tombstones,
            self.index.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Identity hash; keys are small integers.
    fn push(t: &mut Table<u32, &'static str>, k: u32, v: &'static str) -> ChainKey {
        t.push(k, v, u64::from(k))
    }

    fn values(t: &Table<u32, &'static str>) -> Vec<&'static str> {
        t.store.iter().map(|(_, e)| e.value).collect()
    }

    #[test]
    fn push_links_duplicates_into_one_chain() {
        let mut t = Table::with_capacity(0);
        let a = push(&mut t, 1, "a1");
        push(&mut t, 2, "b");
        let a2 = push(&mut t, 1, "a2");
        assert_eq!(a, a2);
        assert_eq!(t.index[a].positions().len(), 2);
        assert_eq!(t.find_chain(1, &1u32), Some(a));
        assert_eq!(t.find_first(1, &1u32), Some(0));
        let all: Vec<_> = t.find_all(1, &1u32).unwrap().iter().copied().collect();
        assert_eq!(all, vec![0, 2]);
        assert_eq!(t.first_entry(a).value, "a1");
    }

    #[test]
    fn replace_in_chain_overwrites_head_and_drops_rest() {
        let mut t = Table::with_capacity(0);
        let a = push(&mut t, 1, "a1");
        push(&mut t, 2, "b");
        push(&mut t, 1, "a2");
        let (old, dropped) = t.replace_in_chain(a, "a9");
        assert_eq!(old, Some("a1"));
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].value, "a2");
        assert_eq!(values(&t), vec!["a9", "b"]);
        assert_eq!(t.index[a].positions().len(), 1);
    }

    #[test]
    fn pop_first_and_pop_last_keep_index_in_sync() {
        let mut t = Table::with_capacity(0);
        let a = push(&mut t, 1, "a1");
        push(&mut t, 2, "b");
        push(&mut t, 1, "a2");
        assert_eq!(t.pop_first(a).value, "a1");
        assert_eq!(t.first_entry(a).value, "a2");
        assert_eq!(t.pop_last().map(|e| e.value), Some("a2"));
        assert!(t.find_chain(1, &1u32).is_none());
        assert_eq!(t.pop_last().map(|e| e.value), Some("b"));
        assert!(t.pop_last().is_none());
        assert_eq!(t.index.len(), 0);
    }

    #[test]
    fn remove_chain_returns_entries_in_order() {
        let mut t = Table::with_capacity(0);
        let a = push(&mut t, 1, "a1");
        push(&mut t, 2, "b");
        push(&mut t, 1, "a2");
        let got: Vec<_> = t.remove_chain(a).into_iter().map(|e| e.value).collect();
        assert_eq!(got, vec!["a1", "a2"]);
        assert_eq!(values(&t), vec!["b"]);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn compaction_rewrites_positions_consistently() {
        let mut t = Table::with_capacity(0);
        let mut chains = Vec::new();
        for k in 0..12u32 {
            chains.push(push(&mut t, k % 3, "v"));
        }
        // Drop the head of key 0 four times: positions 0, 3, 6, 9.
        for _ in 0..4 {
            t.pop_first(chains[0]);
        }
        t.maybe_compact();
        assert_eq!(t.store.tombstones(), 0);
        for k in 1..3u32 {
            let ck = t.find_chain(u64::from(k), &k).unwrap();
            let positions: Vec<_> = t.index[ck].positions().iter().copied().collect();
            for &p in &positions {
                assert_eq!(t.store.get(p).map(|e| e.key), Some(k));
            }
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
        assert!(t.find_chain(0, &0u32).is_none());
    }
}
