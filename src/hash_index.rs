//! HashIndex: hash table from key hash to same-key chains of store positions.
//!
//! The table holds one `ChainKey` per distinct live key; the chain itself
//! lives in a `SlotMap` and lists every live position of that key in
//! insertion order. Entries in the store carry their `ChainKey`, so
//! unlinking a position never searches the table or calls `K: Eq`.
//!
//! The index never sees keys. Callers pass an `is_match(position)` closure
//! that compares the key stored at a position against the lookup key; the
//! cached hash is checked first, so unequal keys sharing a bucket are never
//! treated as matches.

use crate::error::Error;
use core::ops::Index;
use hashbrown::HashTable;
use slotmap::SlotMap;
use std::collections::VecDeque;

slotmap::new_key_type! {
    /// Stable handle to one same-key chain.
    pub(crate) struct ChainKey;
}

#[derive(Debug, Clone)]
pub(crate) struct Chain {
    hash: u64,
    /// Live positions, strictly increasing. Never empty while linked.
    positions: VecDeque<usize>,
}

impl Chain {
    #[inline]
    pub(crate) fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub(crate) fn first(&self) -> usize {
        self.positions[0]
    }

    #[cfg(test)]
    pub(crate) fn positions(&self) -> &VecDeque<usize> {
        &self.positions
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HashIndex {
    table: HashTable<ChainKey>,
    chains: SlotMap<ChainKey, Chain>,
}

impl HashIndex {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            chains: SlotMap::with_capacity_and_key(capacity),
        }
    }

    /// Number of distinct live keys.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.chains.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Reserve room for `additional` new distinct keys.
    /// Chains are reserved first; a failure there leaves the table alone.
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.chains.try_reserve(additional)?;
        let chains = &self.chains;
        self.table
            .try_reserve(additional, |&ck| chains[ck].hash)?;
        Ok(())
    }

    /// Chain whose key matches, if any.
    pub(crate) fn find_chain(
        &self,
        hash: u64,
        mut is_match: impl FnMut(usize) -> bool,
    ) -> Option<ChainKey> {
        self.table
            .find(hash, |&ck| {
                let chain = &self.chains[ck];
                chain.hash == hash && is_match(chain.first())
            })
            .copied()
    }

    /// Earliest live position with a matching key.
    pub(crate) fn find_first(&self, hash: u64, is_match: impl FnMut(usize) -> bool) -> Option<usize> {
        self.find_chain(hash, is_match)
            .map(|ck| self.chains[ck].first())
    }

    /// All live positions with a matching key, in insertion order.
    pub(crate) fn find_all(
        &self,
        hash: u64,
        is_match: impl FnMut(usize) -> bool,
    ) -> Option<&VecDeque<usize>> {
        self.find_chain(hash, is_match)
            .map(|ck| &self.chains[ck].positions)
    }

    /// Link `pos` after every earlier position of the same key.
    ///
    /// `pos` must be greater than every position already linked, which the
    /// append-only store guarantees.
    pub(crate) fn insert(
        &mut self,
        hash: u64,
        pos: usize,
        is_match: impl FnMut(usize) -> bool,
    ) -> ChainKey {
        if let Some(ck) = self.find_chain(hash, is_match) {
            let chain = &mut self.chains[ck];
            debug_assert!(chain.positions.back().map_or(true, |&last| last < pos));
            chain.positions.push_back(pos);
            return ck;
        }
        self.insert_new_chain(hash, pos)
    }

    /// Start a chain for a key known to be absent.
    pub(crate) fn insert_new_chain(&mut self, hash: u64, pos: usize) -> ChainKey {
        let ck = self.chains.insert(Chain {
            hash,
            positions: VecDeque::from([pos]),
        });
        let chains = &self.chains;
        self.table.insert_unique(hash, ck, |&k| chains[k].hash);
        ck
    }

    /// Unlink one position from its chain, dropping the chain once empty.
    /// Returns true if the chain was dropped.
    pub(crate) fn remove(&mut self, ck: ChainKey, pos: usize) -> bool {
        let chain = &mut self.chains[ck];
        if chain.positions.front() == Some(&pos) {
            chain.positions.pop_front();
        } else if chain.positions.back() == Some(&pos) {
            chain.positions.pop_back();
        } else if let Ok(i) = chain.positions.binary_search(&pos) {
            chain.positions.remove(i);
        } else {
            debug_assert!(false, "position {pos} is not linked in its chain");
            return false;
        }
        if chain.positions.is_empty() {
            self.remove_chain(ck);
            true
        } else {
            false
        }
    }

    /// Unlink a whole chain and return its positions in insertion order.
    pub(crate) fn remove_chain(&mut self, ck: ChainKey) -> VecDeque<usize> {
        let chain = self
            .chains
            .remove(ck)
            .expect("chain key must be live when removed");
        if let Ok(slot) = self.table.find_entry(chain.hash, |&k| k == ck) {
            slot.remove();
        }
        chain.positions
    }

    /// Keep only the first position of a chain; return the others in order.
    pub(crate) fn truncate_to_first(&mut self, ck: ChainKey) -> VecDeque<usize> {
        self.chains[ck].positions.split_off(1)
    }

    /// Rewrite every linked position after store compaction.
    ///
    /// `remap` is indexed by old position and strictly increasing over live
    /// slots, so chain order survives unchanged and no bucket moves.
    pub(crate) fn remap(&mut self, remap: &[Option<usize>]) {
        for chain in self.chains.values_mut() {
            for pos in chain.positions.iter_mut() {
                *pos = remap[*pos].expect("linked position must be live in the store");
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
        self.chains.clear();
    }
}

impl Index<ChainKey> for HashIndex {
    type Output = Chain;

    #[inline]
    fn index(&self, ck: ChainKey) -> &Chain {
        &self.chains[ck]
    }
}
