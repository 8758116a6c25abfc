//! Bulk merges into a `MultiDict`.
//!
//! With `extend == true` every incoming pair is appended, exactly like a run
//! of `add` calls. With `extend == false` the merge works per key:
//!
//! - the first incoming pair for a key already present overwrites the value
//!   of that key's first entry in place and removes its later duplicates;
//! - the first incoming pair for an absent key is appended;
//! - any further incoming pair for a key handled earlier in the same call is
//!   held back and appended, in incoming order, after the whole source has
//!   been consumed.
//!
//! So `{a: 1, b: 2}` updated with `[(a, 9), (a, 10), (c, 3)]` becomes
//! `[a: 9, b: 2, c: 3, a: 10]`.
//!
//! Whatever the mode, a call with a non-empty source changes the version
//! exactly once, before the first pair lands, and compaction runs at most
//! once, after the merge.

use crate::entry_store::Entry;
use crate::hash_index::ChainKey;
use crate::multi_dict::MultiDict;
use crate::version;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashSet;

/// Incoming keys, old values and removed entries a merge displaced. They
/// are dropped once the map is consistent and the guard released.
type Leftovers<K, V> = (Vec<K>, Vec<V>, Vec<Entry<K, V>>);

impl<K, V, S> MultiDict<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Merge the entries of `other`, in its order. Keys and values are
    /// cloned; `other` is left untouched.
    pub fn update_from_multidict<S2>(&mut self, other: &MultiDict<K, V, S2>, extend: bool)
    where
        K: Clone,
        V: Clone,
        S2: BuildHasher,
    {
        self.merge(other.iter().map(|(k, v)| (k.clone(), v.clone())), extend);
    }

    /// Merge a source holding at most one value per key, such as a
    /// `HashMap` or `BTreeMap`.
    pub fn update_from_mapping<I>(&mut self, mapping: I, extend: bool)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.merge(mapping.into_iter(), extend);
    }

    /// Merge an ordered sequence of pairs; duplicate keys are allowed and
    /// processed in order.
    pub fn update_from_sequence<I>(&mut self, pairs: I, extend: bool)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.merge(pairs.into_iter(), extend);
    }

    fn merge<I>(&mut self, pairs: I, extend: bool)
    where
        I: Iterator<Item = (K, V)>,
    {
        let leftovers = {
            let _g = self.reentrancy.enter();
            let mut leftovers: Leftovers<K, V> = (Vec::new(), Vec::new(), Vec::new());
            let mut merged = 0usize;
            if extend {
                for (key, value) in pairs {
                    if merged == 0 {
                        self.version = version::next();
                    }
                    merged += 1;
                    let hash = self.make_hash(&key);
                    self.table.push(key, value, hash);
                }
            } else {
                let mut touched: HashSet<ChainKey> = HashSet::new();
                let mut deferred: Vec<(K, V, u64)> = Vec::new();
                for (key, value) in pairs {
                    // Bump before touching the table so a panic in the source
                    // or in `K: Hash`/`K: Eq` still invalidates cursors.
                    if merged == 0 {
                        self.version = version::next();
                    }
                    merged += 1;
                    let hash = self.make_hash(&key);
                    match self.table.find_chain(hash, &key) {
                        Some(ck) if touched.contains(&ck) => deferred.push((key, value, hash)),
                        Some(ck) => {
                            let (old, dropped) = self.table.replace_in_chain(ck, value);
                            touched.insert(ck);
                            leftovers.0.push(key);
                            leftovers.1.extend(old);
                            leftovers.2.extend(dropped);
                        }
                        None => {
                            touched.insert(self.table.push(key, value, hash));
                        }
                    }
                }
                for (key, value, hash) in deferred {
                    self.table.push(key, value, hash);
                }
            }
            if merged > 0 {
                self.table.maybe_compact();
                log::trace!(
                    "multidict merged {} pairs (extend: {}, {} entries removed)",
                    merged,
                    extend,
                    leftovers.2.len()
                );
            }
            leftovers
        };
        drop(leftovers);
    }
}
