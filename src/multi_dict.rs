//! MultiDict: ordered multi-valued map over a `Table` of entries.
//!
//! Every public method takes the reentrancy guard before calling user
//! `Hash`/`Eq` code and releases it before dropping removed keys/values, so
//! a `Drop` impl may safely touch the map again through other means.

use crate::entry_store::Entry;
use crate::error::Error;
use crate::iter::{Cursor, GetAll, IntoIter, Iter, Keys, Values};
use crate::reentrancy::DebugReentrancy;
use crate::table::Table;
use crate::version;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// An ordered hash map that keeps every value added under the same key.
///
/// Iteration follows global insertion order across all keys. Lookups by key
/// are O(1) on average and walk duplicates of one key in insertion order
/// without scanning unrelated entries.
pub struct MultiDict<K, V, S = RandomState> {
    pub(crate) hasher: S,
    pub(crate) table: Table<K, V>,
    pub(crate) version: u64,
    pub(crate) reentrancy: DebugReentrancy,
}

impl<K, V> MultiDict<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, Default::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, Default::default())
    }
}

impl<K, V> Default for MultiDict<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> MultiDict<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            table: Table::with_capacity(capacity),
            version: version::next(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Number of live entries, counting every duplicate.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Entries the store can hold before it must grow.
    pub fn capacity(&self) -> usize {
        self.table.store.capacity()
    }

    /// Current version. Changes on every structural mutation and never
    /// repeats, within this map or across maps.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Reserve room for `additional` more entries.
    ///
    /// On failure nothing observable changes and `Error::OutOfMemory` is
    /// returned.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let _g = self.reentrancy.enter();
        self.table.try_reserve(additional)?;
        log::trace!(
            "multidict reserved {} entries (store capacity {}, index capacity {})",
            additional,
            self.table.store.capacity(),
            self.table.index.capacity()
        );
        Ok(())
    }

    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.table.find_chain(self.make_hash(q), q).is_some()
    }

    /// First value added under `q`.
    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let pos = self.table.find_first(self.make_hash(q), q)?;
        self.table.store.get(pos).map(|e| &e.value)
    }

    /// First value added under `q`, or `KeyNotFound`.
    pub fn get_one<Q>(&self, q: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(Error::KeyNotFound)
    }

    /// Every value added under `q`, in insertion order.
    pub fn get_all<Q>(&self, q: &Q) -> Result<GetAll<'_, K, V>, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let positions = self
            .table
            .find_all(self.make_hash(q), q)
            .ok_or(Error::KeyNotFound)?;
        Ok(GetAll::new(&self.table.store, positions))
    }

    /// Append `value` under `key`, even if `key` is already present.
    pub fn add(&mut self, key: K, value: V) {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        self.table.push(key, value, hash);
        self.version = version::next();
    }

    /// Like `add`, but reports allocation failure instead of aborting.
    /// A failed call leaves the map and its version untouched.
    pub fn try_add(&mut self, key: K, value: V) -> Result<(), Error> {
        self.try_reserve(1)?;
        self.add(key, value);
        Ok(())
    }

    /// Return the first value under `key`, adding `value` first if absent.
    ///
    /// The version changes only when an entry was added.
    pub fn set_default(&mut self, key: K, value: V) -> &V {
        let ck = {
            let _g = self.reentrancy.enter();
            let hash = self.make_hash(&key);
            match self.table.find_chain(hash, &key) {
                Some(ck) => ck,
                None => {
                    let ck = self.table.push(key, value, hash);
                    self.version = version::next();
                    ck
                }
            }
        };
        &self.table.first_entry(ck).value
    }

    /// Overwrite the first value under `key` in place and remove every later
    /// duplicate; append if `key` is absent. Always changes the version.
    pub fn replace(&mut self, key: K, value: V) {
        let displaced = {
            let _g = self.reentrancy.enter();
            let hash = self.make_hash(&key);
            let displaced = match self.table.find_chain(hash, &key) {
                Some(ck) => self.table.replace_in_chain(ck, value),
                None => {
                    self.table.push(key, value, hash);
                    (None, Vec::new())
                }
            };
            self.version = version::next();
            self.table.maybe_compact();
            displaced
        };
        drop(displaced);
    }

    /// Remove every entry under `q`.
    pub fn del<Q>(&mut self, q: &Q) -> Result<(), Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = self.remove_all(q)?;
        drop(removed);
        Ok(())
    }

    /// Remove and return the first value under `q`; later duplicates stay.
    pub fn pop_one<Q>(&mut self, q: &Q) -> Result<V, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let entry = {
            let _g = self.reentrancy.enter();
            let ck = self
                .table
                .find_chain(self.make_hash(q), q)
                .ok_or(Error::KeyNotFound)?;
            let entry = self.table.pop_first(ck);
            self.version = version::next();
            self.table.maybe_compact();
            entry
        };
        Ok(entry.value)
    }

    /// Remove and return every value under `q`, in insertion order.
    pub fn pop_all<Q>(&mut self, q: &Q) -> Result<Vec<V>, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = self.remove_all(q)?;
        Ok(removed.into_iter().map(|e| e.value).collect())
    }

    /// Remove and return the most recently added live entry.
    pub fn pop_item(&mut self) -> Result<(K, V), Error> {
        let entry = {
            let _g = self.reentrancy.enter();
            let entry = self.table.pop_last().ok_or(Error::EmptyContainer)?;
            self.version = version::next();
            self.table.maybe_compact();
            entry
        };
        Ok((entry.key, entry.value))
    }

    /// Remove everything. Always changes the version, even when empty.
    pub fn clear(&mut self) {
        let removed = {
            let _g = self.reentrancy.enter();
            let removed = self.table.take_all();
            self.version = version::next();
            log::debug!("multidict cleared ({} entries dropped)", removed.len());
            removed
        };
        drop(removed);
    }

    /// Unlink every entry under `q`; the caller drops them unguarded.
    fn remove_all<Q>(&mut self, q: &Q) -> Result<Vec<Entry<K, V>>, Error>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let ck = self
            .table
            .find_chain(self.make_hash(q), q)
            .ok_or(Error::KeyNotFound)?;
        let removed = self.table.remove_chain(ck);
        self.version = version::next();
        self.table.maybe_compact();
        Ok(removed)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.table.store)
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    /// A borrow-free cursor positioned before the first entry.
    ///
    /// Advancing it with `Cursor::next` fails with
    /// `Error::ConcurrentModification` once the map has changed structurally.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.version)
    }
}

impl<K, V, S> Clone for MultiDict<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            table: self.table.clone(),
            version: version::next(),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

impl<K, V, S> fmt::Debug for MultiDict<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.table.store.iter().map(|(_, e)| (&e.key, &e.value)))
            .finish()
    }
}

/// Two maps are equal when they hold the same pairs in the same order.
impl<K, V, S1, S2> PartialEq<MultiDict<K, V, S2>> for MultiDict<K, V, S1>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &MultiDict<K, V, S2>) -> bool {
        self.table.len() == other.table.len()
            && self
                .table
                .store
                .iter()
                .zip(other.table.store.iter())
                .all(|((_, a), (_, b))| a.key == b.key && a.value == b.value)
    }
}

impl<K: Eq, V: Eq, S> Eq for MultiDict<K, V, S> {}

impl<K, V, S> FromIterator<(K, V)> for MultiDict<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        map.extend(iter);
        map
    }
}

/// Extending is a run of `add` calls with a single version change.
impl<K, V, S> Extend<(K, V)> for MultiDict<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.update_from_sequence(iter, true);
    }
}

impl<'a, K, V, S> IntoIterator for &'a MultiDict<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> IntoIterator for MultiDict<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self.table.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hasher;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        }
    }

    fn pairs<S: BuildHasher>(m: &MultiDict<&'static str, i32, S>) -> Vec<(&'static str, i32)> {
        m.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn duplicates_are_kept_in_order() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("b", 2);
        m.add("a", 3);
        assert_eq!(m.len(), 3);
        assert_eq!(m.get_one("a"), Ok(&1));
        assert_eq!(m.get_all("a").unwrap().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(pairs(&m), vec![("a", 1), ("b", 2), ("a", 3)]);
    }

    #[test]
    fn missing_keys_report_key_not_found() {
        let mut m: MultiDict<&str, i32> = MultiDict::new();
        assert_eq!(m.get_one("x"), Err(Error::KeyNotFound));
        assert!(matches!(m.get_all("x"), Err(Error::KeyNotFound)));
        assert_eq!(m.del("x"), Err(Error::KeyNotFound));
        assert_eq!(m.pop_one("x"), Err(Error::KeyNotFound));
        assert_eq!(m.pop_all("x"), Err(Error::KeyNotFound));
        assert_eq!(m.pop_item(), Err(Error::EmptyContainer));
    }

    #[test]
    fn failed_removals_keep_the_version() {
        let mut m: MultiDict<&str, i32> = MultiDict::new();
        m.add("a", 1);
        let v = m.version();
        let _ = m.del("x");
        let _ = m.pop_one("x");
        let _ = m.pop_all("x");
        assert_eq!(m.version(), v);
        m.clear();
        let v = m.version();
        let _ = m.pop_item();
        assert_eq!(m.version(), v);
    }

    #[test]
    fn set_default_inserts_once() {
        let mut m = MultiDict::new();
        let v0 = m.version();
        assert_eq!(*m.set_default("a", 1), 1);
        let v1 = m.version();
        assert!(v1 > v0);
        assert_eq!(*m.set_default("a", 2), 1);
        assert_eq!(m.version(), v1, "no-op set_default keeps the version");
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn replace_keeps_first_position_and_drops_duplicates() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("b", 2);
        m.add("a", 3);
        m.add("c", 4);
        m.replace("a", 9);
        assert_eq!(pairs(&m), vec![("a", 9), ("b", 2), ("c", 4)]);
        m.replace("d", 5);
        assert_eq!(pairs(&m), vec![("a", 9), ("b", 2), ("c", 4), ("d", 5)]);
    }

    #[test]
    fn replace_always_bumps_version() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        let v = m.version();
        m.replace("a", 1);
        assert!(m.version() > v);
    }

    #[test]
    fn pop_one_leaves_later_duplicates() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("a", 2);
        assert_eq!(m.pop_one("a"), Ok(1));
        assert_eq!(m.get_all("a").unwrap().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(m.pop_one("a"), Ok(2));
        assert!(!m.contains("a"));
    }

    #[test]
    fn pop_all_and_del_remove_every_duplicate() {
        let mut m = MultiDict::new();
        for (k, v) in [("a", 1), ("b", 2), ("a", 3), ("a", 4)] {
            m.add(k, v);
        }
        assert_eq!(m.pop_all("a"), Ok(vec![1, 3, 4]));
        assert_eq!(pairs(&m), vec![("b", 2)]);
        m.add("b", 5);
        m.del("b").unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn pop_item_is_lifo() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("b", 2);
        assert_eq!(m.pop_item(), Ok(("b", 2)));
        assert_eq!(m.pop_item(), Ok(("a", 1)));
        assert_eq!(m.pop_item(), Err(Error::EmptyContainer));
    }

    #[test]
    fn pop_item_skips_entries_removed_elsewhere() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("b", 2);
        m.add("c", 3);
        m.del("b").unwrap();
        assert_eq!(m.pop_item(), Ok(("c", 3)));
        assert_eq!(m.pop_item(), Ok(("a", 1)));
    }

    #[test]
    fn clear_resets_and_bumps_once() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("a", 2);
        let v = m.version();
        m.clear();
        assert!(m.version() > v);
        assert!(m.is_empty());
        assert!(!m.contains("a"));
        m.add("a", 3);
        assert_eq!(pairs(&m), vec![("a", 3)]);
    }

    #[test]
    fn compaction_keeps_order_and_lookups() {
        let mut m = MultiDict::new();
        for i in 0..64 {
            m.add(if i % 2 == 0 { "even" } else { "odd" }, i);
        }
        for _ in 0..21 {
            m.pop_one("even").unwrap();
        }
        assert_eq!(m.table.store.tombstones(), 21, "below one third, nothing moves");
        m.pop_one("even").unwrap();
        // 22 of 64 slots dead crosses the one-third threshold.
        assert_eq!(m.table.store.tombstones(), 0, "store was compacted");
        assert_eq!(m.len(), 42);
        let evens: Vec<_> = m.get_all("even").unwrap().copied().collect();
        assert_eq!(evens, (44..64).step_by(2).collect::<Vec<_>>());
        let order: Vec<_> = m.values().copied().collect();
        let expected: Vec<i32> = (0..64).filter(|i| i % 2 == 1 || *i >= 44).collect();
        assert_eq!(order, expected);
        assert_eq!(m.pop_item(), Ok(("odd", 63)));
    }

    #[test]
    fn constant_hasher_resolves_by_equality() {
        let mut m: MultiDict<&str, i32, ConstBuildHasher> = MultiDict::with_hasher(ConstBuildHasher);
        m.add("a", 1);
        m.add("b", 2);
        m.add("a", 3);
        assert_eq!(m.get_all("a").unwrap().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(m.get_one("b"), Ok(&2));
        m.replace("a", 7);
        assert_eq!(pairs(&m), vec![("a", 7), ("b", 2)]);
        assert_eq!(m.pop_all("b"), Ok(vec![2]));
        assert!(!m.contains("b"));
        assert!(m.contains("a"));
    }

    #[test]
    fn borrowed_lookup_with_str() {
        let mut m: MultiDict<String, i32> = MultiDict::new();
        m.add("hello".to_string(), 1);
        assert!(m.contains("hello"));
        assert_eq!(m.get("hello"), Some(&1));
        assert_eq!(m.get("world"), None);
    }

    #[test]
    fn try_add_failure_is_invisible() {
        let mut m: MultiDict<&str, i32> = MultiDict::new();
        m.add("a", 1);
        let v = m.version();
        assert_eq!(m.try_reserve(usize::MAX), Err(Error::OutOfMemory));
        assert_eq!(m.version(), v);
        assert_eq!(pairs(&m), vec![("a", 1)]);
        m.try_add("b", 2).unwrap();
        assert_eq!(pairs(&m), vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn clone_is_equal_but_has_its_own_version() {
        let mut m = MultiDict::new();
        m.add("a", 1);
        m.add("a", 2);
        let c = m.clone();
        assert_eq!(c, m);
        assert_ne!(c.version(), m.version());
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a: MultiDict<_, _> = [("a", 1), ("b", 2)].into_iter().collect();
        let b: MultiDict<_, _> = [("b", 2), ("a", 1)].into_iter().collect();
        assert_ne!(a, b);
    }

    #[test]
    fn debug_lists_pairs_in_order() {
        let m: MultiDict<_, _> = [("a", 1), ("b", 2), ("a", 3)].into_iter().collect();
        assert_eq!(format!("{:?}", m), r#"{"a": 1, "b": 2, "a": 3}"#);
    }
}
