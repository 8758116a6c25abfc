#![cfg(test)]

// Property tests for MultiDict kept inside the crate so the model check can
// also look at the store's tombstone bookkeeping.

use crate::{Error, MultiDict};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Add(usize, i32),
    SetDefault(usize, i32),
    Replace(usize, i32),
    Del(usize),
    PopOne(usize),
    PopAll(usize),
    PopItem,
    GetOne(usize),
    GetAll(usize),
    Contains(String),
    Update(Vec<(usize, i32)>, bool),
    Clear,
    Cursor,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,3}", 1..=6).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Add(i, v)),
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::SetDefault(i, v)),
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Replace(i, v)),
            idx.clone().prop_map(OpI::Del),
            idx.clone().prop_map(OpI::PopOne),
            idx.clone().prop_map(OpI::PopAll),
            Just(OpI::PopItem),
            idx.clone().prop_map(OpI::GetOne),
            idx.clone().prop_map(OpI::GetAll),
            prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,3}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            (
                proptest::collection::vec((idx.clone(), any::<i32>()), 0..5),
                any::<bool>()
            )
                .prop_map(|(pairs, extend)| OpI::Update(pairs, extend)),
            Just(OpI::Clear),
            Just(OpI::Cursor),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Reference model: a plain vector of live pairs in insertion order.
#[derive(Default)]
struct Model {
    pairs: Vec<(Key, i32)>,
}

impl Model {
    fn values(&self, k: &Key) -> Vec<i32> {
        self.pairs
            .iter()
            .filter(|(kk, _)| kk == k)
            .map(|&(_, v)| v)
            .collect()
    }

    fn first(&self, k: &Key) -> Option<usize> {
        self.pairs.iter().position(|(kk, _)| kk == k)
    }

    fn remove_all(&mut self, k: &Key) -> Vec<i32> {
        let out = self.values(k);
        self.pairs.retain(|(kk, _)| kk != k);
        out
    }

    fn replace(&mut self, k: Key, v: i32) {
        match self.first(&k) {
            Some(i) => {
                self.pairs[i].1 = v;
                let mut seen = 0;
                self.pairs.retain(|(kk, _)| {
                    if *kk != k {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.pairs.push((k, v)),
        }
    }

    fn update(&mut self, incoming: Vec<(Key, i32)>, extend: bool) {
        if extend {
            self.pairs.extend(incoming);
            return;
        }
        let mut touched = BTreeSet::new();
        let mut deferred = Vec::new();
        for (k, v) in incoming {
            if touched.contains(&k) {
                deferred.push((k, v));
            } else {
                touched.insert(k.clone());
                self.replace(k, v);
            }
        }
        self.pairs.extend(deferred);
    }
}

// Property: state-machine equivalence against an ordered Vec model.
// Invariants exercised across random operation sequences:
// - Full traversal order equals the model after every operation.
// - `get_one`/`get_all` return the first/all values of a key in order.
// - Removals report KeyNotFound/EmptyContainer exactly when the model does.
// - The version strictly increases on every structural change and is left
//   alone by reads and failed removals.
// - A cursor taken before a structural change fails on its next step.
// - The store never keeps a third or more of its slots dead.
fn run_state_machine<S>(
    mut sut: MultiDict<Key, i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model = Model::default();
    for op in ops {
        let before = sut.version();
        let mut cursor = sut.cursor();
        let changed = match op {
            OpI::Add(i, v) => {
                let k = key_from(pool, i);
                sut.add(k.clone(), v);
                model.pairs.push((k, v));
                true
            }
            OpI::SetDefault(i, v) => {
                let k = key_from(pool, i);
                let got = *sut.set_default(k.clone(), v);
                match model.first(&k) {
                    Some(at) => {
                        prop_assert_eq!(got, model.pairs[at].1);
                        false
                    }
                    None => {
                        prop_assert_eq!(got, v);
                        model.pairs.push((k, v));
                        true
                    }
                }
            }
            OpI::Replace(i, v) => {
                let k = key_from(pool, i);
                sut.replace(k.clone(), v);
                model.replace(k, v);
                true
            }
            OpI::Del(i) => {
                let k = key_from(pool, i);
                let removed = model.remove_all(&k);
                let res = sut.del(&k);
                if removed.is_empty() {
                    prop_assert_eq!(res, Err(Error::KeyNotFound));
                    false
                } else {
                    prop_assert_eq!(res, Ok(()));
                    true
                }
            }
            OpI::PopOne(i) => {
                let k = key_from(pool, i);
                let res = sut.pop_one(&k);
                match model.first(&k) {
                    Some(at) => {
                        let (_, v) = model.pairs.remove(at);
                        prop_assert_eq!(res, Ok(v));
                        true
                    }
                    None => {
                        prop_assert_eq!(res, Err(Error::KeyNotFound));
                        false
                    }
                }
            }
            OpI::PopAll(i) => {
                let k = key_from(pool, i);
                let removed = model.remove_all(&k);
                let res = sut.pop_all(&k);
                if removed.is_empty() {
                    prop_assert_eq!(res, Err(Error::KeyNotFound));
                    false
                } else {
                    prop_assert_eq!(res, Ok(removed));
                    true
                }
            }
            OpI::PopItem => {
                let res = sut.pop_item();
                match model.pairs.pop() {
                    Some(pair) => {
                        prop_assert_eq!(res, Ok(pair));
                        true
                    }
                    None => {
                        prop_assert_eq!(res, Err(Error::EmptyContainer));
                        false
                    }
                }
            }
            OpI::GetOne(i) => {
                let k = key_from(pool, i);
                let expected = model.first(&k).map(|at| model.pairs[at].1);
                prop_assert_eq!(sut.get_one(&k).ok().copied(), expected);
                prop_assert_eq!(sut.get(k.0.as_str()).copied(), expected);
                false
            }
            OpI::GetAll(i) => {
                let k = key_from(pool, i);
                let expected = model.values(&k);
                match sut.get_all(&k) {
                    Ok(all) => {
                        prop_assert_eq!(all.len(), expected.len());
                        prop_assert_eq!(all.copied().collect::<Vec<_>>(), expected);
                    }
                    Err(e) => {
                        prop_assert_eq!(e, Error::KeyNotFound);
                        prop_assert!(expected.is_empty());
                    }
                }
                false
            }
            OpI::Contains(s) => {
                let has_model = model.pairs.iter().any(|(k, _)| k.0 == s);
                prop_assert_eq!(sut.contains(s.as_str()), has_model);
                false
            }
            OpI::Update(idx_pairs, extend) => {
                let incoming: Vec<(Key, i32)> = idx_pairs
                    .into_iter()
                    .map(|(i, v)| (key_from(pool, i), v))
                    .collect();
                let non_empty = !incoming.is_empty();
                sut.update_from_sequence(incoming.clone(), extend);
                model.update(incoming, extend);
                non_empty
            }
            OpI::Clear => {
                sut.clear();
                model.pairs.clear();
                true
            }
            OpI::Cursor => {
                let mut seen = Vec::new();
                while let Some((k, v)) = cursor
                    .next(&sut)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?
                {
                    seen.push((k.clone(), *v));
                }
                prop_assert_eq!(&seen, &model.pairs);
                false
            }
        };

        // Post-conditions after each op
        // 1) Version moves exactly on structural change
        if changed {
            prop_assert!(sut.version() > before, "structural change must bump the version");
            prop_assert_eq!(cursor.next(&sut), Err(Error::ConcurrentModification));
        } else {
            prop_assert_eq!(sut.version(), before, "reads and failed removals keep the version");
        }
        // 2) Order and size parity
        let got: Vec<(Key, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(&got, &model.pairs);
        prop_assert_eq!(sut.len(), model.pairs.len());
        prop_assert_eq!(sut.is_empty(), model.pairs.is_empty());
        // 3) Compaction keeps dead slots bounded
        let store = &sut.table.store;
        prop_assert!(!store.needs_compaction(), "store left with too many tombstones");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_state_machine(MultiDict::new(), &pool, ops)?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
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

// Property: Same state-machine invariants as above, under worst-case
// collision behavior (constant hasher). Every key shares one bucket, so
// chains are told apart by `K: Eq` alone.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_state_machine(MultiDict::with_hasher(ConstBuildHasher), &pool, ops)?;
    }
}
