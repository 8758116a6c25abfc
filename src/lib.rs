//! multidict: an ordered hash map that keeps every value added under a key.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: dictionary-style lookup plus list-style "all values for this
//!   key" semantics, with one global insertion order across all keys
//!   (HTTP headers, query strings).
//! - Layers:
//!   - EntryStore<K, V>: append-only `Vec` of slots, live or tombstoned.
//!     The single definition of iteration order.
//!   - HashIndex: `hashbrown::HashTable` from key hash to a same-key chain
//!     (a `VecDeque` of store positions in insertion order). Chains live in
//!     a `SlotMap` so entries can point back at theirs.
//!   - Table<K, V>: store and index updated in lockstep; hands removed
//!     entries back instead of dropping them.
//!   - MultiDict<K, V, S>: public API; owns the hasher, the version and a
//!     debug-only reentrancy guard.
//!
//! Constraints
//! - Single owner: `Send` when `K`, `V`, `S` are, never `Sync`.
//! - O(1) average for single-key access, O(k) for k duplicates of one key;
//!   `get_all`/`pop_all`/`replace` walk the chain, never the whole store.
//! - Removal tombstones a slot. Once a third of the store is dead (and
//!   it holds at least 8 slots) the store is rewritten densely and the
//!   index renumbered through a monotonic remap, so chain order survives.
//!
//! Versions
//! - Every structural change takes a fresh value from one process-wide
//!   counter: `add`, `replace`, successful removals, `clear`, non-empty
//!   updates, and `set_default` when it inserts. Reads never change it.
//! - `Cursor` captures the version and fails with
//!   `Error::ConcurrentModification` once it differs. Borrowing iterators
//!   need no check; the borrow checker already excludes mutation.
//!
//! Hasher and rehashing invariants
//! - Each entry caches `S::hash_one(key)` and its chain caches the same
//!   value; growth and compaction use the cached hash and never call
//!   `K: Hash` again. A match needs equal hashes and `K: Eq`.
//!
//! Reentrancy
//! - User code (`K: Hash`, `K: Eq`) runs only inside the guarded section of
//!   a public method. Removed keys and values are dropped after the guard
//!   is released and the structure is consistent again.
//!
//! Allocation failure
//! - `add` and friends abort on allocation failure like `Vec::push`.
//!   `try_reserve`/`try_add` report `Error::OutOfMemory` instead and leave
//!   the map untouched.

pub mod api;
mod entry_store;
mod error;
mod hash_index;
mod iter;
mod multi_dict;
mod multi_dict_proptest;
mod reentrancy;
mod table;
mod update;
mod version;

// Public surface
pub use api::MultiDictApi;
pub use error::Error;
pub use iter::{Cursor, GetAll, IntoIter, Iter, Keys, Values};
pub use multi_dict::MultiDict;
