//! Capability table for callers that hold containers type-erased.
//!
//! `MultiDictApi` bundles the mutation protocol as plain `fn` pointers over
//! `&dyn Any` receivers, so a plugin or foreign layer can drive a
//! `MultiDict<K, V, S>` without naming its type at every call site. Each
//! entry first downcasts its receiver; anything that is not a
//! `MultiDict<K, V, S>` fails with `Error::TypeMismatch` before the
//! container is touched. Values handed back are clones.

use crate::error::Error;
use crate::multi_dict::MultiDict;
use core::any::Any;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use std::collections::hash_map::RandomState;

const EXPECTED: &str = "MultiDict";

/// Pairs fed to the `update_from_*` entries.
pub type Pairs<'a, K, V> = &'a mut dyn Iterator<Item = (K, V)>;

/// Table of fn pointers that drives a boxed `MultiDict<K, V, S>` through `dyn Any`.
pub struct MultiDictApi<K, V, S = RandomState> {
    /// Box a fresh container with room for `prealloc` entries.
    pub new_dict: fn(usize) -> Box<dyn Any>,
    /// Whether a receiver is a `MultiDict<K, V, S>`.
    pub is_multidict: fn(&dyn Any) -> bool,
    pub add: fn(&mut dyn Any, K, V) -> Result<(), Error>,
    pub clear: fn(&mut dyn Any) -> Result<(), Error>,
    pub set_default: fn(&mut dyn Any, K, V) -> Result<V, Error>,
    pub del: fn(&mut dyn Any, &K) -> Result<(), Error>,
    pub version: fn(&dyn Any) -> Result<u64, Error>,
    pub contains: fn(&dyn Any, &K) -> Result<bool, Error>,
    pub get_one: fn(&dyn Any, &K) -> Result<V, Error>,
    pub get_all: fn(&dyn Any, &K) -> Result<Vec<V>, Error>,
    pub pop_one: fn(&mut dyn Any, &K) -> Result<V, Error>,
    pub pop_all: fn(&mut dyn Any, &K) -> Result<Vec<V>, Error>,
    pub pop_item: fn(&mut dyn Any) -> Result<(K, V), Error>,
    pub replace: fn(&mut dyn Any, K, V) -> Result<(), Error>,
    /// Both receivers are checked.
    pub update_from_multidict: fn(&mut dyn Any, &dyn Any, bool) -> Result<(), Error>,
    pub update_from_mapping: fn(&mut dyn Any, Pairs<'_, K, V>, bool) -> Result<(), Error>,
    pub update_from_sequence: fn(&mut dyn Any, Pairs<'_, K, V>, bool) -> Result<(), Error>,
    _hasher: PhantomData<fn() -> S>,
}

impl<K, V, S> MultiDictApi<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Default + 'static,
{
    pub fn new() -> Self {
        Self {
            new_dict: new_dict::<K, V, S>,
            is_multidict: is_multidict::<K, V, S>,
            add: add::<K, V, S>,
            clear: clear::<K, V, S>,
            set_default: set_default::<K, V, S>,
            del: del::<K, V, S>,
            version: version::<K, V, S>,
            contains: contains::<K, V, S>,
            get_one: get_one::<K, V, S>,
            get_all: get_all::<K, V, S>,
            pop_one: pop_one::<K, V, S>,
            pop_all: pop_all::<K, V, S>,
            pop_item: pop_item::<K, V, S>,
            replace: replace::<K, V, S>,
            update_from_multidict: update_from_multidict::<K, V, S>,
            update_from_mapping: update_from_mapping::<K, V, S>,
            update_from_sequence: update_from_sequence::<K, V, S>,
            _hasher: PhantomData,
        }
    }
}

impl<K, V, S> Default for MultiDictApi<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Default + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: every field is a fn pointer, whatever K, V and S are.
impl<K, V, S> Clone for MultiDictApi<K, V, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, S> Copy for MultiDictApi<K, V, S> {}

fn dict<K, V, S>(this: &dyn Any) -> Result<&MultiDict<K, V, S>, Error>
where
    K: 'static,
    V: 'static,
    S: 'static,
{
    this.downcast_ref()
        .ok_or(Error::TypeMismatch { expected: EXPECTED })
}

fn dict_mut<K, V, S>(this: &mut dyn Any) -> Result<&mut MultiDict<K, V, S>, Error>
where
    K: 'static,
    V: 'static,
    S: 'static,
{
    this.downcast_mut()
        .ok_or(Error::TypeMismatch { expected: EXPECTED })
}

fn new_dict<K, V, S>(prealloc: usize) -> Box<dyn Any>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + Default + 'static,
{
    Box::new(MultiDict::<K, V, S>::with_capacity_and_hasher(
        prealloc,
        S::default(),
    ))
}

fn is_multidict<K: 'static, V: 'static, S: 'static>(this: &dyn Any) -> bool {
    this.is::<MultiDict<K, V, S>>()
}

fn add<K, V, S>(this: &mut dyn Any, key: K, value: V) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.add(key, value);
    Ok(())
}

fn clear<K, V, S>(this: &mut dyn Any) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.clear();
    Ok(())
}

fn set_default<K, V, S>(this: &mut dyn Any, key: K, value: V) -> Result<V, Error>
where
    K: Eq + Hash + 'static,
    V: Clone + 'static,
    S: BuildHasher + 'static,
{
    Ok(dict_mut::<K, V, S>(this)?.set_default(key, value).clone())
}

fn del<K, V, S>(this: &mut dyn Any, key: &K) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.del(key)
}

fn version<K, V, S>(this: &dyn Any) -> Result<u64, Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    Ok(dict::<K, V, S>(this)?.version())
}

fn contains<K, V, S>(this: &dyn Any, key: &K) -> Result<bool, Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    Ok(dict::<K, V, S>(this)?.contains(key))
}

fn get_one<K, V, S>(this: &dyn Any, key: &K) -> Result<V, Error>
where
    K: Eq + Hash + 'static,
    V: Clone + 'static,
    S: BuildHasher + 'static,
{
    dict::<K, V, S>(this)?.get_one(key).cloned()
}

fn get_all<K, V, S>(this: &dyn Any, key: &K) -> Result<Vec<V>, Error>
where
    K: Eq + Hash + 'static,
    V: Clone + 'static,
    S: BuildHasher + 'static,
{
    Ok(dict::<K, V, S>(this)?.get_all(key)?.cloned().collect())
}

fn pop_one<K, V, S>(this: &mut dyn Any, key: &K) -> Result<V, Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.pop_one(key)
}

fn pop_all<K, V, S>(this: &mut dyn Any, key: &K) -> Result<Vec<V>, Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.pop_all(key)
}

fn pop_item<K, V, S>(this: &mut dyn Any) -> Result<(K, V), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.pop_item()
}

fn replace<K, V, S>(this: &mut dyn Any, key: K, value: V) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.replace(key, value);
    Ok(())
}

fn update_from_multidict<K, V, S>(
    this: &mut dyn Any,
    other: &dyn Any,
    extend: bool,
) -> Result<(), Error>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + 'static,
{
    let other = dict::<K, V, S>(other)?;
    dict_mut::<K, V, S>(this)?.update_from_multidict(other, extend);
    Ok(())
}

fn update_from_mapping<K, V, S>(
    this: &mut dyn Any,
    pairs: Pairs<'_, K, V>,
    extend: bool,
) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.update_from_mapping(pairs, extend);
    Ok(())
}

fn update_from_sequence<K, V, S>(
    this: &mut dyn Any,
    pairs: Pairs<'_, K, V>,
    extend: bool,
) -> Result<(), Error>
where
    K: Eq + Hash + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    dict_mut::<K, V, S>(this)?.update_from_sequence(pairs, extend);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type Api = MultiDictApi<String, i32>;

    fn mismatch() -> Error {
        Error::TypeMismatch {
            expected: "MultiDict",
        }
    }

    #[test]
    fn table_drives_a_boxed_container() {
        let api = Api::new();
        let mut d = (api.new_dict)(4);
        assert!((api.is_multidict)(&*d));
        (api.add)(&mut *d, "a".into(), 1).unwrap();
        (api.add)(&mut *d, "a".into(), 2).unwrap();
        assert_eq!((api.get_one)(&*d, &"a".into()), Ok(1));
        assert_eq!((api.get_all)(&*d, &"a".into()), Ok(vec![1, 2]));
        assert_eq!((api.set_default)(&mut *d, "b".into(), 3), Ok(3));
        assert_eq!((api.pop_item)(&mut *d), Ok(("b".to_string(), 3)));
        (api.replace)(&mut *d, "a".into(), 9).unwrap();
        assert_eq!((api.pop_all)(&mut *d, &"a".into()), Ok(vec![9]));
        assert_eq!((api.contains)(&*d, &"a".into()), Ok(false));

        let map = d.downcast_ref::<MultiDict<String, i32>>().unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn wrong_receiver_is_rejected_untouched() {
        let api = Api::new();
        let mut not_a_dict: Vec<(String, i32)> = vec![("a".into(), 1)];
        let recv: &mut dyn Any = &mut not_a_dict;
        assert!(!(api.is_multidict)(recv));
        assert_eq!((api.add)(recv, "b".into(), 2), Err(mismatch()));
        assert_eq!((api.version)(recv), Err(mismatch()));
        assert_eq!((api.pop_item)(recv), Err(mismatch()));
        assert_eq!((api.clear)(recv), Err(mismatch()));
        let mut pairs = vec![("c".to_string(), 3)].into_iter();
        assert_eq!((api.update_from_sequence)(recv, &mut pairs, false), Err(mismatch()));
        // The iterator was never consumed.
        assert_eq!(pairs.len(), 1);
        assert_eq!(not_a_dict, vec![("a".to_string(), 1)]);
    }

    #[test]
    fn container_with_other_type_parameters_is_rejected() {
        let api = Api::new();
        let mut d = MultiDict::<String, u8>::new();
        d.add("a".into(), 1);
        let v = d.version();
        assert_eq!((api.del)(&mut d, &"a".into()), Err(mismatch()));
        assert_eq!(d.version(), v);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn update_from_multidict_checks_both_receivers() {
        let api = Api::new();
        let mut d = (api.new_dict)(0);
        let other = (api.new_dict)(0);
        let bogus = 5u32;
        assert_eq!(
            (api.update_from_multidict)(&mut *d, &bogus, false),
            Err(mismatch())
        );
        let mut bogus_mut = 5u32;
        assert_eq!(
            (api.update_from_multidict)(&mut bogus_mut, &*other, false),
            Err(mismatch())
        );
        assert_eq!((api.update_from_multidict)(&mut *d, &*other, true), Ok(()));
    }

    #[test]
    fn update_variants_and_version() {
        let api = Api::new();
        let mut d = (api.new_dict)(0);
        let v0 = (api.version)(&*d).unwrap();
        let mut seq = vec![("a".to_string(), 1), ("a".to_string(), 2)].into_iter();
        (api.update_from_sequence)(&mut *d, &mut seq, true).unwrap();
        let v1 = (api.version)(&*d).unwrap();
        assert!(v1 > v0);
        let mut mapping = vec![("a".to_string(), 7)].into_iter();
        (api.update_from_mapping)(&mut *d, &mut mapping, false).unwrap();
        assert_eq!((api.get_all)(&*d, &"a".into()), Ok(vec![7]));
        assert_eq!((api.pop_one)(&mut *d, &"a".into()), Ok(7));
        assert_eq!((api.del)(&mut *d, &"a".into()), Err(Error::KeyNotFound));
        let mut src = MultiDict::<String, i32>::new();
        src.add("z".into(), 26);
        (api.update_from_multidict)(&mut *d, &src, false).unwrap();
        assert_eq!((api.get_one)(&*d, &"z".into()), Ok(26));
        (api.clear)(&mut *d).unwrap();
        assert_eq!((api.pop_item)(&mut *d), Err(Error::EmptyContainer));
    }

    #[test]
    fn table_is_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<MultiDictApi<String, i32>>();
        let api = Api::default();
        let copy = api;
        let d = (copy.new_dict)(0);
        assert!((api.is_multidict)(&*d));
    }
}
