// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! a dense map keyed by SPIR-V ids that grows as ids are allocated

use spirv_ir::{ModuleHeader, Word};
use std::borrow::Borrow;
use std::convert::TryFrom;
use std::fmt;
use std::iter;
use std::marker::PhantomData;
use std::mem;
use std::slice;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct IdOutOfBounds;

impl fmt::Display for IdOutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad("SPIR-V Id is out of bounds")
    }
}

/// a key usable in an `IdMap`
pub trait Id: Copy + Eq + 'static {
    fn map_index(self) -> Result<usize, IdOutOfBounds>;
    fn from_map_index(index: usize) -> Self;
}

impl Id for Word {
    fn map_index(self) -> Result<usize, IdOutOfBounds> {
        usize::try_from(self)
            .map_err(|_| IdOutOfBounds)?
            .checked_sub(1)
            .ok_or(IdOutOfBounds)
    }
    fn from_map_index(index: usize) -> Self {
        index
            .checked_add(1)
            .and_then(|v| Word::try_from(v).ok())
            .unwrap_or_else(|| panic!("index out of range: {}", index))
    }
}

type KeyPhantomData<K> = PhantomData<fn(K) -> K>;

/// map from ids to values, stored densely.
///
/// only id 0 is out of bounds; the map grows to fit any other id inserted,
/// so ids allocated after the map was created can be stored too.
#[derive(Clone)]
pub struct IdMap<K: Id, V> {
    values: Vec<Option<V>>,
    len: usize,
    _phantom: KeyPhantomData<K>,
}

impl<K: Id, V> Default for IdMap<K, V> {
    fn default() -> Self {
        Self::with_bound(0)
    }
}

impl<K: Id, V> IdMap<K, V> {
    /// create a map with room for every id less than `id_bound`
    pub fn with_bound(id_bound: u32) -> Self {
        Self {
            values: (1..id_bound).map(|_| None).collect(),
            len: 0,
            _phantom: PhantomData,
        }
    }
    /// create a map with room for every id in a module
    pub fn new<T: Borrow<ModuleHeader>>(header: T) -> Self {
        Self::with_bound(header.borrow().bound)
    }
    pub fn capacity(&self) -> usize {
        self.values.len()
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// iterate in ascending id order
    pub fn iter(&self) -> Iter<K, V> {
        Iter {
            base: self.values.iter().enumerate(),
            _phantom: PhantomData,
        }
    }
    pub fn get(&self, key: K) -> Result<Option<&V>, IdOutOfBounds> {
        Ok(self
            .values
            .get(key.map_index()?)
            .and_then(Option::as_ref))
    }
    pub fn contains_key(&self, key: K) -> Result<bool, IdOutOfBounds> {
        Ok(self.get(key)?.is_some())
    }
    pub fn get_mut(&mut self, key: K) -> Result<Option<&mut V>, IdOutOfBounds> {
        Ok(self
            .values
            .get_mut(key.map_index()?)
            .and_then(Option::as_mut))
    }
    /// insert `value`, growing the map if `key` is past the end.
    ///
    /// returns the value previously stored for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, IdOutOfBounds> {
        let index = key.map_index()?;
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        let old_value = mem::replace(&mut self.values[index], Some(value));
        if old_value.is_none() {
            self.len += 1;
        }
        Ok(old_value)
    }
    pub fn remove(&mut self, key: K) -> Result<Option<V>, IdOutOfBounds> {
        let index = key.map_index()?;
        let removed = self.values.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.len -= 1;
        }
        Ok(removed)
    }
}

impl<K: Id + fmt::Debug, V: fmt::Debug> fmt::Debug for IdMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, K: Id, V> {
    base: iter::Enumerate<slice::Iter<'a, Option<V>>>,
    _phantom: KeyPhantomData<K>,
}

impl<K: Id, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<'a, K: Id, V> Iterator for Iter<'a, K, V> {
    type Item = (K, &'a V);
    fn next(&mut self) -> Option<(K, &'a V)> {
        Some(loop {
            if let (index, Some(v)) = self.base.next()? {
                break (K::from_map_index(index), v);
            }
        })
    }
}

impl<'a, K: Id, V> IntoIterator for &'a IdMap<K, V> {
    type Item = (K, &'a V);
    type IntoIter = Iter<'a, K, V>;
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_map<K: Id + fmt::Debug, V: Eq + Copy + fmt::Debug>(
        map: &IdMap<K, V>,
        expected_map: &[(K, V)],
    ) {
        let map_entries: Vec<_> = map.iter().map(|(k, &v)| (k, v)).collect();
        assert_eq!(map_entries.len(), map.len());
        assert_eq!(map_entries, expected_map);
    }

    #[test]
    fn test_map() {
        const BOUND: u32 = 10;
        let mut map = IdMap::<Word, i32>::with_bound(BOUND);
        check_map(&map, &[]);
        assert_eq!(map.insert(0, 0), Err(IdOutOfBounds));
        check_map(&map, &[]);
        assert_eq!(map.insert(1, 0), Ok(None));
        check_map(&map, &[(1, 0)]);
        assert_eq!(map.insert(1, 2), Ok(Some(0)));
        check_map(&map, &[(1, 2)]);
        assert_eq!(map.insert(BOUND - 1, 4), Ok(None));
        check_map(&map, &[(1, 2), (BOUND - 1, 4)]);
        assert_eq!(map.remove(BOUND - 1), Ok(Some(4)));
        check_map(&map, &[(1, 2)]);
        assert_eq!(map.remove(BOUND - 1), Ok(None));
        assert_eq!(map.remove(0), Err(IdOutOfBounds));
        assert_eq!(map.remove(!0), Ok(None));
        if let Ok(Some(v)) = map.get_mut(1) {
            *v = 5;
        }
        check_map(&map, &[(1, 5)]);
        assert_eq!(map.contains_key(1), Ok(true));
        assert_eq!(map.contains_key(2), Ok(false));
    }

    #[test]
    fn test_growth() {
        let mut map = IdMap::<Word, &str>::new(ModuleHeader::new(3));
        assert_eq!(map.capacity(), 2);
        assert_eq!(map.get(40), Ok(None));
        assert_eq!(map.capacity(), 2);
        assert_eq!(map.insert(40, "a"), Ok(None));
        assert_eq!(map.capacity(), 40);
        assert_eq!(map.get(40), Ok(Some(&"a")));
        assert_eq!(map.get(0), Err(IdOutOfBounds));
        assert_eq!(map.insert(2, "b"), Ok(None));
        let keys: Vec<_> = (&map).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [2, 40]);
        assert_eq!(map.len(), 2);
    }
}
