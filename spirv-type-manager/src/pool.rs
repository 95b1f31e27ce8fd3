// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

// use custom hashtable since equality needs the pool itself

use crate::types::{Type, TypeRef};
use ahash::RandomState;
use std::hash::BuildHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::mem;

/// a reference to a canonical type in a `TypePool`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct TypeHandle(u32);

impl TypeHandle {
    /// the position of the type in its pool, in insertion order
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// owns one canonical copy of each distinct type.
///
/// every type in the pool refers to its subtypes through handles into the same
/// pool, so two pooled types are the same exactly when their handles are equal,
/// except for entries added with [`insert_distinct`](Self::insert_distinct).
/// types are never removed.
#[derive(Clone, Debug)]
pub struct TypePool {
    types: Vec<Type>,
    hashes: Vec<u64>,
    hashtable: Box<[Option<TypeHandle>]>,
    build_hasher: RandomState,
}

struct HashChainIndexes {
    mask: usize,
    index: usize,
}

impl Iterator for HashChainIndexes {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        let retval = self.index;
        self.index = self.index.wrapping_add(1) & self.mask;
        Some(retval)
    }
}

fn hashchain_indexes(hashtable_len: usize, hash: u64) -> HashChainIndexes {
    debug_assert!(hashtable_len.is_power_of_two());
    let mask = hashtable_len - 1;
    HashChainIndexes {
        index: hash as usize & mask,
        mask,
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            hashes: Vec::new(),
            hashtable: Box::new([]),
            build_hasher: RandomState::with_seeds(
                0x243F_6A88_85A3_08D3,
                0x1319_8A2E_0370_7344,
                0xA409_3822_299F_31D0,
                0x082E_FA98_EC4E_6C89,
            ),
        }
    }
    pub fn len(&self) -> usize {
        self.types.len()
    }
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
    /// get the type `handle` refers to.
    ///
    /// # Panics
    ///
    /// panics if `handle` isn't from `self`
    pub fn get(&self, handle: TypeHandle) -> &Type {
        &self.types[handle.index()]
    }
    /// every pooled type, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (TypeHandle, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, ty)| (TypeHandle(index as u32), ty))
    }
    fn hash_of(&self, ty: &Type) -> u64 {
        let mut hasher = self.build_hasher.build_hasher();
        ty.hash(&mut hasher);
        hasher.finish()
    }
    fn lookup(&self, ty: &Type, hash: u64) -> Result<TypeHandle, usize> {
        for index in hashchain_indexes(self.hashtable.len(), hash) {
            // loop is guaranteed to terminate since the table is never full
            match self.hashtable[index] {
                Some(handle) => {
                    if self.hashes[handle.index()] == hash
                        && self.get(handle).is_same(ty, self)
                    {
                        return Ok(handle);
                    }
                }
                None => return Err(index),
            }
        }
        unreachable!()
    }
    fn expand_hashtable(&mut self) {
        let new_size = self
            .hashtable
            .len()
            .checked_mul(2)
            .expect("hashtable too big")
            .max(64);
        debug_assert!(new_size.is_power_of_two());
        let new_hashtable = (0..new_size).map(|_| None).collect();
        let old_hashtable = mem::replace(&mut self.hashtable, new_hashtable);
        for handle in old_hashtable.into_vec().into_iter().flatten() {
            for index in hashchain_indexes(new_size, self.hashes[handle.index()]) {
                // loop is guaranteed to terminate since all indexes are
                // visited and we have more indexes than values
                match &mut self.hashtable[index] {
                    Some(_) => {}
                    entry @ None => {
                        *entry = Some(handle);
                        break;
                    }
                }
            }
        }
    }
    fn needs_expand(&self) -> bool {
        let hashtable_len = self.hashtable.len();
        // calculate hashtable_len * 7/8 without overflowing
        let limit = hashtable_len - hashtable_len / 8;

        // specifically include the case where hashtable_len == 0
        self.types.len() >= limit
    }
    /// insert a rebuilt type, returning the handle of the existing entry if
    /// an equal type is already pooled.
    ///
    /// `ty` must only refer to its subtypes through handles into `self`.
    pub fn insert(&mut self, ty: Type) -> TypeHandle {
        debug_assert!(ty.is_rebuilt(), "inserting a type with unpooled subtypes");
        if self.needs_expand() {
            self.expand_hashtable();
        }
        let hash = self.hash_of(&ty);
        match self.lookup(&ty, hash) {
            Ok(handle) => handle,
            Err(index) => {
                let handle = TypeHandle(self.types.len() as u32);
                self.types.push(ty);
                self.hashes.push(hash);
                self.hashtable[index] = Some(handle);
                handle
            }
        }
    }
    /// add `ty` as a new entry even if an equal type is already pooled.
    ///
    /// the entry is never returned by [`find`](Self::find) or
    /// [`insert`](Self::insert), so it keeps its own identity; each
    /// `OpTypeForwardPointer` needs that, since it is resolved separately.
    pub fn insert_distinct(&mut self, ty: Type) -> TypeHandle {
        debug_assert!(ty.is_rebuilt(), "inserting a type with unpooled subtypes");
        let handle = TypeHandle(self.types.len() as u32);
        let hash = self.hash_of(&ty);
        self.types.push(ty);
        self.hashes.push(hash);
        handle
    }
    /// find the pooled type equal to `ty` without inserting anything.
    ///
    /// `ty` may contain unpooled subtypes, the lookup fails if any of them
    /// isn't pooled.
    pub fn find(&self, ty: &Type) -> Option<TypeHandle> {
        if self.hashtable.is_empty() {
            return None;
        }
        let canonical;
        let ty = if ty.is_rebuilt() {
            ty
        } else {
            canonical = ty.try_map_subtypes(|v| match v {
                TypeRef::Pooled(handle) => Ok(TypeRef::Pooled(*handle)),
                TypeRef::Owned(v) => self.find(v).map(TypeRef::Pooled).ok_or(()),
            });
            canonical.as_ref().ok()?
        };
        self.lookup(ty, self.hash_of(ty)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Float, ForwardPointer, Integer, Pointer, Struct, Vector};
    use spirv_ir::{Decoration, StorageClass};

    fn int(width: u32) -> Type {
        Integer {
            width,
            signed: true,
        }
        .into()
    }

    #[test]
    fn test_dedup() {
        let mut pool = TypePool::new();
        let a = pool.insert(int(32));
        let b = pool.insert(int(32));
        let c = pool.insert(int(64));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
        let relaxed = vec![Decoration::RelaxedPrecision as u32];
        let decorated = pool.insert(int(32).with_decoration(relaxed));
        assert_ne!(a, decorated);
        let vector = |element| -> Type {
            Vector {
                element: TypeRef::Pooled(element),
                count: 3,
            }
            .into()
        };
        assert_eq!(pool.insert(vector(a)), pool.insert(vector(b)));
        assert_ne!(pool.insert(vector(a)), pool.insert(vector(c)));
    }

    #[test]
    fn test_find() {
        let mut pool = TypePool::new();
        let owned: Type = Struct::new(vec![
            Type::from(Float { width: 32 }).into(),
            Type::from(Pointer::new(int(32), StorageClass::Private)).into(),
        ])
        .into();
        assert_eq!(pool.find(&owned), None);
        let float = pool.insert(Float { width: 32 }.into());
        let int = pool.insert(int(32));
        assert_eq!(pool.find(&owned), None);
        let pointer = pool.insert(Pointer::new(int, StorageClass::Private).into());
        assert_eq!(pool.find(&owned), None);
        let handle = pool.insert(Struct::new(vec![float.into(), pointer.into()]).into());
        assert_eq!(pool.find(&owned), Some(handle));
        assert_eq!(pool.find(pool.get(handle)), Some(handle));
    }

    #[test]
    fn test_insert_distinct() {
        let mut pool = TypePool::new();
        let forward_pointer = || -> Type { ForwardPointer::new(3, StorageClass::Uniform).into() };
        let a = pool.insert_distinct(forward_pointer());
        let b = pool.insert_distinct(forward_pointer());
        assert_ne!(a, b);
        assert_eq!(pool.find(&forward_pointer()), None);
        let pooled = pool.insert(forward_pointer());
        assert_ne!(pooled, a);
        assert_ne!(pooled, b);
        assert_eq!(pool.insert(forward_pointer()), pooled);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_growth() {
        let mut pool = TypePool::new();
        let handles: Vec<_> = (1..=500).map(|width| pool.insert(int(width))).collect();
        for (width, &handle) in (1..=500).zip(&handles) {
            assert_eq!(pool.find(&int(width)), Some(handle));
            assert_eq!(pool.insert(int(width)), handle);
        }
        assert_eq!(pool.len(), 500);
        assert_eq!(pool.iter().map(|(handle, _)| handle).collect::<Vec<_>>(), handles);
    }
}
