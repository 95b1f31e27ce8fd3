// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::pool::{TypeHandle, TypePool};
use spirv_ir::Word;

#[derive(Copy, Clone, Debug)]
struct Entry {
    handle: TypeHandle,
    target_id: Word,
}

/// every `OpTypeForwardPointer` seen, in module order, along with which of
/// them are still waiting for their `OpTypePointer`.
///
/// each forward pointer has its own pool entry, so resolving one never
/// touches another declaring the same target.
#[derive(Clone, Debug, Default)]
pub(crate) struct ForwardPointerRegistry {
    entries: Vec<Entry>,
    /// indexes into `entries`, in module order
    unresolved: Vec<usize>,
}

impl ForwardPointerRegistry {
    /// record a forward pointer, returning its index
    pub(crate) fn record(&mut self, handle: TypeHandle, target_id: Word) -> usize {
        let index = self.entries.len();
        self.entries.push(Entry { handle, target_id });
        self.unresolved.push(index);
        index
    }
    pub(crate) fn get(&self, index: usize) -> Option<TypeHandle> {
        self.entries.get(index).map(|entry| entry.handle)
    }
    /// the first unresolved forward pointer declaring `target_id`
    pub(crate) fn pending_for(&self, target_id: Word) -> Option<TypeHandle> {
        self.unresolved
            .iter()
            .map(|&index| self.entries[index])
            .find(|entry| entry.target_id == target_id)
            .map(|entry| entry.handle)
    }
    /// resolve the first unresolved forward pointer declaring `target_id`,
    /// returning its index
    pub(crate) fn resolve_first(
        &mut self,
        pool: &TypePool,
        target_id: Word,
        pointer: TypeHandle,
    ) -> Option<usize> {
        let entries = &self.entries;
        let position = self
            .unresolved
            .iter()
            .position(|&index| entries[index].target_id == target_id)?;
        let index = self.unresolved.remove(position);
        let forward_pointer = pool
            .get(self.entries[index].handle)
            .as_forward_pointer()
            .expect("known to be a forward pointer");
        let newly_resolved = forward_pointer.set_target_pointer(pointer);
        debug_assert!(newly_resolved, "forward pointer resolved twice");
        Some(index)
    }
}
