// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::def_use::for_each_instruction;
use crate::{
    DecorationManager, DefUseManager, Instruction, InstructionLocation, Module, ModuleHeader, Word,
};

/// a module together with the analyses kept up to date as it's modified
#[derive(Debug)]
pub struct IrContext {
    module: Module,
    def_use: DefUseManager,
    decorations: DecorationManager,
    max_id_bound: u32,
}

impl IrContext {
    /// the default limit on the id bound
    pub const DEFAULT_MAX_ID_BOUND: u32 = 0x3F_FFFF;
    pub fn new(module: Module) -> Self {
        Self::with_max_id_bound(module, Self::DEFAULT_MAX_ID_BOUND)
    }
    /// create a context that refuses to allocate ids at or past `max_id_bound`.
    ///
    /// a module without a header gets one bounding the ids it mentions.
    pub fn with_max_id_bound(mut module: Module, max_id_bound: u32) -> Self {
        let def_use = DefUseManager::new(&module);
        let decorations = DecorationManager::new(&module);
        if module.header.is_none() {
            module.header = Some(ModuleHeader::new(def_use.id_bound()));
        }
        Self {
            module,
            def_use,
            decorations,
            max_id_bound,
        }
    }
    pub fn module(&self) -> &Module {
        &self.module
    }
    pub fn into_module(self) -> Module {
        self.module
    }
    pub fn def_use(&self) -> &DefUseManager {
        &self.def_use
    }
    fn next_id(&self) -> Word {
        self.module.header.as_ref().map_or(1, |header| header.bound.max(1))
    }
    /// how many more ids [`take_next_id`](Self::take_next_id) can hand out
    pub fn remaining_ids(&self) -> u32 {
        self.max_id_bound.saturating_sub(self.next_id())
    }
    /// allocate a fresh id, bumping the module's bound.
    ///
    /// returns `None` once the bound would pass the configured limit.
    pub fn take_next_id(&mut self) -> Option<Word> {
        let id = self.next_id();
        if id >= self.max_id_bound {
            return None;
        }
        self.module
            .header
            .get_or_insert_with(|| ModuleHeader::new(1))
            .bound = id + 1;
        Some(id)
    }
    /// append a type instruction to the end of the types and values section.
    ///
    /// def-use information isn't updated, see [`analyze_def_use`](Self::analyze_def_use)
    pub fn add_type(&mut self, instruction: Instruction) -> InstructionLocation {
        self.module.types_global_values.push(instruction);
        InstructionLocation::TypeOrGlobal(self.module.types_global_values.len() - 1)
    }
    /// append an annotation, updating def-use and decoration information
    pub fn add_annotation_inst(&mut self, instruction: Instruction) -> InstructionLocation {
        let index = self.module.annotations.len();
        self.def_use
            .analyze_instruction(Some(InstructionLocation::Annotation(index)), &instruction);
        self.decorations.analyze_instruction(index, &instruction);
        self.module.annotations.push(instruction);
        InstructionLocation::Annotation(index)
    }
    /// record the def and uses of the instruction at `location`
    pub fn analyze_def_use(&mut self, location: InstructionLocation) {
        if let Some(instruction) = location.get(&self.module) {
            self.def_use.analyze_instruction(Some(location), instruction);
        }
    }
    /// see [`DecorationManager::decorations_for`]
    pub fn get_decorations_for(&self, id: Word, include_linked: bool) -> Vec<&Instruction> {
        self.decorations
            .decorations_for(&self.module, id, include_linked)
    }
    /// the instruction defining `id`
    pub fn get_def(&self, id: Word) -> Option<&Instruction> {
        self.def_use.get_def(id)?.get(&self.module)
    }
    pub fn num_uses(&self, id: Word) -> usize {
        self.def_use.num_uses(id)
    }
    /// every instruction in module order
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut retval = Vec::new();
        for_each_instruction(&self.module, |_, instruction| retval.push(instruction));
        retval
    }
}
