// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::{used_ids, Instruction, Module, Word};
use hashbrown::HashMap;
use rspirv::dr::Function;

/// where an instruction that can define an `<id>` sits in its module
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum InstructionLocation {
    ExtInstImport(usize),
    /// `OpString` and the other debug source instructions
    DebugString(usize),
    /// `OpDecorationGroup` and the other annotations
    Annotation(usize),
    TypeOrGlobal(usize),
    /// `index` counts through the function in order, starting with its `OpFunction`
    Function { function: usize, index: usize },
}

impl InstructionLocation {
    pub fn get(self, module: &Module) -> Option<&Instruction> {
        match self {
            InstructionLocation::ExtInstImport(index) => module.ext_inst_imports.get(index),
            InstructionLocation::DebugString(index) => module.debug_string_source.get(index),
            InstructionLocation::Annotation(index) => module.annotations.get(index),
            InstructionLocation::TypeOrGlobal(index) => module.types_global_values.get(index),
            InstructionLocation::Function { function, index } => {
                function_instructions(module.functions.get(function)?).nth(index)
            }
        }
    }
}

fn function_instructions(function: &Function) -> impl Iterator<Item = &Instruction> {
    function
        .def
        .iter()
        .chain(&function.parameters)
        .chain(
            function
                .blocks
                .iter()
                .flat_map(|block| block.label.iter().chain(&block.instructions)),
        )
        .chain(function.end.iter())
}

/// call `f` on every instruction in module order, with the location of the
/// ones in sections that can define `<id>`s
pub(crate) fn for_each_instruction<'a>(
    module: &'a Module,
    mut f: impl FnMut(Option<InstructionLocation>, &'a Instruction),
) {
    for instruction in module.capabilities.iter().chain(&module.extensions) {
        f(None, instruction);
    }
    for (index, instruction) in module.ext_inst_imports.iter().enumerate() {
        f(Some(InstructionLocation::ExtInstImport(index)), instruction);
    }
    let mode_setting = module
        .memory_model
        .iter()
        .chain(&module.entry_points)
        .chain(&module.execution_modes);
    for instruction in mode_setting {
        f(None, instruction);
    }
    for (index, instruction) in module.debug_string_source.iter().enumerate() {
        f(Some(InstructionLocation::DebugString(index)), instruction);
    }
    for instruction in module.debug_names.iter().chain(&module.debug_module_processed) {
        f(None, instruction);
    }
    for (index, instruction) in module.annotations.iter().enumerate() {
        f(Some(InstructionLocation::Annotation(index)), instruction);
    }
    for (index, instruction) in module.types_global_values.iter().enumerate() {
        f(Some(InstructionLocation::TypeOrGlobal(index)), instruction);
    }
    for (function, body) in module.functions.iter().enumerate() {
        for (index, instruction) in function_instructions(body).enumerate() {
            f(
                Some(InstructionLocation::Function { function, index }),
                instruction,
            );
        }
    }
}

/// tracks which instruction defines each id and how many instructions use it
#[derive(Clone, Debug, Default)]
pub struct DefUseManager {
    defs: HashMap<Word, InstructionLocation>,
    uses: HashMap<Word, usize>,
    max_id: Word,
}

impl DefUseManager {
    /// analyze every instruction in `module`
    pub fn new(module: &Module) -> Self {
        let mut retval = Self::default();
        for_each_instruction(module, |location, instruction| {
            retval.analyze_instruction(location, instruction);
        });
        retval
    }
    /// record the def and uses of one instruction.
    ///
    /// `location` is `None` for instructions outside the sections that define ids.
    pub fn analyze_instruction(
        &mut self,
        location: Option<InstructionLocation>,
        instruction: &Instruction,
    ) {
        if let Some(result_id) = instruction.result_id {
            self.max_id = self.max_id.max(result_id);
            if let Some(location) = location {
                self.defs.insert(result_id, location);
            }
        }
        let mut ids: Vec<Word> = used_ids(instruction).collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            self.max_id = self.max_id.max(id);
            *self.uses.entry(id).or_insert(0) += 1;
        }
    }
    pub fn get_def(&self, id: Word) -> Option<InstructionLocation> {
        self.defs.get(&id).copied()
    }
    /// the number of instructions using `id`; an instruction naming it twice counts once
    pub fn num_uses(&self, id: Word) -> usize {
        self.uses.get(&id).copied().unwrap_or(0)
    }
    /// one past the largest id seen
    pub fn id_bound(&self) -> Word {
        self.max_id + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assemble, Op};

    #[test]
    fn test_def_use() {
        let module = assemble(
            "
               OpDecorate %2 ArrayStride 4
          %1 = OpTypeInt 32 0
          %3 = OpConstant %1 4
          %2 = OpTypeArray %1 %3
          %4 = OpTypeStruct %1 %1 %2
          %5 = OpTypeFunction %4
          %6 = OpFunction %4 None %5
          %7 = OpLabel
          %8 = OpUndef %4
               OpReturnValue %8
               OpFunctionEnd
",
        )
        .unwrap();
        let def_use = DefUseManager::new(&module);
        assert_eq!(
            def_use.get_def(2),
            Some(InstructionLocation::TypeOrGlobal(2))
        );
        assert_eq!(
            def_use.get_def(8),
            Some(InstructionLocation::Function {
                function: 0,
                index: 2
            })
        );
        assert_eq!(
            def_use.get_def(8).and_then(|v| v.get(&module)).map(|v| v.class.opcode),
            Some(Op::Undef)
        );
        assert_eq!(def_use.get_def(9), None);
        // a struct naming %1 twice is still a single use
        assert_eq!(def_use.num_uses(1), 3);
        assert_eq!(def_use.num_uses(2), 2);
        assert_eq!(def_use.num_uses(4), 3);
        assert_eq!(def_use.num_uses(6), 0);
        assert_eq!(def_use.id_bound(), 9);
    }
}
