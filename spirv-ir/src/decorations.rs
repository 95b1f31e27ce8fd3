// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::{id_in_operand, operand_id, Instruction, Module, Op, Word};
use hashbrown::HashMap;

/// indexes the annotations section by target id
#[derive(Clone, Debug, Default)]
pub struct DecorationManager {
    /// indices of `OpDecorate`/`OpMemberDecorate` targeting each id
    direct: HashMap<Word, Vec<usize>>,
    /// decoration groups applied to each id through `OpGroupDecorate`
    groups: HashMap<Word, Vec<Word>>,
}

impl DecorationManager {
    /// index every annotation in `module`
    pub fn new(module: &Module) -> Self {
        let mut retval = Self::default();
        for (index, instruction) in module.annotations.iter().enumerate() {
            retval.analyze_instruction(index, instruction);
        }
        retval
    }
    /// record the annotation at `index` in the annotations section
    pub fn analyze_instruction(&mut self, index: usize, instruction: &Instruction) {
        match instruction.class.opcode {
            Op::Decorate | Op::MemberDecorate => {
                if let Some(target) = id_in_operand(instruction, 0) {
                    self.direct.entry(target).or_insert_with(Vec::new).push(index);
                }
            }
            Op::GroupDecorate => {
                let group = match id_in_operand(instruction, 0) {
                    Some(group) => group,
                    None => return,
                };
                for target in instruction.operands[1..].iter().filter_map(operand_id) {
                    self.groups.entry(target).or_insert_with(Vec::new).push(group);
                }
            }
            _ => {}
        }
    }
    /// every `OpDecorate` and `OpMemberDecorate` targeting `id`, in module order.
    ///
    /// with `include_linked`, decorations reaching `id` through a decoration
    /// group applied with `OpGroupDecorate` follow the direct ones.
    pub fn decorations_for<'a>(
        &self,
        module: &'a Module,
        id: Word,
        include_linked: bool,
    ) -> Vec<&'a Instruction> {
        let annotations = &module.annotations;
        let direct_map = &self.direct;
        let direct = move |target: Word| {
            direct_map
                .get(&target)
                .into_iter()
                .flatten()
                .filter_map(move |&index| annotations.get(index))
        };
        let mut retval: Vec<&Instruction> = direct(id).collect();
        if include_linked {
            for &group in self.groups.get(&id).into_iter().flatten() {
                retval.extend(direct(group));
            }
        }
        retval
    }
}
