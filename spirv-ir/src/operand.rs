// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::{Instruction, Operand, Word};

/// the id an operand refers to, for the operand kinds holding `<id>`s
pub fn operand_id(operand: &Operand) -> Option<Word> {
    match *operand {
        Operand::IdRef(v) | Operand::IdScope(v) | Operand::IdMemorySemantics(v) => Some(v),
        _ => None,
    }
}

/// the `<id>` in operand `index`, not counting the result type or result id
pub fn id_in_operand(instruction: &Instruction, index: usize) -> Option<Word> {
    match instruction.operands.get(index)? {
        Operand::IdRef(v) => Some(*v),
        _ => None,
    }
}

/// the 32-bit literal in operand `index`
pub fn literal_in_operand(instruction: &Instruction, index: usize) -> Option<u32> {
    match instruction.operands.get(index)? {
        Operand::LiteralBit32(v) => Some(*v),
        _ => None,
    }
}

/// every `<id>` `instruction` reads, including its result type, in operand order
pub fn used_ids(instruction: &Instruction) -> impl Iterator<Item = Word> + '_ {
    instruction
        .result_type
        .into_iter()
        .chain(instruction.operands.iter().filter_map(operand_id))
}
