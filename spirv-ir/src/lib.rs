// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! SPIR-V modules held in `rspirv`'s data representation, plus the id
//! allocation, def-use, and decoration analyses passes build on

#[macro_use]
mod macros;

mod context;
mod decorations;
mod def_use;
mod errors;
mod operand;
mod text;

pub use context::IrContext;
pub use decorations::DecorationManager;
pub use def_use::{DefUseManager, InstructionLocation};
pub use errors::*;
pub use operand::{id_in_operand, literal_in_operand, operand_id, used_ids};
pub use rspirv;
pub use rspirv::binary::{Assemble, Disassemble};
pub use rspirv::dr::{Instruction, Module, ModuleHeader, Operand};
pub use rspirv::spirv::{AccessQualifier, Decoration, Dim, ImageFormat, Op, StorageClass, Word};
pub use text::assemble;

/// parse a module from its binary form
pub fn load_words(words: &[Word]) -> Result<Module> {
    rspirv::dr::load_words(words).map_err(|state| {
        InvalidBinary {
            message: format!("{:?}", state),
        }
        .into()
    })
}

/// true for the instructions that declare types, `OpTypeVoid` through
/// `OpTypeForwardPointer` plus the later extension types
pub fn is_type_opcode(opcode: Op) -> bool {
    match opcode {
        Op::TypeVoid
        | Op::TypeBool
        | Op::TypeInt
        | Op::TypeFloat
        | Op::TypeVector
        | Op::TypeMatrix
        | Op::TypeImage
        | Op::TypeSampler
        | Op::TypeSampledImage
        | Op::TypeArray
        | Op::TypeRuntimeArray
        | Op::TypeStruct
        | Op::TypeOpaque
        | Op::TypePointer
        | Op::TypeFunction
        | Op::TypeEvent
        | Op::TypeDeviceEvent
        | Op::TypeReserveId
        | Op::TypeQueue
        | Op::TypePipe
        | Op::TypeForwardPointer
        | Op::TypePipeStorage
        | Op::TypeNamedBarrier
        | Op::TypeRayQueryKHR
        | Op::TypeAccelerationStructureKHR
        | Op::TypeCooperativeMatrixNV => true,
        _ => false,
    }
}

/// true for the instructions that belong in the annotations section
pub fn is_annotation_opcode(opcode: Op) -> bool {
    match opcode {
        Op::Decorate
        | Op::MemberDecorate
        | Op::DecorationGroup
        | Op::GroupDecorate
        | Op::GroupMemberDecorate
        | Op::DecorateId
        | Op::DecorateString
        | Op::MemberDecorateString => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_words() {
        let module = assemble("%1 = OpTypeFloat 32\n%2 = OpTypeVector %1 4").unwrap();
        let words = module.assemble();
        let reloaded = load_words(&words).unwrap();
        assert_eq!(reloaded.assemble(), words);
        assert_eq!(reloaded.types_global_values.len(), 2);
        assert!(is_type_opcode(reloaded.types_global_values[1].class.opcode));
        match load_words(&words[..3]) {
            Err(Error::InvalidBinary(_)) => {}
            v => panic!("expected InvalidBinary, got {:?}", v.map(|v| v.assemble())),
        }
    }
}
