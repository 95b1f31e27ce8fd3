// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! errors produced while loading SPIR-V binaries or assembling text

impl_error! {
    /// `rspirv` rejected the binary
    #[display = "invalid SPIR-V binary: {message}"]
    pub struct InvalidBinary {
        /// the parser's description of the failure
        pub message: String,
    }
}

impl_error! {
    /// an assembly line names an opcode missing from the grammar
    #[display = "line {line}: unknown opcode \"{name}\""]
    pub struct UnknownOpcodeName {
        /// 1-based line number
        pub line: usize,
        /// the name as written
        pub name: String,
    }
}

impl_error! {
    /// an assembly token can't be parsed as the operand kind expected at its position
    #[display = "line {line}: invalid token \"{token}\", expected {expected}"]
    pub struct InvalidToken {
        /// 1-based line number
        pub line: usize,
        /// the token as written
        pub token: String,
        /// what was expected
        pub expected: &'static str,
    }
}

impl_error! {
    /// a required operand is absent
    #[display = "line {line}: missing operand for Op{opname}"]
    pub struct MissingOperand {
        /// 1-based line number
        pub line: usize,
        /// the instruction's name, without the `Op` prefix
        pub opname: &'static str,
    }
}

impl_error! {
    /// extra operands follow the last operand the opcode allows
    #[display = "line {line}: too many operands for Op{opname}"]
    pub struct TooManyOperands {
        /// 1-based line number
        pub line: usize,
        /// the instruction's name, without the `Op` prefix
        pub opname: &'static str,
    }
}

impl_error! {
    /// the grammar wants an operand kind the assembler can't write
    #[display = "line {line}: unsupported operand kind {kind}"]
    pub struct UnsupportedOperand {
        /// 1-based line number
        pub line: usize,
        /// the grammar's name for the operand kind
        pub kind: String,
    }
}

impl_error! {
    /// an instruction appears where the module layout doesn't allow it,
    /// like a function body instruction before the first `OpLabel`
    #[display = "line {line}: misplaced Op{opname}"]
    pub struct MisplacedInstruction {
        /// 1-based line number
        pub line: usize,
        /// the instruction's name, without the `Op` prefix
        pub opname: &'static str,
    }
}

impl_error_enum! {
    /// any error from reading a SPIR-V module
    pub enum Error {
        InvalidBinary(InvalidBinary),
        UnknownOpcodeName(UnknownOpcodeName),
        InvalidToken(InvalidToken),
        MissingOperand(MissingOperand),
        TooManyOperands(TooManyOperands),
        UnsupportedOperand(UnsupportedOperand),
        MisplacedInstruction(MisplacedInstruction),
    }
}

/// result type for this crate
pub type Result<T> = core::result::Result<T, Error>;
