// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! an assembler for the SPIR-V text form, driven by `rspirv`'s grammar tables
//!
//! only numeric ids (`%12`) are supported; the bound is one past the
//! largest id mentioned. `OpConstant` takes a single 32-bit literal.

use crate::errors::{
    InvalidToken, MisplacedInstruction, MissingOperand, Result, TooManyOperands,
    UnknownOpcodeName, UnsupportedOperand,
};
use crate::{is_annotation_opcode, Instruction, Module, ModuleHeader, Op, Operand, Word};
use hashbrown::HashMap;
use rspirv::dr::{Block, Function};
use rspirv::grammar::{self, CoreInstructionTable, OperandKind, OperandQuantifier};
use rspirv::spirv;
use std::fmt;
use std::slice;

type GrammarInstruction = grammar::Instruction<'static>;

#[derive(Clone, Debug)]
enum Token<'a> {
    Bare(&'a str),
    Quoted(String),
}

impl Token<'_> {
    fn text(&self) -> String {
        match self {
            Token::Bare(v) => v.to_string(),
            Token::Quoted(v) => format!("{:?}", v),
        }
    }
}

fn tokenize(line_number: usize, line: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = line;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with(';') {
            return Ok(tokens);
        }
        if rest.starts_with('"') {
            let mut value = String::new();
            let mut chars = rest[1..].char_indices();
            let end = loop {
                match chars.next() {
                    Some((index, '"')) => break Some(index + 2),
                    Some((_, '\\')) => match chars.next() {
                        Some((_, c)) => value.push(c),
                        None => break None,
                    },
                    Some((_, c)) => value.push(c),
                    None => break None,
                }
            };
            let end = end.ok_or_else(|| InvalidToken {
                line: line_number,
                token: rest.to_string(),
                expected: "closing quote",
            })?;
            tokens.push(Token::Quoted(value));
            rest = &rest[end..];
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ';')
                .unwrap_or_else(|| rest.len());
            tokens.push(Token::Bare(&rest[..end]));
            rest = &rest[end..];
        }
    }
}

fn opcode_table() -> HashMap<&'static str, &'static GrammarInstruction> {
    (0..=u32::from(u16::MAX))
        .filter_map(Op::from_u32)
        .filter_map(|opcode| CoreInstructionTable::lookup_opcode(opcode as u16))
        .map(|instruction| (instruction.opname, instruction))
        .collect()
}

fn parse_number(text: &str) -> Option<u32> {
    if text.starts_with("0x") || text.starts_with("0X") {
        return u32::from_str_radix(&text[2..], 16).ok();
    }
    text.parse::<u32>()
        .ok()
        .or_else(|| text.parse::<i32>().ok().map(|v| v as u32))
        .or_else(|| {
            if text.contains('.') {
                text.parse::<f32>().ok().map(f32::to_bits)
            } else {
                None
            }
        })
}

/// look up a value enumerant by its name in the grammar, or by number
fn enumerant<T: fmt::Debug>(name: &str, from_u32: impl Fn(u32) -> Option<T>) -> Option<T> {
    if let Some(value) = parse_number(name) {
        return from_u32(value);
    }
    (0..=u32::from(u16::MAX))
        .filter_map(&from_u32)
        .find(|v| format!("{:?}", v) == name)
}

struct LineParser<'t, 'a> {
    line: usize,
    max_id: Word,
    class: &'static GrammarInstruction,
    tokens: slice::Iter<'t, Token<'a>>,
    operands: Vec<Operand>,
}

impl<'t, 'a> LineParser<'t, 'a> {
    fn invalid(&self, token: &Token, expected: &'static str) -> crate::Error {
        InvalidToken {
            line: self.line,
            token: token.text(),
            expected,
        }
        .into()
    }
    fn missing(&self) -> crate::Error {
        MissingOperand {
            line: self.line,
            opname: self.class.opname,
        }
        .into()
    }
    fn next_token(&mut self) -> Result<Token<'a>> {
        let token = self.tokens.next().cloned();
        token.ok_or_else(|| self.missing())
    }
    fn id(&mut self, token: &Token) -> Result<Word> {
        let value = match *token {
            Token::Bare(v) if v.starts_with('%') => v[1..].parse::<u32>().ok(),
            _ => None,
        };
        match value {
            Some(value) if value != 0 => {
                self.max_id = self.max_id.max(value);
                Ok(value)
            }
            _ => Err(self.invalid(token, "<id>")),
        }
    }
    fn number(&self, token: &Token) -> Result<u32> {
        match *token {
            Token::Bare(v) => parse_number(v),
            Token::Quoted(_) => None,
        }
        .ok_or_else(|| self.invalid(token, "literal number"))
    }
    fn named<T: fmt::Debug>(
        &self,
        token: &Token,
        expected: &'static str,
        from_u32: impl Fn(u32) -> Option<T>,
    ) -> Result<T> {
        match *token {
            Token::Bare(v) => enumerant(v, from_u32),
            Token::Quoted(_) => None,
        }
        .ok_or_else(|| self.invalid(token, expected))
    }
    fn bits(&self, token: &Token, expected: &'static str) -> Result<u32> {
        match *token {
            Token::Bare("None") => Ok(0),
            _ => self.number(token).map_err(|_| self.invalid(token, expected)),
        }
    }
    /// the operands following a decoration or execution mode
    fn parameter(&mut self, token: &Token) -> Result<Operand> {
        Ok(match *token {
            Token::Quoted(ref v) => Operand::LiteralString(v.clone()),
            Token::Bare(v) if v.starts_with('%') => Operand::IdRef(self.id(token)?),
            Token::Bare(v) => {
                if let Some(value) = parse_number(v) {
                    Operand::LiteralBit32(value)
                } else if let Some(value) = enumerant(v, spirv::BuiltIn::from_u32) {
                    Operand::BuiltIn(value)
                } else if let Some(value) = enumerant(v, spirv::LinkageType::from_u32) {
                    Operand::LinkageType(value)
                } else if let Some(value) = enumerant(v, spirv::FPRoundingMode::from_u32) {
                    Operand::FPRoundingMode(value)
                } else {
                    return Err(self.invalid(token, "decoration parameter"));
                }
            }
        })
    }
    fn operand(&mut self, kind: &OperandKind, token: &Token) -> Result<()> {
        let operand = match kind {
            OperandKind::IdRef => Operand::IdRef(self.id(token)?),
            OperandKind::IdScope => Operand::IdScope(self.id(token)?),
            OperandKind::IdMemorySemantics => Operand::IdMemorySemantics(self.id(token)?),
            OperandKind::LiteralInteger | OperandKind::LiteralContextDependentNumber => {
                Operand::LiteralBit32(self.number(token)?)
            }
            OperandKind::LiteralExtInstInteger => {
                Operand::LiteralExtInstInteger(self.number(token)?)
            }
            OperandKind::LiteralString => match *token {
                Token::Quoted(ref v) => Operand::LiteralString(v.clone()),
                Token::Bare(_) => return Err(self.invalid(token, "quoted string")),
            },
            OperandKind::PairLiteralIntegerIdRef => {
                let first = Operand::LiteralBit32(self.number(token)?);
                self.operands.push(first);
                let token = self.next_token()?;
                Operand::IdRef(self.id(&token)?)
            }
            OperandKind::PairIdRefLiteralInteger => {
                let first = Operand::IdRef(self.id(token)?);
                self.operands.push(first);
                let token = self.next_token()?;
                Operand::LiteralBit32(self.number(&token)?)
            }
            OperandKind::PairIdRefIdRef => {
                let first = Operand::IdRef(self.id(token)?);
                self.operands.push(first);
                let token = self.next_token()?;
                Operand::IdRef(self.id(&token)?)
            }
            OperandKind::StorageClass => Operand::StorageClass(self.named(
                token,
                "StorageClass",
                spirv::StorageClass::from_u32,
            )?),
            OperandKind::Dim => {
                let dim = match *token {
                    Token::Bare(v) => enumerant(v, spirv::Dim::from_u32)
                        .or_else(|| enumerant(&format!("Dim{}", v), spirv::Dim::from_u32)),
                    Token::Quoted(_) => None,
                };
                Operand::Dim(dim.ok_or_else(|| self.invalid(token, "Dim"))?)
            }
            OperandKind::ImageFormat => Operand::ImageFormat(self.named(
                token,
                "ImageFormat",
                spirv::ImageFormat::from_u32,
            )?),
            OperandKind::AccessQualifier => Operand::AccessQualifier(self.named(
                token,
                "AccessQualifier",
                spirv::AccessQualifier::from_u32,
            )?),
            OperandKind::Capability => Operand::Capability(self.named(
                token,
                "Capability",
                spirv::Capability::from_u32,
            )?),
            OperandKind::AddressingModel => Operand::AddressingModel(self.named(
                token,
                "AddressingModel",
                spirv::AddressingModel::from_u32,
            )?),
            OperandKind::MemoryModel => Operand::MemoryModel(self.named(
                token,
                "MemoryModel",
                spirv::MemoryModel::from_u32,
            )?),
            OperandKind::ExecutionModel => Operand::ExecutionModel(self.named(
                token,
                "ExecutionModel",
                spirv::ExecutionModel::from_u32,
            )?),
            OperandKind::SourceLanguage => Operand::SourceLanguage(self.named(
                token,
                "SourceLanguage",
                spirv::SourceLanguage::from_u32,
            )?),
            OperandKind::ExecutionMode => {
                let mode = self.named(token, "ExecutionMode", spirv::ExecutionMode::from_u32)?;
                self.operands.push(Operand::ExecutionMode(mode));
                return self.trailing_parameters();
            }
            OperandKind::Decoration => {
                let decoration = self.named(token, "Decoration", spirv::Decoration::from_u32)?;
                self.operands.push(Operand::Decoration(decoration));
                return self.trailing_parameters();
            }
            OperandKind::FunctionControl => Operand::FunctionControl(
                spirv::FunctionControl::from_bits_truncate(self.bits(token, "FunctionControl")?),
            ),
            OperandKind::SelectionControl => Operand::SelectionControl(
                spirv::SelectionControl::from_bits_truncate(self.bits(token, "SelectionControl")?),
            ),
            OperandKind::LoopControl => Operand::LoopControl(
                spirv::LoopControl::from_bits_truncate(self.bits(token, "LoopControl")?),
            ),
            OperandKind::MemoryAccess => Operand::MemoryAccess(
                spirv::MemoryAccess::from_bits_truncate(self.bits(token, "MemoryAccess")?),
            ),
            other => {
                return Err(UnsupportedOperand {
                    line: self.line,
                    kind: format!("{:?}", other),
                }
                .into())
            }
        };
        self.operands.push(operand);
        Ok(())
    }
    fn trailing_parameters(&mut self) -> Result<()> {
        while let Some(token) = self.tokens.next().cloned() {
            let parameter = self.parameter(&token)?;
            self.operands.push(parameter);
        }
        Ok(())
    }
    fn parse(mut self, result_id: Option<Word>) -> Result<(Instruction, Word)> {
        let mut result_type = None;
        let mut has_result_id = false;
        for logical in self.class.operands {
            match logical.kind {
                OperandKind::IdResultType => {
                    let token = self.next_token()?;
                    result_type = Some(self.id(&token)?);
                    continue;
                }
                OperandKind::IdResult => {
                    has_result_id = true;
                    continue;
                }
                _ => {}
            }
            match logical.quantifier {
                OperandQuantifier::One => {
                    let token = self.next_token()?;
                    self.operand(&logical.kind, &token)?;
                }
                OperandQuantifier::ZeroOrOne => {
                    if let Some(token) = self.tokens.next().cloned() {
                        self.operand(&logical.kind, &token)?;
                    }
                }
                OperandQuantifier::ZeroOrMore => {
                    while let Some(token) = self.tokens.next().cloned() {
                        self.operand(&logical.kind, &token)?;
                    }
                }
            }
        }
        if has_result_id != result_id.is_some() {
            return Err(InvalidToken {
                line: self.line,
                token: format!("Op{}", self.class.opname),
                expected: "result <id> to match opcode",
            }
            .into());
        }
        if self.tokens.next().is_some() {
            return Err(TooManyOperands {
                line: self.line,
                opname: self.class.opname,
            }
            .into());
        }
        let instruction =
            Instruction::new(self.class.opcode, result_type, result_id, self.operands);
        Ok((instruction, self.max_id))
    }
}

fn place(module: &mut Module, line: usize, instruction: Instruction) -> Result<()> {
    let opcode = instruction.class.opcode;
    match opcode {
        Op::Capability => module.capabilities.push(instruction),
        Op::Extension => module.extensions.push(instruction),
        Op::ExtInstImport => module.ext_inst_imports.push(instruction),
        Op::MemoryModel => module.memory_model = Some(instruction),
        Op::EntryPoint => module.entry_points.push(instruction),
        Op::ExecutionMode | Op::ExecutionModeId => module.execution_modes.push(instruction),
        Op::String | Op::Source | Op::SourceContinued | Op::SourceExtension => {
            module.debug_string_source.push(instruction)
        }
        Op::Name | Op::MemberName => module.debug_names.push(instruction),
        Op::ModuleProcessed => module.debug_module_processed.push(instruction),
        _ if is_annotation_opcode(opcode) => module.annotations.push(instruction),
        Op::Function => {
            let mut function = Function::new();
            function.def = Some(instruction);
            module.functions.push(function);
        }
        _ => match module.functions.last_mut() {
            Some(function) if function.end.is_none() => match opcode {
                Op::FunctionParameter => function.parameters.push(instruction),
                Op::FunctionEnd => function.end = Some(instruction),
                Op::Label => {
                    let mut block = Block::new();
                    block.label = Some(instruction);
                    function.blocks.push(block);
                }
                _ => match function.blocks.last_mut() {
                    Some(block) => block.instructions.push(instruction),
                    None => {
                        return Err(MisplacedInstruction {
                            line,
                            opname: instruction.class.opname,
                        }
                        .into())
                    }
                },
            },
            _ => module.types_global_values.push(instruction),
        },
    }
    Ok(())
}

/// assemble a module from its text form.
///
/// instructions are sorted into the module's sections by opcode, and
/// everything between `OpFunction` and `OpFunctionEnd` goes into that
/// function.
pub fn assemble(text: &str) -> Result<Module> {
    let opcodes = opcode_table();
    let mut module = Module::new();
    let mut max_id = 0;
    for (index, source) in text.lines().enumerate() {
        let line = index + 1;
        let tokens = tokenize(line, source)?;
        let (result_id, rest) = match &*tokens {
            [Token::Bare(id), Token::Bare("="), rest @ ..] if id.starts_with('%') => {
                let id = id[1..]
                    .parse::<Word>()
                    .ok()
                    .filter(|&v| v != 0)
                    .ok_or_else(|| InvalidToken {
                        line,
                        token: id.to_string(),
                        expected: "<id>",
                    })?;
                max_id = max_id.max(id);
                (Some(id), rest)
            }
            tokens => (None, tokens),
        };
        let (name, rest) = match rest.split_first() {
            Some(v) => v,
            None if result_id.is_none() => continue,
            None => {
                return Err(InvalidToken {
                    line,
                    token: String::new(),
                    expected: "opcode",
                }
                .into())
            }
        };
        let class = match *name {
            Token::Bare(name) if name.starts_with("Op") => opcodes.get(&name[2..]).copied(),
            _ => None,
        };
        let class = class.ok_or_else(|| UnknownOpcodeName {
            line,
            name: name.text(),
        })?;
        let parser = LineParser {
            line,
            max_id,
            class,
            tokens: rest.iter(),
            operands: Vec::new(),
        };
        let (instruction, parsed_max_id) = parser.parse(result_id)?;
        max_id = parsed_max_id;
        place(&mut module, line, instruction)?;
    }
    module.header = Some(ModuleHeader::new(max_id + 1));
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_words, Assemble, Disassemble, Error};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assemble() {
        let text = r#"
               OpCapability Shader
               OpMemoryModel Logical GLSL450
               OpEntryPoint GLCompute %6 "main"
               OpExecutionMode %6 LocalSize 1 1 1
               OpName %3 "a \"b\""
               OpDecorate %3 Block
               OpMemberDecorate %3 0 Offset 16
          %1 = OpTypeFloat 32
          %2 = OpTypeImage %1 2D 0 0 0 1 Rgba8
          %3 = OpTypeStruct %1 %2
          %4 = OpTypeVoid
          %5 = OpTypeFunction %4
          %6 = OpFunction %4 None %5
          %7 = OpLabel
          %8 = OpConstant %1 1.5
          %9 = OpFAdd %1 %8 %8
               OpReturn
               OpFunctionEnd
"#;
        let module = assemble(text).unwrap();
        assert_eq!(module.header.as_ref().map(|v| v.bound), Some(10));
        assert_eq!(
            module.debug_names[0].operands[1],
            Operand::LiteralString("a \"b\"".into())
        );
        let image = &module.types_global_values[1];
        assert_eq!(image.operands[1], Operand::Dim(spirv::Dim::Dim2D));
        assert_eq!(image.disassemble(), "%2 = OpTypeImage %1 Dim2D 0 0 0 1 Rgba8");
        assert_eq!(
            module.execution_modes[0].operands,
            [
                Operand::IdRef(6),
                Operand::ExecutionMode(spirv::ExecutionMode::LocalSize),
                Operand::LiteralBit32(1),
                Operand::LiteralBit32(1),
                Operand::LiteralBit32(1),
            ]
        );
        let body = &module.functions[0].blocks[0].instructions;
        assert_eq!(body.len(), 3);
        assert_eq!(body[1].class.opcode, Op::FAdd);
        assert_eq!(body[0].operands, [Operand::LiteralBit32(1.5f32.to_bits())]);
        let words = module.assemble();
        assert_eq!(load_words(&words).unwrap().assemble(), words);
    }

    #[test]
    fn test_assemble_errors() {
        assert_eq!(
            assemble("%1 = OpTypeFoo").map(|_| ()),
            Err(Error::UnknownOpcodeName(UnknownOpcodeName {
                line: 1,
                name: "OpTypeFoo".into()
            }))
        );
        assert_eq!(
            assemble("\n%1 = OpTypeInt 32").map(|_| ()),
            Err(Error::MissingOperand(MissingOperand {
                line: 2,
                opname: "TypeInt"
            }))
        );
        assert_eq!(
            assemble("%1 = OpTypeBool 3").map(|_| ()),
            Err(Error::TooManyOperands(TooManyOperands {
                line: 1,
                opname: "TypeBool"
            }))
        );
        assert_eq!(
            assemble("%2 = OpTypePointer Nowhere %1").map(|_| ()),
            Err(Error::InvalidToken(InvalidToken {
                line: 1,
                token: "Nowhere".into(),
                expected: "StorageClass"
            }))
        );
        assert_eq!(
            assemble("%1 = OpTypeVector 1 4").map(|_| ()),
            Err(Error::InvalidToken(InvalidToken {
                line: 1,
                token: "1".into(),
                expected: "<id>"
            }))
        );
        assert_eq!(
            assemble("%1 = OpTypeInt 32 0\n%2 = OpFunction %1 None %1\n%3 = OpUndef %1")
                .map(|_| ()),
            Err(Error::MisplacedInstruction(MisplacedInstruction {
                line: 3,
                opname: "Undef"
            }))
        );
    }
}
