//! CIL instruction decoding.
//!
//! This module turns a serialized method body into an editable
//! [`crate::metadata::method::MethodBody`]. Decoding runs in two passes: the first walks the
//! code linearly and records every instruction with its byte offset and raw branch
//! displacements; the second maps each branch target and exception handler boundary to the
//! handle of the instruction starting at that offset. A jump into the middle of an
//! instruction or past the end of the code is a malformed body.
//!
//! # Key Components
//!
//! - [`decode_instruction`] - Core single instruction decoder
//! - [`decode_body`] - Complete method body, header and handlers included
//!
//! # Usage Examples
//!
//! ```rust
//! use ilpatch::assembly::{decode_body, OpCode, Operand};
//!
//! // Tiny header, 4 code bytes: br.s +1; nop; ret
//! let data = [0x12, 0x2B, 0x01, 0x00, 0x2A];
//! let body = decode_body(&data)?;
//!
//! assert_eq!(body.len(), 3);
//! let (_, branch) = body.iter().next().unwrap();
//! assert_eq!(branch.opcode, OpCode::BR_S);
//! assert_eq!(branch.operand, Operand::Target(body.at(2)?));
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{Immediate, Instruction, OpCode, Operand, OperandType, FE_PREFIX},
    file::parser::Parser,
    metadata::{
        method::{
            ExceptionClause, ExceptionHandler, ExceptionHandlerFlags, InstrId, MethodBody,
            MethodHeader,
        },
        token::Token,
    },
    Result,
};

/// Operand of an instruction whose branch targets are still byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    /// Every operand kind except branches
    Plain(Operand),
    /// Absolute byte offset of a branch target
    Target(i64),
    /// Absolute byte offsets of switch targets
    Switch(Vec<i64>),
}

/// An instruction as it appears in the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstruction {
    /// Byte offset from the start of the code
    pub offset: u32,
    /// Encoded size in bytes
    pub size: u32,
    /// The operation
    pub opcode: OpCode,
    /// The operand, with branch displacements resolved to absolute offsets
    pub operand: RawOperand,
}

/// Decodes a single CIL instruction from the current parser position.
///
/// The parser is expected to be positioned inside the code of one method; the position is
/// used as the instruction's offset and branch displacements are made absolute relative to
/// it.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for undefined opcodes and
/// [`crate::Error::OutOfBounds`] for truncated operands.
///
/// # Examples
///
/// ```rust
/// use ilpatch::{assembly::{decode_instruction, OpCode, RawOperand, Operand}, Parser};
/// use ilpatch::metadata::token::Token;
///
/// // ldstr 0x70000001
/// let bytecode = [0x72, 0x01, 0x00, 0x00, 0x70];
/// let mut parser = Parser::new(&bytecode);
///
/// let instruction = decode_instruction(&mut parser)?;
/// assert_eq!(instruction.opcode, OpCode::LDSTR);
/// assert_eq!(instruction.size, 5);
/// assert_eq!(instruction.operand, RawOperand::Plain(Operand::Token(Token::new(0x7000_0001))));
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub fn decode_instruction(parser: &mut Parser) -> Result<RawInstruction> {
    let start = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let value = if first_byte == FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        u16::from_be_bytes([FE_PREFIX, second_byte])
    } else {
        u16::from(first_byte)
    };

    let Some(opcode) = OpCode::from_value(value) else {
        return Err(malformed_error!(
            "Invalid opcode {:#06x} at offset {:#x}",
            value,
            start
        ));
    };

    let operand = match opcode.operand_type() {
        OperandType::None => RawOperand::Plain(Operand::None),
        OperandType::Int8 => {
            RawOperand::Plain(Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)))
        }
        OperandType::UInt8 => {
            RawOperand::Plain(Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)))
        }
        OperandType::UInt16 => RawOperand::Plain(Operand::Immediate(Immediate::UInt16(
            parser.read_le::<u16>()?,
        ))),
        OperandType::Int32 => RawOperand::Plain(Operand::Immediate(Immediate::Int32(
            parser.read_le::<i32>()?,
        ))),
        OperandType::Int64 => RawOperand::Plain(Operand::Immediate(Immediate::Int64(
            parser.read_le::<i64>()?,
        ))),
        OperandType::Float32 => RawOperand::Plain(Operand::Immediate(Immediate::Float32(
            parser.read_le::<f32>()?,
        ))),
        OperandType::Float64 => RawOperand::Plain(Operand::Immediate(Immediate::Float64(
            parser.read_le::<f64>()?,
        ))),
        OperandType::Token => RawOperand::Plain(Operand::Token(Token::new(parser.read_le::<u32>()?))),
        OperandType::ShortTarget => {
            let displacement = i64::from(parser.read_le::<i8>()?);
            RawOperand::Target(parser.pos() as i64 + displacement)
        }
        OperandType::Target => {
            let displacement = i64::from(parser.read_le::<i32>()?);
            RawOperand::Target(parser.pos() as i64 + displacement)
        }
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count > parser.remaining() / 4 {
                return Err(malformed_error!(
                    "Switch at offset {:#x} declares {} cases",
                    start,
                    case_count
                ));
            }

            let mut displacements = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }

            // Switch displacements are relative to the end of the whole table
            let base = parser.pos() as i64;
            RawOperand::Switch(displacements.into_iter().map(|d| base + d).collect())
        }
    };

    // Code offsets are bounded by the u32 code size of the header
    #[allow(clippy::cast_possible_truncation)]
    let instruction = RawInstruction {
        offset: start as u32,
        size: (parser.pos() - start) as u32,
        opcode,
        operand,
    };
    Ok(instruction)
}

/// Decodes a linear instruction stream until the end of `code`.
///
/// # Errors
/// Returns an error if any instruction fails to decode.
pub fn decode_stream(code: &[u8]) -> Result<Vec<RawInstruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    Ok(instructions)
}

/// Decodes a serialized method body into an editable [`MethodBody`].
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the header is invalid, an opcode is undefined, or a
/// branch or exception handler boundary does not land on an instruction boundary; returns
/// [`crate::Error::OutOfBounds`] for truncated bodies.
pub fn decode_body(data: &[u8]) -> Result<MethodBody> {
    let header = MethodHeader::parse(data)?;
    let code = header.code(data)?;
    let raw = decode_stream(code)?;

    let mut body = MethodBody::new();
    body.max_stack = header.max_stack;
    body.local_var_sig_token = header.local_var_sig_token;
    body.init_locals = header.init_locals;

    let starts: HashMap<u32, InstrId> = raw
        .iter()
        .enumerate()
        .map(|(slot, instruction)| (instruction.offset, body.id_for_slot(slot)))
        .collect();

    let resolve = |from: u32, target: i64| -> Result<InstrId> {
        u32::try_from(target)
            .ok()
            .and_then(|target| starts.get(&target).copied())
            .ok_or_else(|| {
                malformed_error!(
                    "Branch at offset {:#x} targets {:#x}, which is not an instruction",
                    from,
                    target
                )
            })
    };

    let mut instructions = Vec::with_capacity(raw.len());
    for instruction in raw {
        let operand = match instruction.operand {
            RawOperand::Plain(operand) => operand,
            RawOperand::Target(target) => Operand::Target(resolve(instruction.offset, target)?),
            RawOperand::Switch(targets) => Operand::Switch(
                targets
                    .into_iter()
                    .map(|target| resolve(instruction.offset, target))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        instructions.push(Instruction {
            opcode: instruction.opcode,
            operand,
            offset: Some(instruction.offset),
        });
    }

    for instruction in instructions {
        body.push_unchecked(instruction);
    }

    // Code size is u32 in the header
    #[allow(clippy::cast_possible_truncation)]
    let code_size = code.len() as u32;
    for clause in &header.clauses {
        body.exception_handlers
            .push(resolve_clause(clause, &starts, code_size)?);
    }

    Ok(body)
}

fn resolve_clause(
    clause: &ExceptionClause,
    starts: &HashMap<u32, InstrId>,
    code_size: u32,
) -> Result<ExceptionHandler> {
    let start = |offset: u32| {
        starts.get(&offset).copied().ok_or_else(|| {
            malformed_error!(
                "Exception handler boundary {:#x} is not an instruction",
                offset
            )
        })
    };

    let end = |offset: u32, length: u32| -> Result<Option<InstrId>> {
        let Some(end) = offset.checked_add(length) else {
            return Err(malformed_error!("Exception handler range overflows"));
        };
        if end == code_size {
            Ok(None)
        } else {
            start(end).map(Some)
        }
    };

    let is_filter = clause.flags.contains(ExceptionHandlerFlags::FILTER);
    Ok(ExceptionHandler {
        flags: clause.flags,
        try_start: start(clause.try_offset)?,
        try_end: end(clause.try_offset, clause.try_length)?,
        handler_start: start(clause.handler_offset)?,
        handler_end: end(clause.handler_offset, clause.handler_length)?,
        filter_start: if is_filter {
            Some(start(clause.class_token_or_filter)?)
        } else {
            None
        },
        class_token: if is_filter {
            Token::new(0)
        } else {
            Token::new(clause.class_token_or_filter)
        },
    })
}
