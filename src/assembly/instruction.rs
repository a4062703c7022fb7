//! CIL instruction representation and operand types.
//!
//! An [`Instruction`] is an opcode, its operand, and the byte offset it was decoded from.
//! Unlike a flat disassembly listing, branch operands do not hold displacements: they hold
//! [`InstrId`] handles to the instructions they jump to, so a method body can be edited
//! without recomputing any jump until it is encoded again.
//!
//! # Key Components
//!
//! - [`Instruction`] - One instruction of a method body
//! - [`Operand`] - Typed operand, including handle-based branch targets
//! - [`Immediate`] - Literal values embedded in the instruction stream
//! - [`OperandType`] / [`FlowType`] / [`StackCount`] - Static opcode properties
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::assembly::{Immediate, Instruction, OpCode, Operand};
//!
//! let load = Instruction::new(OpCode::LDC_R4, Operand::Immediate(Immediate::Float32(0.0001)))?;
//! assert_eq!(load.size(), 5);
//! assert_eq!(load.to_string(), "IL_????: ldc.r4 0.0001");
//!
//! // The operand must fit the opcode
//! assert!(Instruction::new(OpCode::LDC_R4, Operand::None).is_err());
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::fmt;

use strum::{EnumIter, IntoStaticStr};

use crate::{
    assembly::OpCode, metadata::method::InstrId, metadata::token::Token, Error::OperandMismatch,
    Result,
};

/// Types of operands for CIL instructions.
///
/// Each variant corresponds to the encoded form of the operand following the opcode bytes.
/// Branch operands are split into their short (1 byte) and long (4 byte) encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Branch target with a signed 8-bit displacement
    ShortTarget,
    /// Branch target with a signed 32-bit displacement
    Target,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Returns the encoded size of this operand, or `None` for a switch table whose size
    /// depends on the number of cases.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::ShortTarget => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32
            | OperandType::Float32
            | OperandType::Token
            | OperandType::Target => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }

    /// Returns true for both branch target encodings.
    #[must_use]
    pub fn is_target(&self) -> bool {
        matches!(self, OperandType::ShortTarget | OperandType::Target)
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally, fault or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

impl FlowType {
    /// Returns true if execution can continue with the next instruction in the list.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            FlowType::Sequential
                | FlowType::ConditionalBranch
                | FlowType::Call
                | FlowType::Switch
        )
    }
}

/// Number of evaluation stack slots an opcode pops or pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCount {
    /// Always the same number of slots
    Fixed(u8),
    /// Depends on the signature of the called or current method
    Variable,
}

/// Literal value embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    /// The operand encoding this literal requires.
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            Immediate::Int8(_) => OperandType::Int8,
            Immediate::UInt8(_) => OperandType::UInt8,
            Immediate::UInt16(_) => OperandType::UInt16,
            Immediate::Int32(_) => OperandType::Int32,
            Immediate::Int64(_) => OperandType::Int64,
            Immediate::Float32(_) => OperandType::Float32,
            Immediate::Float64(_) => OperandType::Float64,
        }
    }

    /// Bitwise equality.
    ///
    /// Float literals are compared by their encoding, so a `NaN` literal equals itself and
    /// `0.0` differs from `-0.0`. This is what a patch site cares about: the bytes.
    #[must_use]
    pub fn same_bits(&self, other: &Immediate) -> bool {
        match (self, other) {
            (Immediate::Float32(a), Immediate::Float32(b)) => a.to_bits() == b.to_bits(),
            (Immediate::Float64(a), Immediate::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// The operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Metadata token reference
    Token(Token),
    /// Branch target
    Target(InstrId),
    /// Switch table, one target per case
    Switch(Vec<InstrId>),
}

impl Operand {
    /// All instructions this operand jumps to.
    #[must_use]
    pub fn targets(&self) -> &[InstrId] {
        match self {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// Structural equality, with float literals compared bitwise.
    #[must_use]
    pub fn same_as(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::Immediate(a), Operand::Immediate(b)) => a.same_bits(b),
            _ => self == other,
        }
    }

    /// Checks that this operand can be encoded with `opcode`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OperandMismatch`] naming the operand kind the opcode requires.
    pub fn check(&self, opcode: OpCode) -> Result<()> {
        let expected = opcode.operand_type();
        let fits = match (expected, self) {
            (OperandType::None, Operand::None)
            | (OperandType::ShortTarget | OperandType::Target, Operand::Target(_))
            | (OperandType::Switch, Operand::Switch(_)) => true,
            (OperandType::Token, Operand::Token(token)) => {
                // ldstr is the only opcode that takes a user string token
                (opcode == OpCode::LDSTR) == (token.table() == Token::USER_STRING)
            }
            (_, Operand::Immediate(value)) => value.operand_type() == expected,
            _ => false,
        };

        if fits {
            Ok(())
        } else {
            Err(OperandMismatch {
                opcode: opcode.mnemonic(),
                expected: expected.into(),
            })
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Token(token) => write!(f, "{token}"),
            Operand::Target(target) => write!(f, "{target}"),
            Operand::Switch(targets) => {
                write!(f, "(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single CIL instruction of a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// The operand, already validated against `opcode`
    pub operand: Operand,
    /// Byte offset this instruction was decoded from, `None` if it was created by an edit
    pub offset: Option<u32>,
}

impl Instruction {
    /// Creates a new instruction that has no original offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::OperandMismatch`] if the operand does not fit the opcode.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        operand.check(opcode)?;
        Ok(Instruction {
            opcode,
            operand,
            offset: None,
        })
    }

    /// Encoded size in bytes in the current opcode form.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match (&self.operand, self.opcode.operand_type().size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 0,
        };
        self.opcode.size() + operand
    }

    /// Returns true if this is a method call (`call`, `callvirt`, `newobj`) of `method`.
    #[must_use]
    pub fn calls(&self, method: Token) -> bool {
        self.opcode.flow() == FlowType::Call && self.operand == Operand::Token(method)
    }

    /// Short description of the instruction's shape, used in drift reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.operand {
            Operand::None => self.opcode.mnemonic().to_string(),
            _ => format!("{} {}", self.opcode.mnemonic(), self.operand),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "IL_{offset:04x}: ")?,
            None => write!(f, "IL_????: ")?,
        }
        write!(f, "{}", self.describe())
    }
}
