//! Expected instruction shapes.

use crate::{
    assembly::{Instruction, OpCode, Operand},
    Drift,
};

/// What an operand must look like for a site to match.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandPattern {
    /// Any operand
    Any,
    /// Exactly this operand; float literals compare bitwise
    Equals(Operand),
    /// Anything but this operand
    NotEquals(Operand),
}

impl OperandPattern {
    /// Returns true if `operand` satisfies the pattern.
    #[must_use]
    pub fn matches(&self, operand: &Operand) -> bool {
        match self {
            OperandPattern::Any => true,
            OperandPattern::Equals(expected) => operand.same_as(expected),
            OperandPattern::NotEquals(excluded) => !operand.same_as(excluded),
        }
    }
}

/// An opcode plus an operand constraint.
///
/// # Examples
///
/// ```rust
/// use ilpatch::assembly::{Immediate, Instruction, OpCode, Operand};
/// use ilpatch::patch::{InstructionPattern, OperandPattern};
///
/// let pattern = InstructionPattern::new(
///     OpCode::LDC_R4,
///     OperandPattern::NotEquals(Operand::Immediate(Immediate::Float32(0.0001))),
/// );
///
/// let original = Instruction::new(OpCode::LDC_R4, Operand::Immediate(Immediate::Float32(1.5)))?;
/// assert!(pattern.matches(&original));
/// assert_eq!(pattern.describe(), "ldc.r4 != 0.0001");
/// # Ok::<(), ilpatch::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionPattern {
    /// Required opcode
    pub opcode: OpCode,
    /// Operand constraint
    pub operand: OperandPattern,
}

impl InstructionPattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new(opcode: OpCode, operand: OperandPattern) -> Self {
        InstructionPattern { opcode, operand }
    }

    /// A pattern that only checks the opcode.
    #[must_use]
    pub fn opcode(opcode: OpCode) -> Self {
        InstructionPattern {
            opcode,
            operand: OperandPattern::Any,
        }
    }

    /// Returns true if `instruction` has this shape.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction) -> bool {
        instruction.opcode == self.opcode && self.operand.matches(&instruction.operand)
    }

    /// Compares `instruction` against the pattern.
    ///
    /// # Errors
    /// Returns a [`Drift`] located at the instruction's original offset when it does not match.
    pub fn check(&self, instruction: &Instruction) -> Result<(), Drift> {
        if self.matches(instruction) {
            return Ok(());
        }
        let drift = Drift::new(self.describe(), instruction.describe());
        Err(match instruction.offset {
            Some(offset) => drift.at_offset(offset),
            None => drift,
        })
    }

    /// Human-readable form used in drift reports.
    #[must_use]
    pub fn describe(&self) -> String {
        let mnemonic = self.opcode.mnemonic();
        match &self.operand {
            OperandPattern::Any => mnemonic.to_string(),
            OperandPattern::Equals(operand) => format!("{mnemonic} {operand}"),
            OperandPattern::NotEquals(operand) => format!("{mnemonic} != {operand}"),
        }
    }
}

/// Checks only the opcode of `instruction`.
///
/// # Errors
/// Returns a [`Drift`] naming both opcodes when they differ.
pub fn assert_opcode(instruction: &Instruction, expected: OpCode) -> Result<(), Drift> {
    InstructionPattern::opcode(expected).check(instruction)
}
