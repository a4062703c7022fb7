//! # ilpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ilpatch library. Import this module to get quick access to the essential
//! types for writing and running patches.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ilpatch operations
pub use crate::Error;

/// The result type used throughout ilpatch
pub use crate::Result;

/// A single expected/actual mismatch
pub use crate::Drift;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Metadata
// ================================================================================================

/// Modules and the reference modules imports resolve against
pub use crate::metadata::{Module, References};

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Methods and their editable bodies
pub use crate::metadata::method::{
    ExceptionHandler, InstrId, Method, MethodAttributes, MethodBody, MethodSignature,
};

/// Cross-module references
pub use crate::metadata::imports::{MemberRef, Symbol, TypeRef};

// ================================================================================================
// Instructions
// ================================================================================================

/// Opcodes, instructions and operands
pub use crate::assembly::{FlowType, Immediate, Instruction, OpCode, Operand};

/// Body decoding and encoding
pub use crate::assembly::{decode_body, encode_body};

// ================================================================================================
// Patch Engine
// ================================================================================================

/// Locating and asserting instructions
pub use crate::patch::{assert_opcode, InstructionCursor, InstructionPattern, OperandPattern};

/// Editing bodies
pub use crate::patch::{remove, replace, splice_after, Label, Sequence, Spliced, Target};

/// Declarative patches
pub use crate::patch::{Locator, PatchDescriptor, Site, SiteAction};

/// Running patches
pub use crate::patch::{Patch, PatchContext, PatchOutcome, PatchReport, PatchSession, PatchSet};
