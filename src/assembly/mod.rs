//! CIL bytecode: opcodes, instructions and the codec between bytes and editable bodies.
//!
//! # Key Types
//! - [`OpCode`] - Every ECMA-335 opcode with its operand kind, flow and stack behaviour
//! - [`Instruction`] - One instruction of an editable body
//! - [`Operand`] - Instruction operands (immediates, tokens, branch targets)
//!
//! # Main Functions
//! - [`decode_body`] - Serialized body to [`crate::metadata::method::MethodBody`]
//! - [`encode_body`] - [`crate::metadata::method::MethodBody`] back to bytes
//!
//! # Example
//! ```rust
//! use ilpatch::assembly::{decode_body, encode_body, SignatureResolver};
//! use ilpatch::metadata::{method::MethodSignature, token::Token};
//!
//! struct NoCalls;
//! impl SignatureResolver for NoCalls {
//!     fn method_signature(&self, _: Token) -> Option<&MethodSignature> {
//!         None
//!     }
//! }
//!
//! let data = [0x0A, 0x00, 0x2A]; // nop, ret
//! let body = decode_body(&data)?;
//! assert_eq!(encode_body(&body, &NoCalls, false)?, data);
//! # Ok::<(), ilpatch::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod opcodes;

pub use decoder::{decode_body, decode_instruction, decode_stream, RawInstruction, RawOperand};
pub use encoder::{encode_body, SignatureResolver};
pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType, StackCount};
pub use opcodes::{OpCode, FE_PREFIX};
