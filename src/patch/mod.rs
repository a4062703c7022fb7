//! The patch engine.
//!
//! Patches are written against one exact build of a target module. Every edit is guarded by
//! an assertion about what the code looks like before the edit, and a patch that finds
//! anything else fails with a drift error instead of changing the module.
//!
//! # Architecture
//!
//! - **Locate**: [`InstructionCursor`] finds instructions by original offset, list index or
//!   predicate
//! - **Assert**: [`InstructionPattern`] and [`assert_opcode`] describe the expected shape and
//!   produce a [`crate::Drift`] on mismatch
//! - **Edit**: [`replace`], [`remove`] and [`splice_after`] change a body through
//!   instruction handles, so branches and exception handlers stay linked
//! - **Orchestrate**: [`Patch`] procedures, declarative [`PatchDescriptor`]s, the ordered
//!   [`PatchSet`] and the file-level [`PatchSession`]
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::assembly::{decode_body, OpCode, Operand};
//! use ilpatch::patch::{splice_after, InstructionCursor, Sequence};
//!
//! // ldarg.0; pop; ret
//! let mut body = decode_body(&[0x0E, 0x02, 0x26, 0x2A])?;
//! let cursor = InstructionCursor::new(&body);
//! let anchor = cursor.expect_opcode(1, OpCode::POP)?;
//!
//! let mut sequence = Sequence::new();
//! sequence.emit(OpCode::NOP, Operand::None);
//! splice_after(&mut body, anchor, sequence)?;
//!
//! assert_eq!(body.len(), 4);
//! assert!(body.is_shifted());
//! # Ok::<(), ilpatch::Error>(())
//! ```

mod cursor;
mod descriptor;
mod pattern;
mod replace;
mod session;
mod set;
mod splice;

pub use cursor::InstructionCursor;
pub use descriptor::{Locator, PatchDescriptor, Site, SiteAction};
pub use pattern::{assert_opcode, InstructionPattern, OperandPattern};
pub use replace::{remove, replace};
pub use session::{PatchReport, PatchSession};
pub use set::{Patch, PatchContext, PatchOutcome, PatchSet};
pub use splice::{splice_after, Label, Sequence, Spliced, Target};
