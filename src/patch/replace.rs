//! In-place instruction edits.
//!
//! A replacement keeps the instruction's handle, so branches and exception handlers that point
//! at it now point at the new instruction. Removal is only allowed for instructions nothing
//! points at.

use log::debug;

use crate::{
    assembly::Instruction,
    metadata::method::{InstrId, MethodBody},
    Error::InstructionInUse,
    Result,
};

/// Replaces the opcode and operand of the instruction at `at` with those of `with`.
///
/// The original offset of `at` is kept for diagnostics. If the encoded size changes, the body
/// is marked shifted and offset lookups stop working.
///
/// # Errors
/// Returns [`crate::Error::StaleAnchor`] or [`crate::Error::ForeignInstruction`] if `at` is not
/// an instruction of `body`, and [`crate::Error::DanglingTarget`] if `with` branches to an
/// instruction outside the body.
///
/// # Examples
///
/// ```rust
/// use ilpatch::assembly::{decode_body, Immediate, Instruction, OpCode, Operand};
/// use ilpatch::patch::replace;
///
/// // ldc.r4 1.0; pop; ret
/// let mut body = decode_body(&[0x1E, 0x22, 0x00, 0x00, 0x80, 0x3F, 0x26, 0x2A])?;
/// let site = body.at(0)?;
///
/// let tiny = Instruction::new(OpCode::LDC_R4, Operand::Immediate(Immediate::Float32(0.0001)))?;
/// replace(&mut body, site, tiny)?;
///
/// assert_eq!(body.at(0)?, site);
/// assert!(!body.is_shifted());
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub fn replace(body: &mut MethodBody, at: InstrId, with: Instruction) -> Result<()> {
    let old_size = body.instruction(at)?.size();
    body.check_targets(&with.operand)?;

    let new_size = with.size();
    debug!(
        "Replacing {} with {}",
        body.instruction(at)?,
        with.describe()
    );
    body.set(at, with.opcode, with.operand)?;

    if new_size != old_size {
        body.mark_shifted();
    }
    Ok(())
}

/// Removes the instruction at `id` from the body.
///
/// # Errors
/// Returns [`crate::Error::InstructionInUse`] if a branch or exception handler still references
/// it, and [`crate::Error::StaleAnchor`] or [`crate::Error::ForeignInstruction`] if `id` is not
/// an instruction of `body`.
pub fn remove(body: &mut MethodBody, id: InstrId) -> Result<()> {
    body.check_attached(id)?;

    let referrers = body.referrers(id);
    if referrers > 0 {
        return Err(InstructionInUse(referrers));
    }

    debug!("Removing {}", body.instruction(id)?);
    body.detach(id)
}
