//! Locating instructions in a method body.
//!
//! Patches address code the way a disassembler listing shows it: by original byte offset
//! (`IL_0129`) or by position in the instruction list. Both are only meaningful for the build
//! the patch was written against, and offsets only until the first size-changing edit. The
//! cursor therefore refuses offset lookups on a shifted body with
//! [`crate::Error::StaleOffsets`]; procedures resolve every site up front and then edit
//! through handles.

use crate::{
    assembly::{Instruction, OpCode},
    metadata::method::{InstrId, MethodBody},
    patch::pattern::{assert_opcode, InstructionPattern},
    Error::{OffsetNotFound, StaleOffsets},
    Result,
};

/// Read-only lookups over one body.
///
/// # Examples
///
/// ```rust
/// use ilpatch::assembly::decode_body;
/// use ilpatch::patch::InstructionCursor;
///
/// // nop; ldc.r4 1.0; pop; ret
/// let data = [0x22, 0x00, 0x22, 0x00, 0x00, 0x80, 0x3F, 0x26, 0x2A];
/// let body = decode_body(&data)?;
/// let cursor = InstructionCursor::new(&body);
///
/// let site = cursor.find_by_offset(0x0001)?;
/// assert_eq!(cursor.at_index(1)?, site);
/// assert!(cursor.find_by_offset(0x0002).is_err());
/// # Ok::<(), ilpatch::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct InstructionCursor<'a> {
    body: &'a MethodBody,
}

impl<'a> InstructionCursor<'a> {
    /// Creates a cursor over `body`.
    #[must_use]
    pub fn new(body: &'a MethodBody) -> Self {
        InstructionCursor { body }
    }

    /// The instruction that started at `offset` in the original code.
    ///
    /// # Errors
    /// Returns [`crate::Error::StaleOffsets`] if the body was shifted by an edit and
    /// [`crate::Error::OffsetNotFound`] if no instruction started there.
    pub fn find_by_offset(&self, offset: u32) -> Result<InstrId> {
        self.check_fresh()?;
        self.body
            .iter()
            .find(|(_, instruction)| instruction.offset == Some(offset))
            .map(|(id, _)| id)
            .ok_or(OffsetNotFound(offset))
    }

    /// The instruction at list position `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IndexOutOfRange`] if the list is shorter.
    pub fn at_index(&self, index: usize) -> Result<InstrId> {
        self.body.at(index)
    }

    /// The first instruction, in list order, for which `predicate` holds.
    pub fn find(&self, predicate: impl Fn(&Instruction) -> bool) -> Option<InstrId> {
        self.body
            .iter()
            .find(|(_, instruction)| predicate(instruction))
            .map(|(id, _)| id)
    }

    /// Resolves several offsets in one forward pass.
    ///
    /// The offsets are sorted ascending first; the result pairs each offset with its
    /// instruction in that order.
    ///
    /// # Errors
    /// Returns [`crate::Error::StaleOffsets`] for a shifted body and
    /// [`crate::Error::OffsetNotFound`] naming the first offset that did not match.
    pub fn locate_offsets(&self, offsets: &[u32]) -> Result<Vec<(u32, InstrId)>> {
        self.check_fresh()?;

        let mut sorted = offsets.to_vec();
        sorted.sort_unstable();

        let found = self.scan_offsets(&sorted);
        sorted
            .into_iter()
            .zip(found)
            .map(|(offset, id)| id.map(|id| (offset, id)).ok_or(OffsetNotFound(offset)))
            .collect()
    }

    /// Matches ascending `sorted` offsets against the list in one pass. Offsets without an
    /// instruction yield `None`.
    pub(crate) fn scan_offsets(&self, sorted: &[u32]) -> Vec<Option<InstrId>> {
        let mut found = vec![None; sorted.len()];
        let mut next = 0;

        for (id, instruction) in self.body.iter() {
            let Some(offset) = instruction.offset else {
                continue;
            };
            while next < sorted.len() && sorted[next] < offset {
                next += 1;
            }
            while next < sorted.len() && sorted[next] == offset {
                found[next] = Some(id);
                next += 1;
            }
            if next == sorted.len() {
                break;
            }
        }

        found
    }

    /// Checks the opcode of the instruction at list position `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::VersionDrift`] describing the mismatch, or
    /// [`crate::Error::IndexOutOfRange`] if there is no such position.
    pub fn expect_opcode(&self, index: usize, expected: OpCode) -> Result<InstrId> {
        let id = self.at_index(index)?;
        let instruction = self.body.instruction(id)?;
        assert_opcode(instruction, expected).map_err(|drift| drift.at_index(index))?;
        Ok(id)
    }

    /// Checks the instruction at list position `index` against `pattern`.
    ///
    /// # Errors
    /// See [`InstructionCursor::expect_opcode`].
    pub fn expect(&self, index: usize, pattern: &InstructionPattern) -> Result<InstrId> {
        let id = self.at_index(index)?;
        let instruction = self.body.instruction(id)?;
        pattern
            .check(instruction)
            .map_err(|drift| drift.at_index(index))?;
        Ok(id)
    }

    fn check_fresh(&self) -> Result<()> {
        if self.body.is_shifted() {
            Err(StaleOffsets)
        } else {
            Ok(())
        }
    }
}
