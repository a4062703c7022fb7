//! Editable method bodies.
//!
//! A [`MethodBody`] stores its instructions in an arena of slots plus a separate list that
//! orders them. An [`InstrId`] names one slot of one body and never changes meaning: inserting
//! instructions only adds slots and reorders the list, so every branch operand and exception
//! handler boundary that holds a handle keeps pointing at the same instruction through any
//! number of edits.
//!
//! Handles also carry the identity of the body that issued them. Using a handle with a
//! different body is rejected with [`crate::Error::ForeignInstruction`] instead of silently
//! addressing an unrelated slot.
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::assembly::{Instruction, OpCode, Operand};
//! use ilpatch::metadata::method::MethodBody;
//!
//! let mut body = MethodBody::new();
//! let first = body.push(Instruction::new(OpCode::NOP, Operand::None)?)?;
//! let ret = body.push(Instruction::new(OpCode::RET, Operand::None)?)?;
//!
//! assert_eq!(body.len(), 2);
//! assert_eq!(body.position(ret), Some(1));
//! assert_eq!(body.at(0)?, first);
//! assert!(!MethodBody::new().contains(first));
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::{method::ExceptionHandler, token::Token},
    Error::{DanglingTarget, ForeignInstruction, IndexOutOfRange, StaleAnchor},
    Result,
};

static NEXT_BODY_ID: AtomicU32 = AtomicU32::new(1);

/// Stable handle of one instruction within one [`MethodBody`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId {
    body: u32,
    slot: u32,
}

impl InstrId {
    /// Arena slot of the instruction; unrelated to its position in the list.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstrId(body: {}, slot: {})", self.body, self.slot)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.slot)
    }
}

struct Slot {
    instruction: Instruction,
    attached: bool,
}

/// The code of one method: instructions, stack size, locals and exception handlers.
pub struct MethodBody {
    id: u32,
    slots: Vec<Slot>,
    order: Vec<u32>,
    /// Maximum evaluation stack depth declared by the header
    pub max_stack: u16,
    /// Local variable signature, null if the method has no locals
    pub local_var_sig_token: Token,
    /// Locals are zero-initialized on entry
    pub init_locals: bool,
    /// Protected regions, in the order the runtime should search them
    pub exception_handlers: Vec<ExceptionHandler>,
    shifted: bool,
}

impl MethodBody {
    /// Creates an empty body with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            id: NEXT_BODY_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            order: Vec::new(),
            max_stack: 0,
            local_var_sig_token: Token::new(0),
            init_locals: false,
            exception_handlers: Vec::new(),
            shifted: false,
        }
    }

    /// The handle that the instruction in arena slot `slot` has, or will have.
    ///
    /// Lets decoders and builders refer to instructions before they are added.
    #[must_use]
    pub(crate) fn id_for_slot(&self, slot: usize) -> InstrId {
        InstrId {
            body: self.id,
            // Arena sizes are bounded by code size, far below u32::MAX
            #[allow(clippy::cast_possible_truncation)]
            slot: slot as u32,
        }
    }

    /// Number of arena slots, attached or not.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of instructions in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles of all instructions, in list order.
    pub fn ids(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.order.iter().map(|&slot| InstrId {
            body: self.id,
            slot,
        })
    }

    /// All instructions with their handles, in list order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        self.order.iter().map(|&slot| {
            (
                InstrId {
                    body: self.id,
                    slot,
                },
                &self.slots[slot as usize].instruction,
            )
        })
    }

    /// Returns true if `id` was issued by this body, attached or not.
    #[must_use]
    pub fn owns(&self, id: InstrId) -> bool {
        id.body == self.id && id.slot() < self.slots.len()
    }

    /// Returns true if `id` is an instruction currently in this body's list.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.owns(id) && self.slots[id.slot()].attached
    }

    /// The instruction behind `id`, if it is currently in the list.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        if self.contains(id) {
            Some(&self.slots[id.slot()].instruction)
        } else {
            None
        }
    }

    /// The instruction behind `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ForeignInstruction`] for a handle of another body and
    /// [`crate::Error::StaleAnchor`] for an instruction that was removed.
    pub fn instruction(&self, id: InstrId) -> Result<&Instruction> {
        self.check_attached(id)?;
        Ok(&self.slots[id.slot()].instruction)
    }

    /// Handle of the instruction at list position `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IndexOutOfRange`] if the list is shorter.
    pub fn at(&self, index: usize) -> Result<InstrId> {
        self.order
            .get(index)
            .map(|&slot| InstrId {
                body: self.id,
                slot,
            })
            .ok_or(IndexOutOfRange(index))
    }

    /// List position of `id`, if it is in the list.
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.order.iter().position(|&slot| slot == id.slot)
    }

    /// Number of branch operands and handler boundaries that reference `id`.
    #[must_use]
    pub fn referrers(&self, id: InstrId) -> usize {
        let branches: usize = self
            .iter()
            .map(|(_, instruction)| {
                instruction
                    .operand
                    .targets()
                    .iter()
                    .filter(|&&target| target == id)
                    .count()
            })
            .sum();

        let handlers: usize = self
            .exception_handlers
            .iter()
            .map(|handler| handler.boundaries().filter(|&b| b == id).count())
            .sum();

        branches + handlers
    }

    /// Returns true once an edit has changed the encoded size of any instruction, making the
    /// recorded original offsets unusable for lookups.
    #[must_use]
    pub fn is_shifted(&self) -> bool {
        self.shifted
    }

    /// Appends an instruction to the end of the list.
    ///
    /// Branch targets must already be in the body; use a
    /// [`crate::patch::Sequence`] to build code with forward jumps.
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingTarget`] or [`crate::Error::ForeignInstruction`] if a
    /// branch target is not an instruction of this body.
    pub fn push(&mut self, instruction: Instruction) -> Result<InstrId> {
        self.check_targets(&instruction.operand)?;
        if instruction.offset.is_none() {
            self.shifted = true;
        }
        Ok(self.push_unchecked(instruction))
    }

    /// Appends without validating targets. Used by the decoder, which resolves targets to
    /// slots that are only filled later.
    pub(crate) fn push_unchecked(&mut self, instruction: Instruction) -> InstrId {
        let id = self.id_for_slot(self.slots.len());
        self.slots.push(Slot {
            instruction,
            attached: true,
        });
        self.order.push(id.slot);
        id
    }

    /// Overwrites the opcode and operand behind `id`.
    pub(crate) fn set(&mut self, id: InstrId, opcode: OpCode, operand: Operand) -> Result<()> {
        self.check_attached(id)?;
        let slot = &mut self.slots[id.slot()].instruction;
        slot.opcode = opcode;
        slot.operand = operand;
        Ok(())
    }

    /// Inserts `instructions` directly after list position `position`. Slots are allocated in
    /// the order given, so handles can be predicted with [`MethodBody::id_for_slot`].
    pub(crate) fn insert_after(
        &mut self,
        position: usize,
        instructions: Vec<Instruction>,
    ) -> Vec<InstrId> {
        let first_slot = self.slots.len();
        let ids: Vec<InstrId> = (0..instructions.len())
            .map(|i| self.id_for_slot(first_slot + i))
            .collect();

        self.slots
            .extend(instructions.into_iter().map(|instruction| Slot {
                instruction,
                attached: true,
            }));

        let at = (position + 1).min(self.order.len());
        self.order
            .splice(at..at, ids.iter().map(|id| id.slot));

        self.shifted = true;
        ids
    }

    /// Takes `id` out of the list. The slot stays allocated so the handle reports
    /// [`crate::Error::StaleAnchor`] from then on.
    pub(crate) fn detach(&mut self, id: InstrId) -> Result<()> {
        self.check_attached(id)?;
        let position = self.position(id).ok_or(StaleAnchor)?;
        self.order.remove(position);
        self.slots[id.slot()].attached = false;
        self.shifted = true;
        Ok(())
    }

    pub(crate) fn mark_shifted(&mut self) {
        self.shifted = true;
    }

    /// Fails unless `id` is an attached instruction of this body.
    pub(crate) fn check_attached(&self, id: InstrId) -> Result<()> {
        if !self.owns(id) {
            return Err(ForeignInstruction);
        }
        if !self.slots[id.slot()].attached {
            return Err(StaleAnchor);
        }
        Ok(())
    }

    /// Fails unless every branch target of `operand` is an attached instruction of this body.
    pub(crate) fn check_targets(&self, operand: &Operand) -> Result<()> {
        for &target in operand.targets() {
            if !self.owns(target) {
                return Err(ForeignInstruction);
            }
            if !self.slots[target.slot()].attached {
                return Err(DanglingTarget);
            }
        }
        Ok(())
    }
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody::new()
    }
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBody")
            .field("id", &self.id)
            .field("instructions", &self.len())
            .field("max_stack", &self.max_stack)
            .field("exception_handlers", &self.exception_handlers.len())
            .field("shifted", &self.shifted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Immediate, OpCode};
    use crate::metadata::method::ExceptionHandlerFlags;

    fn nop() -> Instruction {
        Instruction::new(OpCode::NOP, Operand::None).unwrap()
    }

    #[test]
    fn handles_are_body_specific() {
        let mut a = MethodBody::new();
        let b = MethodBody::new();

        let id = a.push(nop()).unwrap();
        assert!(a.contains(id));
        assert!(!b.contains(id));
        assert!(matches!(b.instruction(id), Err(ForeignInstruction)));
        assert!(matches!(b.at(0), Err(IndexOutOfRange(0))));
    }

    #[test]
    fn insert_keeps_handles() {
        let mut body = MethodBody::new();
        let first = body.push(nop()).unwrap();
        let last = body
            .push(Instruction::new(OpCode::BR, Operand::Target(first)).unwrap())
            .unwrap();

        let inserted = body.insert_after(
            0,
            vec![
                Instruction::new(OpCode::LDC_I4_S, Operand::Immediate(Immediate::Int8(1)))
                    .unwrap(),
                Instruction::new(OpCode::POP, Operand::None).unwrap(),
            ],
        );

        assert_eq!(inserted.len(), 2);
        assert_eq!(body.len(), 4);
        assert_eq!(body.position(first), Some(0));
        assert_eq!(body.position(inserted[0]), Some(1));
        assert_eq!(body.position(inserted[1]), Some(2));
        assert_eq!(body.position(last), Some(3));
        assert_eq!(
            body.instruction(last).unwrap().operand,
            Operand::Target(first)
        );
        assert!(body.is_shifted());
    }

    #[test]
    fn push_rejects_dangling_target() {
        let mut body = MethodBody::new();
        let other = MethodBody::new();
        let foreign = other.id_for_slot(0);

        let result = body.push(Instruction::new(OpCode::BR, Operand::Target(foreign)).unwrap());
        assert!(matches!(result, Err(ForeignInstruction)));

        let unborn = body.id_for_slot(5);
        let result = body.push(Instruction::new(OpCode::BR, Operand::Target(unborn)).unwrap());
        assert!(matches!(result, Err(ForeignInstruction)));
    }

    #[test]
    fn detach() {
        let mut body = MethodBody::new();
        let first = body.push(nop()).unwrap();
        let second = body.push(nop()).unwrap();

        body.detach(first).unwrap();
        assert_eq!(body.len(), 1);
        assert!(!body.contains(first));
        assert!(body.owns(first));
        assert!(matches!(body.instruction(first), Err(StaleAnchor)));
        assert!(matches!(body.detach(first), Err(StaleAnchor)));
        assert_eq!(body.at(0).unwrap(), second);
    }

    #[test]
    fn referrers() {
        let mut body = MethodBody::new();
        let target = body.push(nop()).unwrap();
        let end = body.push(nop()).unwrap();
        body.push(Instruction::new(OpCode::BR_S, Operand::Target(target)).unwrap())
            .unwrap();
        body.push(Instruction::new(OpCode::SWITCH, Operand::Switch(vec![target, end])).unwrap())
            .unwrap();
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: target,
            try_end: Some(end),
            handler_start: end,
            handler_end: None,
            filter_start: None,
            class_token: Token::new(0),
        });

        assert_eq!(body.referrers(target), 3);
        assert_eq!(body.referrers(end), 3);
    }
}
