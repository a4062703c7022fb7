//! Multi-instruction insertion.
//!
//! New code is assembled in a [`Sequence`] first. Instructions in a sequence can branch to
//! each other through [`Label`]s, forward or backward, and to instructions that already exist
//! in the body. [`splice_after`] then checks the whole sequence against the body and inserts it
//! in one step, so a failing splice never leaves half an insertion behind.
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::assembly::{decode_body, Immediate, OpCode, Operand};
//! use ilpatch::patch::{splice_after, Sequence};
//!
//! // ldc.i4.0; pop; ret
//! let mut body = decode_body(&[0x0E, 0x16, 0x26, 0x2A])?;
//! let anchor = body.at(1)?;
//! let resume = body.at(2)?;
//!
//! let mut sequence = Sequence::new();
//! let skip = sequence.label();
//! sequence
//!     .emit(OpCode::LDC_I4_S, Operand::Immediate(Immediate::Int8(7)))
//!     .branch(OpCode::BRTRUE_S, skip)
//!     .emit(OpCode::NOP, Operand::None)
//!     .bind(skip)
//!     .branch(OpCode::BR_S, resume);
//!
//! let spliced = splice_after(&mut body, anchor, sequence)?;
//! assert_eq!(body.len(), 7);
//! assert_eq!(body.position(spliced.first()), Some(2));
//! assert_eq!(body.position(resume), Some(6));
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::method::{InstrId, MethodBody},
    Error::{self, ForeignLabel, InvalidDescriptor, StaleAnchor, UnboundLabel},
    Result,
};

static NEXT_SEQUENCE_ID: AtomicU32 = AtomicU32::new(1);

/// Placeholder for an instruction of a [`Sequence`], usable as a branch target before the
/// instruction it names has been emitted.
///
/// A label is only valid in the sequence that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    sequence: u32,
    index: usize,
}

/// Where a sequence branch goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An instruction of the same sequence
    Label(Label),
    /// An instruction already in the body
    Existing(InstrId),
}

impl From<Label> for Target {
    fn from(label: Label) -> Self {
        Target::Label(label)
    }
}

impl From<InstrId> for Target {
    fn from(id: InstrId) -> Self {
        Target::Existing(id)
    }
}

#[derive(Debug)]
enum PendingOperand {
    Ready(Operand),
    Branch(Target),
    Switch(Vec<Target>),
}

#[derive(Debug)]
struct Pending {
    opcode: OpCode,
    operand: PendingOperand,
}

/// Instructions waiting to be spliced into a body.
///
/// Building never fails; misuse such as binding a label twice is reported by
/// [`splice_after`].
#[derive(Debug)]
pub struct Sequence {
    id: u32,
    pending: Vec<Pending>,
    labels: Vec<Option<usize>>,
    error: Option<Error>,
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::new()
    }
}

impl Sequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Sequence {
            id: NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
            pending: Vec::new(),
            labels: Vec::new(),
            error: None,
        }
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Reserves a new unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label {
            sequence: self.id,
            index: self.labels.len() - 1,
        }
    }

    /// Binds `label` to the next instruction emitted.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if label.sequence != self.id {
            self.fail(ForeignLabel(label.index));
            return self;
        }

        let next = self.pending.len();
        match self.labels.get(label.index).copied() {
            Some(None) => self.labels[label.index] = Some(next),
            Some(Some(_)) => self.fail(InvalidDescriptor {
                name: "sequence".to_string(),
                message: format!("label {} is bound twice", label.index),
            }),
            None => self.fail(UnboundLabel(label.index)),
        }
        self
    }

    /// Appends an instruction with a fully known operand.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> &mut Self {
        self.pending.push(Pending {
            opcode,
            operand: PendingOperand::Ready(operand),
        });
        self
    }

    /// Appends a branch.
    pub fn branch(&mut self, opcode: OpCode, target: impl Into<Target>) -> &mut Self {
        self.pending.push(Pending {
            opcode,
            operand: PendingOperand::Branch(target.into()),
        });
        self
    }

    /// Appends a `switch` over `targets`.
    pub fn switch(&mut self, targets: Vec<Target>) -> &mut Self {
        self.pending.push(Pending {
            opcode: OpCode::SWITCH,
            operand: PendingOperand::Switch(targets),
        });
        self
    }

    /// Builds a standalone body from the sequence. Existing targets are not allowed.
    ///
    /// # Errors
    /// Same as [`splice_after`].
    pub fn into_body(self) -> Result<MethodBody> {
        let mut body = MethodBody::new();
        for instruction in self.resolve(&body)? {
            body.push_unchecked(instruction);
        }
        body.mark_shifted();
        Ok(body)
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Turns the sequence into instructions whose label targets are the handles the
    /// instructions will get once appended to `body`'s arena.
    fn resolve(self, body: &MethodBody) -> Result<Vec<Instruction>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let first_slot = body.slot_count();
        let count = self.pending.len();
        let sequence = self.id;
        let labels = self.labels;
        let target = |target: Target| -> Result<InstrId> {
            match target {
                Target::Label(label) if label.sequence != sequence => {
                    Err(ForeignLabel(label.index))
                }
                Target::Label(label) => labels
                    .get(label.index)
                    .copied()
                    .flatten()
                    .filter(|&index| index < count)
                    .map(|index| body.id_for_slot(first_slot + index))
                    .ok_or(UnboundLabel(label.index)),
                Target::Existing(id) => {
                    body.check_targets(&Operand::Target(id))?;
                    Ok(id)
                }
            }
        };

        self.pending
            .into_iter()
            .map(|pending| {
                let operand = match pending.operand {
                    PendingOperand::Ready(operand) => {
                        body.check_targets(&operand)?;
                        operand
                    }
                    PendingOperand::Branch(to) => Operand::Target(target(to)?),
                    PendingOperand::Switch(cases) => Operand::Switch(
                        cases
                            .into_iter()
                            .map(&target)
                            .collect::<Result<Vec<_>>>()?,
                    ),
                };
                Instruction::new(pending.opcode, operand)
            })
            .collect()
    }
}

/// Handles of instructions inserted by [`splice_after`].
#[derive(Debug, Clone)]
pub struct Spliced {
    sequence: u32,
    ids: Vec<InstrId>,
    labels: Vec<Option<usize>>,
}

impl Spliced {
    /// The first inserted instruction.
    #[must_use]
    pub fn first(&self) -> InstrId {
        self.ids[0]
    }

    /// All inserted instructions, in list order.
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.ids
    }

    /// The instruction `label` was bound to, or `None` for a label of another sequence.
    #[must_use]
    pub fn id(&self, label: Label) -> Option<InstrId> {
        if label.sequence != self.sequence {
            return None;
        }
        let index = self.labels.get(label.index).copied().flatten()?;
        self.ids.get(index).copied()
    }
}

/// Inserts `sequence` directly after `anchor`.
///
/// Everything is validated before the body is touched: the anchor must be an attached
/// instruction of `body`, every label must be bound, existing targets must be attached and
/// every operand must fit its opcode. Branches and handlers already in the body are not
/// changed.
///
/// # Errors
/// Returns [`crate::Error::StaleAnchor`] or [`crate::Error::ForeignInstruction`] for a bad
/// anchor, [`crate::Error::UnboundLabel`] or [`crate::Error::ForeignLabel`] for a bad label,
/// [`crate::Error::DanglingTarget`],
/// [`crate::Error::OperandMismatch`], or [`crate::Error::InvalidDescriptor`] for an empty
/// sequence.
pub fn splice_after(body: &mut MethodBody, anchor: InstrId, sequence: Sequence) -> Result<Spliced> {
    body.check_attached(anchor)?;
    let position = body.position(anchor).ok_or(StaleAnchor)?;

    if sequence.is_empty() {
        return Err(InvalidDescriptor {
            name: "sequence".to_string(),
            message: "nothing to splice".to_string(),
        });
    }

    let id = sequence.id;
    let labels = sequence.labels.clone();
    let instructions = sequence.resolve(body)?;

    debug!(
        "Splicing {} instruction(s) after {}",
        instructions.len(),
        body.instruction(anchor)?
    );
    let ids = body.insert_after(position, instructions);

    Ok(Spliced {
        sequence: id,
        ids,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{decode_body, Immediate},
        metadata::method::{ExceptionHandler, ExceptionHandlerFlags},
        metadata::token::Token,
        patch::remove,
    };

    #[test]
    fn forward_and_backward_labels() {
        let mut sequence = Sequence::new();
        let top = sequence.label();
        let bottom = sequence.label();
        sequence
            .bind(top)
            .emit(OpCode::NOP, Operand::None)
            .branch(OpCode::BRTRUE_S, bottom)
            .branch(OpCode::BR_S, top)
            .bind(bottom)
            .emit(OpCode::RET, Operand::None);

        let body = sequence.into_body().unwrap();
        let first = body.at(0).unwrap();
        let last = body.at(3).unwrap();

        assert_eq!(
            body.instruction(body.at(1).unwrap()).unwrap().operand,
            Operand::Target(last)
        );
        assert_eq!(
            body.instruction(body.at(2).unwrap()).unwrap().operand,
            Operand::Target(first)
        );
    }

    #[test]
    fn preserves_existing_branches_and_handlers() {
        // br.s +1; nop; ldc.i4.0; ret
        let mut body = decode_body(&[0x16, 0x2B, 0x01, 0x00, 0x16, 0x2A]).unwrap();
        let branch = body.at(0).unwrap();
        let anchor = body.at(1).unwrap();
        let target = body.at(2).unwrap();
        let ret = body.at(3).unwrap();
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: anchor,
            try_end: Some(target),
            handler_start: target,
            handler_end: Some(ret),
            filter_start: None,
            class_token: Token::new(0),
        });

        let mut sequence = Sequence::new();
        sequence
            .emit(OpCode::LDC_I4_S, Operand::Immediate(Immediate::Int8(1)))
            .emit(OpCode::POP, Operand::None);
        let spliced = splice_after(&mut body, anchor, sequence).unwrap();

        assert_eq!(body.len(), 6);
        assert_eq!(body.position(spliced.ids()[1]), Some(3));
        assert_eq!(body.position(target), Some(4));
        assert_eq!(
            body.instruction(branch).unwrap().operand,
            Operand::Target(target)
        );

        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, anchor);
        assert_eq!(handler.try_end, Some(target));
        assert_eq!(handler.handler_end, Some(ret));
    }

    #[test]
    fn unbound_label_leaves_body_untouched() {
        let mut body = decode_body(&[0x0A, 0x16, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();

        let mut sequence = Sequence::new();
        let nowhere = sequence.label();
        sequence.branch(OpCode::BR, nowhere);

        assert!(matches!(
            splice_after(&mut body, anchor, sequence),
            Err(UnboundLabel(0))
        ));
        assert_eq!(body.len(), 2);
        assert!(!body.is_shifted());
    }

    #[test]
    fn label_bound_past_the_end() {
        let mut sequence = Sequence::new();
        let end = sequence.label();
        sequence.branch(OpCode::BR, end).bind(end);

        assert!(matches!(sequence.into_body(), Err(UnboundLabel(0))));
    }

    #[test]
    fn label_bound_twice() {
        let mut sequence = Sequence::new();
        let label = sequence.label();
        sequence
            .bind(label)
            .emit(OpCode::NOP, Operand::None)
            .bind(label)
            .emit(OpCode::RET, Operand::None);

        assert!(matches!(
            sequence.into_body(),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn label_of_another_sequence() {
        let mut other = Sequence::new();
        other.label();
        let foreign = other.label();

        let mut sequence = Sequence::new();
        sequence.label();
        let own = sequence.label();
        sequence
            .emit(OpCode::NOP, Operand::None)
            .bind(own)
            .branch(OpCode::BR_S, foreign);
        assert!(matches!(sequence.into_body(), Err(ForeignLabel(1))));

        let mut sequence = Sequence::new();
        sequence.label();
        sequence.bind(foreign).emit(OpCode::RET, Operand::None);
        assert!(matches!(sequence.into_body(), Err(ForeignLabel(1))));
    }

    #[test]
    fn foreign_label_leaves_body_untouched() {
        let mut body = decode_body(&[0x0A, 0x16, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();
        let foreign = Sequence::new().label();

        let mut sequence = Sequence::new();
        let own = sequence.label();
        sequence
            .bind(own)
            .emit(OpCode::NOP, Operand::None)
            .branch(OpCode::BR, foreign);

        assert!(matches!(
            splice_after(&mut body, anchor, sequence),
            Err(ForeignLabel(0))
        ));
        assert_eq!(body.len(), 2);
        assert!(!body.is_shifted());
    }

    #[test]
    fn operand_mismatch() {
        let mut body = decode_body(&[0x0A, 0x16, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();

        let mut sequence = Sequence::new();
        sequence.emit(OpCode::LDC_I4, Operand::Immediate(Immediate::Int8(1)));

        assert!(matches!(
            splice_after(&mut body, anchor, sequence),
            Err(Error::OperandMismatch { .. })
        ));
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn stale_and_foreign_anchors() {
        let mut body = decode_body(&[0x0A, 0x00, 0x2A]).unwrap();
        let nop = body.at(0).unwrap();
        remove(&mut body, nop).unwrap();

        let mut sequence = Sequence::new();
        sequence.emit(OpCode::NOP, Operand::None);
        assert!(matches!(
            splice_after(&mut body, nop, sequence),
            Err(StaleAnchor)
        ));

        let other = decode_body(&[0x06, 0x2A]).unwrap();
        let mut sequence = Sequence::new();
        sequence.emit(OpCode::NOP, Operand::None);
        assert!(matches!(
            splice_after(&mut body, other.at(0).unwrap(), sequence),
            Err(Error::ForeignInstruction)
        ));
    }

    #[test]
    fn removed_resume_point_is_dangling() {
        let mut body = decode_body(&[0x0E, 0x00, 0x00, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();
        let removed = body.at(1).unwrap();
        remove(&mut body, removed).unwrap();

        let mut sequence = Sequence::new();
        sequence.branch(OpCode::BR, removed);
        assert!(matches!(
            splice_after(&mut body, anchor, sequence),
            Err(Error::DanglingTarget)
        ));
    }

    #[test]
    fn empty_sequence() {
        let mut body = decode_body(&[0x06, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();
        assert!(matches!(
            splice_after(&mut body, anchor, Sequence::new()),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn spliced_label_lookup() {
        let mut body = decode_body(&[0x06, 0x2A]).unwrap();
        let anchor = body.at(0).unwrap();

        let mut sequence = Sequence::new();
        let second = sequence.label();
        let unused = sequence.label();
        sequence
            .emit(OpCode::NOP, Operand::None)
            .bind(second)
            .emit(OpCode::NOP, Operand::None);
        let spliced = splice_after(&mut body, anchor, sequence).unwrap();

        assert_eq!(spliced.id(second), Some(spliced.ids()[1]));
        assert_eq!(spliced.id(unused), None);

        let mut other = Sequence::new();
        other.label();
        assert_eq!(spliced.id(other.label()), None);
        // anchor is the only instruction, so the splice lands after it
        assert_eq!(body.position(spliced.first()), Some(1));
    }
}
