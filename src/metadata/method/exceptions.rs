//! Exception handler representation for CIL method bodies.
//!
//! Handlers come in two shapes. [`ExceptionClause`] is the on-disk form from the method body's
//! data sections, with byte offsets and lengths. [`ExceptionHandler`] is the editable form held
//! by a [`crate::metadata::method::MethodBody`]: every boundary is an instruction handle, so
//! inserting code inside or around a protected region keeps the region intact.

use bitflags::bitflags;

use crate::metadata::{method::InstrId, token::Token};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These flags determine how the exception handler processes exceptions and
    /// control flow within try/catch/finally blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The class token names the exception type that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter code is executed before the handler to test the exception.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One clause of an exception handling data section (ECMA-335 II.25.4.6), in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of the code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Offset of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Class token for typed handlers, filter offset for filter handlers, 0 otherwise.
    pub class_token_or_filter: u32,
}

impl ExceptionClause {
    /// Returns true if the clause fits the small section encoding.
    #[must_use]
    pub fn is_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}

/// Exception handler defining a protected region and its handler within an editable body.
///
/// End boundaries are exclusive; `None` means the region runs to the end of the body.
///
/// ```text
/// try {            // try_start .. try_end
/// }
/// catch (Type) {   // handler_start .. handler_end
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Kind of clause.
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected region.
    pub try_start: InstrId,
    /// First instruction after the protected region.
    pub try_end: Option<InstrId>,
    /// First instruction of the handler.
    pub handler_start: InstrId,
    /// First instruction after the handler.
    pub handler_end: Option<InstrId>,
    /// First instruction of the filter block, for filter clauses.
    pub filter_start: Option<InstrId>,
    /// Caught exception type, for typed clauses; null otherwise.
    pub class_token: Token,
}

impl ExceptionHandler {
    /// Every instruction this handler references.
    pub fn boundaries(&self) -> impl Iterator<Item = InstrId> + '_ {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
            self.filter_start,
        ]
        .into_iter()
        .flatten()
    }

    /// Returns true if `id` is one of this handler's boundaries.
    #[must_use]
    pub fn references(&self, id: InstrId) -> bool {
        self.boundaries().any(|boundary| boundary == id)
    }

    /// Returns true if the handler is entered with the exception object on the stack.
    #[must_use]
    pub fn pushes_exception(&self) -> bool {
        !self.flags.intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::MethodBody;

    #[test]
    fn small_clause_limits() {
        let mut clause = ExceptionClause {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 255,
            handler_offset: 0xFFFF,
            handler_length: 1,
            class_token_or_filter: 0,
        };
        assert!(clause.is_small());

        clause.try_length = 256;
        assert!(!clause.is_small());
    }

    #[test]
    fn boundaries() {
        let body = MethodBody::new();
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_start: body.id_for_slot(0),
            try_end: Some(body.id_for_slot(2)),
            handler_start: body.id_for_slot(4),
            handler_end: None,
            filter_start: Some(body.id_for_slot(2)),
            class_token: Token::new(0),
        };

        assert_eq!(handler.boundaries().count(), 4);
        assert!(handler.references(body.id_for_slot(4)));
        assert!(!handler.references(body.id_for_slot(3)));
        assert!(handler.pushes_exception());
    }
}
