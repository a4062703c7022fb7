//! Method definitions, signatures and bodies.
//!
//! # Key Components
//!
//! - [`Method`] - A method definition with its signature and optional body
//! - [`MethodSignature`] - Parameter and return types, used for overload selection and for
//!   the stack effect of calls
//! - [`MethodBody`] / [`InstrId`] - The editable instruction list
//! - [`MethodHeader`] - ECMA-335 serialized body layout
//! - [`ExceptionHandler`] / [`ExceptionClause`] - Protected regions

mod body;
mod exceptions;
mod header;
mod types;

pub use body::{InstrId, MethodBody};
pub use exceptions::{ExceptionClause, ExceptionHandler, ExceptionHandlerFlags};
pub use header::{MethodHeader, FAT_HEADER_SIZE, TINY_MAX_CODE_SIZE, TINY_MAX_STACK};
pub use types::{MethodAttributes, MethodBodyFlags, SectionFlags, METHOD_ACCESS_MASK};

use std::fmt;

use crate::metadata::token::Token;

/// Full name of the type returned by methods that return nothing.
pub const VOID: &str = "System.Void";

/// Parameter and return types of a method, by full type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Instance method; the receiver is passed as an implicit first argument
    pub has_this: bool,
    /// Full names of the parameter types
    pub params: Vec<String>,
    /// Full name of the return type
    pub return_type: String,
}

impl MethodSignature {
    /// Signature of an instance method.
    pub fn instance(params: &[&str], return_type: &str) -> Self {
        MethodSignature {
            has_this: true,
            params: params.iter().map(ToString::to_string).collect(),
            return_type: return_type.to_string(),
        }
    }

    /// Signature of a static method.
    pub fn new_static(params: &[&str], return_type: &str) -> Self {
        MethodSignature {
            has_this: false,
            ..MethodSignature::instance(params, return_type)
        }
    }

    /// Returns true unless the method returns `System.Void`.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type != VOID
    }

    /// Number of stack slots a call pops, receiver included.
    #[must_use]
    pub fn call_pops(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Compares the parameter list against `query`.
    ///
    /// Each query entry matches a parameter by its full name (`UnityEngine.KeyCode`) or by
    /// its simple name (`KeyCode`).
    #[must_use]
    pub fn matches_params(&self, query: &[&str]) -> bool {
        self.params.len() == query.len()
            && self
                .params
                .iter()
                .zip(query)
                .all(|(param, wanted)| param == wanted || simple_name(param) == *wanted)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_this {
            write!(f, "static ")?;
        }
        write!(f, "{}(", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// The part of a type name after the last namespace dot or nesting slash.
#[must_use]
pub fn simple_name(full_name: &str) -> &str {
    full_name
        .rsplit(['.', '/'])
        .next()
        .unwrap_or(full_name)
}

/// A method definition.
#[derive(Debug)]
pub struct Method {
    /// `MethodDef` token of this method
    pub token: Token,
    /// Access and layout flags
    pub flags: MethodAttributes,
    /// Method name
    pub name: String,
    /// Parameter and return types
    pub signature: MethodSignature,
    body: Option<MethodBody>,
    raw_body: Option<Vec<u8>>,
}

impl Method {
    /// Creates a method definition.
    pub fn new(
        token: Token,
        flags: MethodAttributes,
        name: impl Into<String>,
        signature: MethodSignature,
        body: Option<MethodBody>,
    ) -> Self {
        Method {
            token,
            flags,
            name: name.into(),
            signature,
            body,
            raw_body: None,
        }
    }

    /// Creates a method whose body was decoded from `raw`. Until the body is borrowed
    /// mutably, the method is written back with exactly these bytes.
    pub(crate) fn with_raw_body(
        token: Token,
        flags: MethodAttributes,
        name: String,
        signature: MethodSignature,
        body: MethodBody,
        raw: Vec<u8>,
    ) -> Self {
        Method {
            token,
            flags,
            name,
            signature,
            body: Some(body),
            raw_body: Some(raw),
        }
    }

    /// The body, if the method has one.
    #[must_use]
    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    /// The body for editing. The method will be re-encoded when its module is saved.
    pub fn body_mut(&mut self) -> Option<&mut MethodBody> {
        self.raw_body = None;
        self.body.as_mut()
    }

    /// The original serialized body, as long as it was not borrowed for editing.
    #[must_use]
    pub fn raw_body(&self) -> Option<&[u8]> {
        self.raw_body.as_deref()
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_params() {
        let sig = MethodSignature::new_static(&["UnityEngine.KeyCode"], "System.Boolean");
        assert!(sig.matches_params(&["KeyCode"]));
        assert!(sig.matches_params(&["UnityEngine.KeyCode"]));
        assert!(!sig.matches_params(&["String"]));
        assert!(!sig.matches_params(&[]));
        assert_eq!(sig.call_pops(), 1);
        assert!(sig.returns_value());
    }

    #[test]
    fn instance_signature() {
        let sig = MethodSignature::instance(&["System.String"], VOID);
        assert_eq!(sig.call_pops(), 2);
        assert!(!sig.returns_value());
        assert_eq!(sig.to_string(), "System.Void(System.String)");
    }

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("System.String"), "String");
        assert_eq!(simple_name("Dialogue/<SlowText>c__IteratorD"), "<SlowText>c__IteratorD");
        assert_eq!(simple_name("Int32"), "Int32");
    }

    #[test]
    fn raw_body_dropped_on_edit() {
        let mut method = Method::with_raw_body(
            Token::from_parts(Token::METHOD_DEF, 1),
            MethodAttributes::PUBLIC,
            "MoveNext".to_string(),
            MethodSignature::instance(&[], "System.Boolean"),
            MethodBody::new(),
            vec![0x02, 0x2A],
        );
        assert_eq!(method.raw_body(), Some(&[0x02, 0x2A][..]));
        assert!(method.body_mut().is_some());
        assert_eq!(method.raw_body(), None);
    }
}
