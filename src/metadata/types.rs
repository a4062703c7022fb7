//! Type and field definitions of a module.
//!
//! # Key Types
//! - [`TypeDef`] - A type defined in the module, owning its fields and methods
//! - [`FieldDef`] - A field of a [`TypeDef`]
//! - [`TypeAttributes`] / [`FieldAttributes`] - Flag constants

use crate::{
    metadata::{
        method::{simple_name, Method},
        token::Token,
    },
    Error::{AmbiguousSymbol, FieldNotFound, MethodNotFound},
    Result,
};

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information. These 3 bits contain one of the following values:
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Class has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Class is nested with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// All possible flags for `FieldAttributes`
pub mod FieldAttributes {
    /// These 3 bits contain one of the following values:
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessibly by anyone in the Assembly
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u32 = 0x0004;
    /// Accessibly by anyone who has visibility to this scope field contract attributes
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant
    pub const LITERAL: u32 = 0x0040;
    /// Field is special
    pub const SPECIAL_NAME: u32 = 0x0200;
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// [`FieldAttributes`] bitmask
    pub flags: u32,
    /// Field name, e.g. `<t>__0`
    pub name: String,
    /// Full name of the field type
    pub field_type: String,
}

/// A type defined in a module.
#[derive(Debug)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// [`TypeAttributes`] bitmask
    pub flags: u32,
    /// Full name; nested types use `Outer/Inner`
    pub name: String,
    /// Fields in row order
    pub fields: Vec<FieldDef>,
    /// Methods in row order
    pub methods: Vec<Method>,
}

impl TypeDef {
    /// Creates a type without members.
    pub fn new(token: Token, flags: u32, name: impl Into<String>) -> Self {
        TypeDef {
            token,
            flags,
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Name without namespace or enclosing type.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// Returns true for types nested in another type.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.name.contains('/')
    }

    /// Finds a method by name, optionally narrowed by parameter types.
    ///
    /// # Arguments
    /// * `name` - Method name
    /// * `params` - Parameter type names, full or simple; `None` accepts any overload
    ///
    /// # Errors
    /// Returns [`crate::Error::MethodNotFound`] if nothing matches and
    /// [`crate::Error::AmbiguousSymbol`] if more than one overload does.
    pub fn find_method(&self, name: &str, params: Option<&[&str]>) -> Result<&Method> {
        let index = self.method_index(name, params)?;
        Ok(&self.methods[index])
    }

    /// Mutable variant of [`TypeDef::find_method`].
    ///
    /// # Errors
    /// See [`TypeDef::find_method`].
    pub fn find_method_mut(&mut self, name: &str, params: Option<&[&str]>) -> Result<&mut Method> {
        let index = self.method_index(name, params)?;
        Ok(&mut self.methods[index])
    }

    fn method_index(&self, name: &str, params: Option<&[&str]>) -> Result<usize> {
        let mut candidates = self
            .methods
            .iter()
            .enumerate()
            .filter(|(_, method)| method.name == name)
            .filter(|(_, method)| {
                params.map_or(true, |params| method.signature.matches_params(params))
            })
            .map(|(index, _)| index);

        let Some(found) = candidates.next() else {
            return Err(MethodNotFound {
                type_name: self.name.clone(),
                name: display_query(name, params),
            });
        };
        if candidates.next().is_some() {
            return Err(AmbiguousSymbol(format!(
                "{}::{}",
                self.name,
                display_query(name, params)
            )));
        }
        Ok(found)
    }

    /// Finds a field by name.
    ///
    /// # Errors
    /// Returns [`crate::Error::FieldNotFound`] if there is none.
    pub fn find_field(&self, name: &str) -> Result<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| FieldNotFound {
                type_name: self.name.clone(),
                name: name.to_string(),
            })
    }
}

fn display_query(name: &str, params: Option<&[&str]>) -> String {
    match params {
        Some(params) => format!("{}({})", name, params.join(", ")),
        None => name.to_string(),
    }
}
