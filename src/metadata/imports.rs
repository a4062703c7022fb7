//! Symbols referenced from other modules.
//!
//! A module that calls into another module records two kinds of rows: a [`TypeRef`] naming the
//! external type together with the module it lives in (its scope), and a [`MemberRef`] naming a
//! method or field on such a type. Both are append-only: once a reference has been handed out as
//! a token, it is never changed or removed.
//!
//! [`References`] is the read-only set of modules imports are taken from.
//!
//! # Key Types
//! - [`TypeRef`] / [`MemberRef`] - Reference rows
//! - [`Symbol`] - A symbol named independently of any token, for resolving across modules
//! - [`References`] - Auxiliary modules opened for importing

use std::{fmt, path::Path};

use log::debug;

use crate::{
    metadata::{
        method::{Method, MethodSignature},
        module::Module,
        token::Token,
        types::{FieldDef, TypeDef},
    },
    Error::{AmbiguousSymbol, MethodNotFound, TypeNotFound},
    Result,
};

/// A type defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// `TypeRef` token
    pub token: Token,
    /// Name of the module that defines the type
    pub scope: String,
    /// Full name of the type
    pub name: String,
}

/// What kind of member a [`MemberRef`] names, with the information needed to match it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefSignature {
    /// A method with this signature
    Method(MethodSignature),
    /// A field of this type
    Field(String),
}

/// A method or field of a type defined in another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// `MemberRef` token
    pub token: Token,
    /// `TypeRef` token of the declaring type
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Method signature or field type
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// The signature, if this references a method.
    #[must_use]
    pub fn method_signature(&self) -> Option<&MethodSignature> {
        match &self.signature {
            MemberRefSignature::Method(signature) => Some(signature),
            MemberRefSignature::Field(_) => None,
        }
    }
}

/// A symbol identified by module, type and member names rather than by token.
///
/// Tokens only mean something inside one module; a `Symbol` can be compared across modules and
/// across a save and reload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A type
    Type {
        /// Defining module
        scope: String,
        /// Full type name
        name: String,
    },
    /// A method or field
    Member {
        /// Defining module
        scope: String,
        /// Full name of the declaring type
        type_name: String,
        /// Member name
        name: String,
        /// Method signature or field type
        signature: MemberRefSignature,
    },
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Type { scope, name } => write!(f, "[{scope}]{name}"),
            Symbol::Member {
                scope,
                type_name,
                name,
                signature: MemberRefSignature::Method(signature),
            } => write!(f, "[{scope}]{type_name}::{name} {signature}"),
            Symbol::Member {
                scope,
                type_name,
                name,
                signature: MemberRefSignature::Field(field_type),
            } => write!(f, "[{scope}]{type_name}::{name} : {field_type}"),
        }
    }
}

/// Auxiliary modules that imports are resolved against.
///
/// The modules are parsed once and never mutated.
#[derive(Debug, Default)]
pub struct References {
    modules: Vec<Module>,
}

impl References {
    /// Wraps already loaded modules.
    #[must_use]
    pub fn new(modules: Vec<Module>) -> Self {
        References { modules }
    }

    /// Loads every module in `names` from `directory`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileNotFound`] naming the first missing file, or the parse error
    /// of the first module that fails to load.
    pub fn open(directory: &Path, names: &[&str]) -> Result<Self> {
        let modules = names
            .iter()
            .map(|name| {
                let path = directory.join(name);
                debug!("Loading reference module {}", path.display());
                Module::from_file(&path)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(References { modules })
    }

    /// All loaded modules.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The module named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.name() == name)
    }

    /// Finds the one module that defines `type_name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if no module defines it and
    /// [`crate::Error::AmbiguousSymbol`] if several do.
    pub fn find_type(&self, type_name: &str) -> Result<(&Module, &TypeDef)> {
        let mut found = self
            .modules
            .iter()
            .filter_map(|module| module.find_type(type_name).ok().map(|ty| (module, ty)));

        let Some(first) = found.next() else {
            return Err(TypeNotFound {
                module: self.scope_list(),
                name: type_name.to_string(),
            });
        };
        if found.next().is_some() {
            return Err(AmbiguousSymbol(type_name.to_string()));
        }
        Ok(first)
    }

    /// Finds a method on a type of any reference module.
    ///
    /// # Errors
    /// See [`References::find_type`] and [`TypeDef::find_method`].
    pub fn find_method(
        &self,
        type_name: &str,
        name: &str,
        params: Option<&[&str]>,
    ) -> Result<(&Module, &Method)> {
        let (module, ty) = self.find_type(type_name)?;
        Ok((module, ty.find_method(name, params)?))
    }

    /// Finds a field on a type of any reference module.
    ///
    /// # Errors
    /// See [`References::find_type`] and [`TypeDef::find_field`].
    pub fn find_field(&self, type_name: &str, name: &str) -> Result<(&Module, &FieldDef)> {
        let (module, ty) = self.find_type(type_name)?;
        Ok((module, ty.find_field(name)?))
    }

    /// Resolves a method symbol to its definition.
    ///
    /// Parameters must match by full type name, so the exact overload is found.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if the scope or type is unknown and
    /// [`crate::Error::MethodNotFound`] if `symbol` is not a method of that type.
    pub fn resolve_method(&self, symbol: &Symbol) -> Result<&Method> {
        let Symbol::Member {
            scope,
            type_name,
            name,
            signature: MemberRefSignature::Method(signature),
        } = symbol
        else {
            return Err(MethodNotFound {
                type_name: String::new(),
                name: symbol.to_string(),
            });
        };

        let module = self.get(scope).ok_or_else(|| TypeNotFound {
            module: scope.clone(),
            name: type_name.clone(),
        })?;
        let params: Vec<&str> = signature.params.iter().map(String::as_str).collect();
        let method = module
            .find_type(type_name)?
            .find_method(name, Some(&params))?;

        if method.signature == *signature {
            Ok(method)
        } else {
            Err(MethodNotFound {
                type_name: type_name.clone(),
                name: symbol.to_string(),
            })
        }
    }

    fn scope_list(&self) -> String {
        self.modules
            .iter()
            .map(Module::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::method::MethodAttributes, Error};

    fn unity() -> Module {
        let mut module = Module::new("UnityEngine.dll");
        let input = module.add_type("UnityEngine.Input", 1);
        module
            .add_method(
                input,
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                "GetKey",
                MethodSignature::new_static(&["UnityEngine.KeyCode"], "System.Boolean"),
                None,
            )
            .unwrap();
        module
    }

    #[test]
    fn find_across_modules() {
        let references = References::new(vec![Module::new("mscorlib.dll"), unity()]);

        let (module, method) = references
            .find_method("UnityEngine.Input", "GetKey", Some(&["KeyCode"]))
            .unwrap();
        assert_eq!(module.name(), "UnityEngine.dll");
        assert_eq!(method.name, "GetKey");

        assert!(matches!(
            references.find_type("System.String"),
            Err(Error::TypeNotFound { .. })
        ));
    }

    #[test]
    fn ambiguous_type() {
        let references = References::new(vec![unity(), unity()]);
        assert!(matches!(
            references.find_type("UnityEngine.Input"),
            Err(Error::AmbiguousSymbol(_))
        ));
    }

    #[test]
    fn resolve_symbol() {
        let references = References::new(vec![unity()]);
        let symbol = Symbol::Member {
            scope: "UnityEngine.dll".to_string(),
            type_name: "UnityEngine.Input".to_string(),
            name: "GetKey".to_string(),
            signature: MemberRefSignature::Method(MethodSignature::new_static(
                &["UnityEngine.KeyCode"],
                "System.Boolean",
            )),
        };

        let method = references.resolve_method(&symbol).unwrap();
        assert_eq!(method.name, "GetKey");
        assert_eq!(
            symbol.to_string(),
            "[UnityEngine.dll]UnityEngine.Input::GetKey static System.Boolean(UnityEngine.KeyCode)"
        );
    }

    #[test]
    fn open_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let result = References::open(dir.path(), &["mscorlib.dll"]);
        assert!(matches!(result, Err(Error::FileNotFound(path)) if path.ends_with("mscorlib.dll")));
    }
}
