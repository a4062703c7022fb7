//! The in-memory module: types, references and user strings.
//!
//! A [`Module`] is loaded from a module image, edited in memory and written back as a whole.
//! It hands out tokens for everything it owns and for every external symbol imported into it;
//! tokens stay valid for the module's lifetime.
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::metadata::{
//!     method::{MethodAttributes, MethodSignature},
//!     types::TypeAttributes,
//!     Module,
//! };
//!
//! let mut unity = Module::new("UnityEngine.dll");
//! let input = unity.add_type("UnityEngine.Input", TypeAttributes::PUBLIC);
//! unity.add_method(
//!     input,
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//!     "GetKey",
//!     MethodSignature::new_static(&["UnityEngine.KeyCode"], "System.Boolean"),
//!     None,
//! )?;
//!
//! let mut game = Module::new("Assembly-CSharp.dll");
//! let first = game.import_method(&unity, "UnityEngine.Input", "GetKey", Some(&["KeyCode"]))?;
//! let again = game.import_method(&unity, "UnityEngine.Input", "GetKey", None)?;
//! assert_eq!(first, again);
//! assert_eq!(game.member_refs().len(), 1);
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::{
    assembly::{Operand, SignatureResolver},
    file::{write_atomic, File},
    metadata::{
        image,
        imports::{MemberRef, MemberRefSignature, Symbol, TypeRef},
        method::{Method, MethodAttributes, MethodBody, MethodSignature},
        token::Token,
        types::{FieldDef, TypeDef},
    },
    Error::{TypeNotFound, UnresolvedToken},
    Result,
};

/// A loaded module.
#[derive(Debug)]
pub struct Module {
    name: String,
    origin: Option<PathBuf>,
    types: Vec<TypeDef>,
    type_refs: Vec<TypeRef>,
    member_refs: Vec<MemberRef>,
    user_strings: Vec<String>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            origin: None,
            types: Vec::new(),
            type_refs: Vec::new(),
            member_refs: Vec::new(),
            user_strings: Vec::new(),
        }
    }

    /// Loads a module image from disk.
    ///
    /// The file is mapped read-only and fully parsed; the mapping is released before this
    /// returns.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileNotFound`] if the path does not exist, and
    /// [`crate::Error::Malformed`], [`crate::Error::OutOfBounds`] or
    /// [`crate::Error::NotSupported`] if the image cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Module> {
        let file = File::from_file(path)?;
        let mut module = image::read(file.data())?;
        module.origin = Some(path.to_path_buf());

        info!(
            "Loaded module `{}` from {} ({} types, {} bytes)",
            module.name,
            path.display(),
            module.types.len(),
            file.len()
        );
        Ok(module)
    }

    /// Parses a module image from memory.
    ///
    /// # Errors
    /// See [`Module::from_file`].
    pub fn from_mem(data: Vec<u8>) -> Result<Module> {
        let file = File::from_mem(data)?;
        image::read(file.data())
    }

    /// Serializes the module. Methods whose bodies were never borrowed for editing are
    /// written back with their original bytes.
    ///
    /// # Errors
    /// Returns the first encoding failure of an edited body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        image::write(self)
    }

    /// Writes the module to `path`, replacing any existing file atomically.
    ///
    /// The image is staged in a temporary file next to `path` and renamed over it, so
    /// `path` holds either the complete old or the complete new content.
    ///
    /// # Errors
    /// Returns encoding errors from [`Module::to_bytes`], [`crate::Error::FileError`] if
    /// staging fails and [`crate::Error::Persist`] if the final rename fails.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;

        info!("Wrote module `{}` to {} ({} bytes)", self.name, path.display(), bytes.len());
        Ok(())
    }

    /// Name other modules record as the scope of references into this one.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file this module was loaded from.
    #[must_use]
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Type definitions in row order.
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Type references in row order.
    #[must_use]
    pub fn type_refs(&self) -> &[TypeRef] {
        &self.type_refs
    }

    /// Member references in row order.
    #[must_use]
    pub fn member_refs(&self) -> &[MemberRef] {
        &self.member_refs
    }

    /// The user string heap.
    #[must_use]
    pub fn user_strings(&self) -> &[String] {
        &self.user_strings
    }

    /// Adds a type definition and returns its token.
    pub fn add_type(&mut self, name: impl Into<String>, flags: u32) -> Token {
        let token = Token::from_parts(Token::TYPE_DEF, row_after(self.types.len()));
        self.types.push(TypeDef::new(token, flags, name));
        token
    }

    /// Adds a field to the type `owner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if `owner` is not a type of this module.
    pub fn add_field(
        &mut self,
        owner: Token,
        flags: u32,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Result<Token> {
        let row = self.next_field_row();
        let ty = self.type_by_token_mut(owner)?;
        let token = Token::from_parts(Token::FIELD, row);
        ty.fields.push(FieldDef {
            token,
            flags,
            name: name.into(),
            field_type: field_type.into(),
        });
        Ok(token)
    }

    /// Adds a method to the type `owner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if `owner` is not a type of this module.
    pub fn add_method(
        &mut self,
        owner: Token,
        flags: MethodAttributes,
        name: impl Into<String>,
        signature: MethodSignature,
        body: Option<MethodBody>,
    ) -> Result<Token> {
        let row = self.next_method_row();
        let ty = self.type_by_token_mut(owner)?;
        let token = Token::from_parts(Token::METHOD_DEF, row);
        ty.methods
            .push(Method::new(token, flags, name, signature, body));
        Ok(token)
    }

    /// Adds a fully built type, as read from an image.
    pub(crate) fn push_type(&mut self, ty: TypeDef) {
        self.types.push(ty);
    }

    pub(crate) fn push_type_ref(&mut self, scope: String, name: String) -> Token {
        let token = Token::from_parts(Token::TYPE_REF, row_after(self.type_refs.len()));
        self.type_refs.push(TypeRef { token, scope, name });
        token
    }

    pub(crate) fn push_member_ref(
        &mut self,
        parent: Token,
        name: String,
        signature: MemberRefSignature,
    ) -> Token {
        let token = Token::from_parts(Token::MEMBER_REF, row_after(self.member_refs.len()));
        self.member_refs.push(MemberRef {
            token,
            parent,
            name,
            signature,
        });
        token
    }

    pub(crate) fn push_user_string(&mut self, value: String) -> Token {
        let token = Token::from_parts(Token::USER_STRING, row_after(self.user_strings.len()));
        self.user_strings.push(value);
        token
    }

    fn next_field_row(&self) -> u32 {
        self.types
            .iter()
            .flat_map(|ty| ty.fields.iter())
            .map(|field| field.token.row())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn next_method_row(&self) -> u32 {
        self.types
            .iter()
            .flat_map(|ty| ty.methods.iter())
            .map(|method| method.token.row())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn type_by_token_mut(&mut self, token: Token) -> Result<&mut TypeDef> {
        self.types
            .iter_mut()
            .find(|ty| ty.token == token)
            .ok_or(UnresolvedToken(token))
    }

    /// Finds a type by its exact full name (`Outer/Inner` for nested types).
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if there is none.
    pub fn find_type(&self, name: &str) -> Result<&TypeDef> {
        self.types
            .iter()
            .find(|ty| ty.name == name)
            .ok_or_else(|| self.type_not_found(name))
    }

    /// Mutable variant of [`Module::find_type`].
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if there is none.
    pub fn find_type_mut(&mut self, name: &str) -> Result<&mut TypeDef> {
        let Some(index) = self.types.iter().position(|ty| ty.name == name) else {
            return Err(self.type_not_found(name));
        };
        Ok(&mut self.types[index])
    }

    fn type_not_found(&self, name: &str) -> crate::Error {
        TypeNotFound {
            module: self.name.clone(),
            name: name.to_string(),
        }
    }

    /// Finds a method by type name, method name and optional parameter filter.
    ///
    /// # Errors
    /// See [`Module::find_type`] and [`TypeDef::find_method`].
    pub fn find_method(
        &self,
        type_name: &str,
        name: &str,
        params: Option<&[&str]>,
    ) -> Result<&Method> {
        self.find_type(type_name)?.find_method(name, params)
    }

    /// Mutable variant of [`Module::find_method`].
    ///
    /// # Errors
    /// See [`Module::find_method`].
    pub fn find_method_mut(
        &mut self,
        type_name: &str,
        name: &str,
        params: Option<&[&str]>,
    ) -> Result<&mut Method> {
        self.find_type_mut(type_name)?
            .find_method_mut(name, params)
    }

    /// Finds a field by type name and field name.
    ///
    /// # Errors
    /// See [`Module::find_type`] and [`TypeDef::find_field`].
    pub fn find_field(&self, type_name: &str, name: &str) -> Result<&FieldDef> {
        self.find_type(type_name)?.find_field(name)
    }

    /// The type definition behind a `TypeDef` token.
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&TypeDef> {
        self.types.iter().find(|ty| ty.token == token)
    }

    /// The method definition behind a `MethodDef` token.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&Method> {
        self.types
            .iter()
            .flat_map(|ty| ty.methods.iter())
            .find(|method| method.token == token)
    }

    /// Mutable variant of [`Module::method`].
    pub fn method_mut(&mut self, token: Token) -> Option<&mut Method> {
        self.types
            .iter_mut()
            .flat_map(|ty| ty.methods.iter_mut())
            .find(|method| method.token == token)
    }

    /// The field definition behind a `Field` token.
    #[must_use]
    pub fn field(&self, token: Token) -> Option<&FieldDef> {
        self.types
            .iter()
            .flat_map(|ty| ty.fields.iter())
            .find(|field| field.token == token)
    }

    /// The type reference behind a `TypeRef` token.
    #[must_use]
    pub fn type_ref(&self, token: Token) -> Option<&TypeRef> {
        if token.table() != Token::TYPE_REF || token.row() == 0 {
            return None;
        }
        self.type_refs.get(token.row() as usize - 1)
    }

    /// The member reference behind a `MemberRef` token.
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        if token.table() != Token::MEMBER_REF || token.row() == 0 {
            return None;
        }
        self.member_refs.get(token.row() as usize - 1)
    }

    /// The string behind a user string token.
    #[must_use]
    pub fn user_string_value(&self, token: Token) -> Option<&str> {
        if token.table() != Token::USER_STRING || token.row() == 0 {
            return None;
        }
        self.user_strings
            .get(token.row() as usize - 1)
            .map(String::as_str)
    }

    /// Returns the token for the user string `value`, adding it to the heap if needed.
    pub fn user_string(&mut self, value: &str) -> Token {
        match self.user_strings.iter().position(|s| s == value) {
            Some(index) => Token::from_parts(Token::USER_STRING, row_after(index)),
            None => self.push_user_string(value.to_string()),
        }
    }

    /// Returns a `TypeRef` token for `name` defined in module `scope`, creating the reference
    /// on first use.
    pub fn import_type(&mut self, scope: &str, name: &str) -> Token {
        if let Some(existing) = self
            .type_refs
            .iter()
            .find(|r| r.scope == scope && r.name == name)
        {
            return existing.token;
        }

        let token = self.push_type_ref(scope.to_string(), name.to_string());
        debug!("Imported type [{}]{} as {}", scope, name, token);
        token
    }

    /// Returns a `MemberRef` token for a method defined in `source`, creating the reference
    /// on first use. Importing the same method twice yields the same token.
    ///
    /// # Errors
    /// Returns the lookup errors of [`Module::find_method`] on `source`.
    pub fn import_method(
        &mut self,
        source: &Module,
        type_name: &str,
        name: &str,
        params: Option<&[&str]>,
    ) -> Result<Token> {
        let method = source.find_method(type_name, name, params)?;
        let parent = self.import_type(source.name(), type_name);
        Ok(self.import_member(
            parent,
            &method.name,
            MemberRefSignature::Method(method.signature.clone()),
        ))
    }

    /// Returns a `MemberRef` token for a field defined in `source`, creating the reference on
    /// first use.
    ///
    /// # Errors
    /// Returns the lookup errors of [`Module::find_field`] on `source`.
    pub fn import_field(&mut self, source: &Module, type_name: &str, name: &str) -> Result<Token> {
        let field = source.find_field(type_name, name)?;
        let parent = self.import_type(source.name(), type_name);
        Ok(self.import_member(
            parent,
            &field.name,
            MemberRefSignature::Field(field.field_type.clone()),
        ))
    }

    fn import_member(&mut self, parent: Token, name: &str, signature: MemberRefSignature) -> Token {
        if let Some(existing) = self
            .member_refs
            .iter()
            .find(|r| r.parent == parent && r.name == name && r.signature == signature)
        {
            return existing.token;
        }

        let token = self.push_member_ref(parent, name.to_string(), signature);
        debug!("Imported member {} as {}", name, token);
        token
    }

    /// Describes the symbol behind `token` independently of this module's token numbering.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token names no row of this module.
    pub fn symbol(&self, token: Token) -> Result<Symbol> {
        let unresolved = || UnresolvedToken(token);
        match token.table() {
            Token::TYPE_DEF => {
                let ty = self.type_def(token).ok_or_else(unresolved)?;
                Ok(Symbol::Type {
                    scope: self.name.clone(),
                    name: ty.name.clone(),
                })
            }
            Token::TYPE_REF => {
                let type_ref = self.type_ref(token).ok_or_else(unresolved)?;
                Ok(Symbol::Type {
                    scope: type_ref.scope.clone(),
                    name: type_ref.name.clone(),
                })
            }
            Token::METHOD_DEF | Token::FIELD => {
                for ty in &self.types {
                    if let Some(method) = ty.methods.iter().find(|m| m.token == token) {
                        return Ok(self.local_member(
                            ty,
                            &method.name,
                            MemberRefSignature::Method(method.signature.clone()),
                        ));
                    }
                    if let Some(field) = ty.fields.iter().find(|f| f.token == token) {
                        return Ok(self.local_member(
                            ty,
                            &field.name,
                            MemberRefSignature::Field(field.field_type.clone()),
                        ));
                    }
                }
                Err(unresolved())
            }
            Token::MEMBER_REF => {
                let member = self.member_ref(token).ok_or_else(unresolved)?;
                let parent = self.type_ref(member.parent).ok_or(UnresolvedToken(member.parent))?;
                Ok(Symbol::Member {
                    scope: parent.scope.clone(),
                    type_name: parent.name.clone(),
                    name: member.name.clone(),
                    signature: member.signature.clone(),
                })
            }
            _ => Err(unresolved()),
        }
    }

    fn local_member(&self, ty: &TypeDef, name: &str, signature: MemberRefSignature) -> Symbol {
        Symbol::Member {
            scope: self.name.clone(),
            type_name: ty.name.clone(),
            name: name.to_string(),
            signature,
        }
    }

    /// Checks that every token operand of every body resolves in this module.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] for the first dangling token.
    pub fn validate_tokens(&self) -> Result<()> {
        let bodies = self
            .types
            .iter()
            .flat_map(|ty| ty.methods.iter())
            .filter_map(Method::body);

        for body in bodies {
            for (_, instruction) in body.iter() {
                if let Operand::Token(token) = instruction.operand {
                    let resolves = match token.table() {
                        Token::USER_STRING => self.user_string_value(token).is_some(),
                        _ => self.symbol(token).is_ok(),
                    };
                    if !resolves {
                        return Err(UnresolvedToken(token));
                    }
                }
            }
        }
        Ok(())
    }
}

impl SignatureResolver for Module {
    fn method_signature(&self, token: Token) -> Option<&MethodSignature> {
        match token.table() {
            Token::METHOD_DEF => self.method(token).map(|method| &method.signature),
            Token::MEMBER_REF => self.member_ref(token)?.method_signature(),
            _ => None,
        }
    }
}

/// Row number of the entry that follows `len` existing entries.
fn row_after(len: usize) -> u32 {
    // Tables are read with u32 counts
    #[allow(clippy::cast_possible_truncation)]
    let row = len as u32 + 1;
    row
}
