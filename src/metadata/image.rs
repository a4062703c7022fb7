//! Reading and writing module images.
//!
//! A module image is a little-endian container holding everything a [`Module`] owns:
//!
//! ```text
//! magic "CILM" | u16 version (1) | u16 reserved | name
//! u32 count, TypeDef*   : u32 flags, name,
//!                         u32 count, Field*  : u32 row, u32 flags, name, field type
//!                         u32 count, Method* : u32 row, u16 flags, name, signature,
//!                                              u32 length, ECMA-335 method body (0 = none)
//! u32 count, TypeRef*   : scope, name
//! u32 count, MemberRef* : u8 kind (0 method, 1 field), u32 parent TypeRef token, name,
//!                         signature or field type
//! u32 count, UserString*: value
//!
//! signature: u8 has_this, 7-bit count, parameter type*, return type
//! ```
//!
//! Every string is 7-bit length prefixed UTF-8. `TypeDef`, `TypeRef`, `MemberRef` and user
//! string rows are implied by position; field and method rows are explicit because they
//! are numbered across all types.

use std::collections::HashSet;

use log::debug;

use crate::{
    assembly::{decode_body, encode_body},
    file::{
        io::write_le_to,
        parser::{write_7bit_encoded_int, write_prefixed_string_utf8, Parser},
    },
    metadata::{
        imports::MemberRefSignature,
        method::{Method, MethodAttributes, MethodSignature},
        module::Module,
        token::Token,
        types::{FieldDef, TypeDef},
    },
    Error::NotSupported,
    Result,
};

/// Leading bytes of every module image.
pub const MAGIC: &[u8; 4] = b"CILM";

/// The only container version understood.
pub const VERSION: u16 = 1;

const MEMBER_METHOD: u8 = 0;
const MEMBER_FIELD: u8 = 1;

/// Parses a module image.
pub(crate) fn read(data: &[u8]) -> Result<Module> {
    let mut parser = Parser::new(data);

    if parser.read_bytes(MAGIC.len())? != MAGIC {
        return Err(NotSupported);
    }
    let version = parser.read_le::<u16>()?;
    if version != VERSION {
        debug!("Unsupported module image version {}", version);
        return Err(NotSupported);
    }
    let _reserved = parser.read_le::<u16>()?;

    let mut module = Module::new(parser.read_prefixed_string_utf8()?);
    let mut field_rows = HashSet::new();
    let mut method_rows = HashSet::new();

    let type_count = read_count(&mut parser)?;
    for row in 1..=type_count {
        let flags = parser.read_le::<u32>()?;
        let name = parser.read_prefixed_string_utf8()?;
        let mut ty = TypeDef::new(Token::from_parts(Token::TYPE_DEF, row), flags, name);

        for _ in 0..read_count(&mut parser)? {
            let token = read_row(&mut parser, Token::FIELD, &mut field_rows)?;
            ty.fields.push(FieldDef {
                token,
                flags: parser.read_le::<u32>()?,
                name: parser.read_prefixed_string_utf8()?,
                field_type: parser.read_prefixed_string_utf8()?,
            });
        }

        for _ in 0..read_count(&mut parser)? {
            let token = read_row(&mut parser, Token::METHOD_DEF, &mut method_rows)?;
            ty.methods.push(read_method(&mut parser, token)?);
        }

        module.push_type(ty);
    }

    for _ in 0..read_count(&mut parser)? {
        let scope = parser.read_prefixed_string_utf8()?;
        let name = parser.read_prefixed_string_utf8()?;
        module.push_type_ref(scope, name);
    }

    for _ in 0..read_count(&mut parser)? {
        let kind = parser.read_le::<u8>()?;
        let parent = Token::new(parser.read_le::<u32>()?);
        if module.type_ref(parent).is_none() {
            return Err(malformed_error!(
                "MemberRef parent {} is not a TypeRef of this module",
                parent
            ));
        }

        let name = parser.read_prefixed_string_utf8()?;
        let signature = match kind {
            MEMBER_METHOD => MemberRefSignature::Method(read_signature(&mut parser)?),
            MEMBER_FIELD => MemberRefSignature::Field(parser.read_prefixed_string_utf8()?),
            _ => return Err(malformed_error!("Invalid MemberRef kind - {}", kind)),
        };
        module.push_member_ref(parent, name, signature);
    }

    for _ in 0..read_count(&mut parser)? {
        module.push_user_string(parser.read_prefixed_string_utf8()?);
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after module image",
            parser.remaining()
        ));
    }

    Ok(module)
}

/// Reads a table count, rejecting counts the remaining data cannot possibly hold.
fn read_count(parser: &mut Parser) -> Result<u32> {
    let count = parser.read_le::<u32>()?;
    if count as usize > parser.remaining() {
        return Err(malformed_error!(
            "Table declares {} rows with {} bytes left",
            count,
            parser.remaining()
        ));
    }
    Ok(count)
}

fn read_row(parser: &mut Parser, table: u8, seen: &mut HashSet<u32>) -> Result<Token> {
    let row = parser.read_le::<u32>()?;
    if row == 0 || row > 0x00FF_FFFF || !seen.insert(row) {
        return Err(malformed_error!(
            "Invalid or duplicate row {} in table {:#04x}",
            row,
            table
        ));
    }
    Ok(Token::from_parts(table, row))
}

fn read_method(parser: &mut Parser, token: Token) -> Result<Method> {
    let flags = MethodAttributes::from_bits_truncate(parser.read_le::<u16>()?);
    let name = parser.read_prefixed_string_utf8()?;
    let signature = read_signature(parser)?;

    let length = parser.read_le::<u32>()? as usize;
    if length == 0 {
        return Ok(Method::new(token, flags, name, signature, None));
    }

    let raw = parser.read_bytes(length)?;
    let body = decode_body(raw)?;
    Ok(Method::with_raw_body(
        token,
        flags,
        name,
        signature,
        body,
        raw.to_vec(),
    ))
}

fn read_signature(parser: &mut Parser) -> Result<MethodSignature> {
    let has_this = match parser.read_le::<u8>()? {
        0 => false,
        1 => true,
        other => return Err(malformed_error!("Invalid signature flag - {}", other)),
    };

    let count = parser.read_7bit_encoded_int()? as usize;
    if count > parser.remaining() {
        return Err(malformed_error!("Signature declares {} parameters", count));
    }

    let mut params = Vec::with_capacity(count);
    for _ in 0..count {
        params.push(parser.read_prefixed_string_utf8()?);
    }

    Ok(MethodSignature {
        has_this,
        params,
        return_type: parser.read_prefixed_string_utf8()?,
    })
}

/// Serializes a module into an image.
pub(crate) fn write(module: &Module) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_le_to(&mut out, VERSION);
    write_le_to(&mut out, 0_u16);
    write_prefixed_string_utf8(&mut out, module.name())?;

    write_count(&mut out, module.types().len())?;
    for ty in module.types() {
        write_le_to(&mut out, ty.flags);
        write_prefixed_string_utf8(&mut out, &ty.name)?;

        write_count(&mut out, ty.fields.len())?;
        for field in &ty.fields {
            write_le_to(&mut out, field.token.row());
            write_le_to(&mut out, field.flags);
            write_prefixed_string_utf8(&mut out, &field.name)?;
            write_prefixed_string_utf8(&mut out, &field.field_type)?;
        }

        write_count(&mut out, ty.methods.len())?;
        for method in &ty.methods {
            write_method(&mut out, module, ty, method)?;
        }
    }

    write_count(&mut out, module.type_refs().len())?;
    for type_ref in module.type_refs() {
        write_prefixed_string_utf8(&mut out, &type_ref.scope)?;
        write_prefixed_string_utf8(&mut out, &type_ref.name)?;
    }

    write_count(&mut out, module.member_refs().len())?;
    for member in module.member_refs() {
        let kind = match member.signature {
            MemberRefSignature::Method(_) => MEMBER_METHOD,
            MemberRefSignature::Field(_) => MEMBER_FIELD,
        };
        write_le_to(&mut out, kind);
        write_le_to(&mut out, member.parent.value());
        write_prefixed_string_utf8(&mut out, &member.name)?;
        match &member.signature {
            MemberRefSignature::Method(signature) => write_signature(&mut out, signature)?,
            MemberRefSignature::Field(field_type) => {
                write_prefixed_string_utf8(&mut out, field_type)?;
            }
        }
    }

    write_count(&mut out, module.user_strings().len())?;
    for value in module.user_strings() {
        write_prefixed_string_utf8(&mut out, value)?;
    }

    Ok(out)
}

fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count =
        u32::try_from(count).map_err(|_| malformed_error!("Table of {} rows is too large", count))?;
    write_le_to(out, count);
    Ok(())
}

fn write_method(out: &mut Vec<u8>, module: &Module, ty: &TypeDef, method: &Method) -> Result<()> {
    write_le_to(out, method.token.row());
    write_le_to(out, method.flags.bits());
    write_prefixed_string_utf8(out, &method.name)?;
    write_signature(out, &method.signature)?;

    let encoded;
    let body: &[u8] = match (method.raw_body(), method.body()) {
        (Some(raw), _) => raw,
        (None, Some(body)) => {
            debug!("Encoding edited body of {}::{}", ty.name, method.name);
            encoded = encode_body(body, module, method.signature.returns_value())?;
            &encoded
        }
        (None, None) => &[],
    };

    write_count(out, body.len())?;
    out.extend_from_slice(body);
    Ok(())
}

fn write_signature(out: &mut Vec<u8>, signature: &MethodSignature) -> Result<()> {
    write_le_to(out, u8::from(signature.has_this));
    let count = u32::try_from(signature.params.len())
        .map_err(|_| malformed_error!("Signature has too many parameters"))?;
    write_7bit_encoded_int(out, count);
    for param in &signature.params {
        write_prefixed_string_utf8(out, param)?;
    }
    write_prefixed_string_utf8(out, &signature.return_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Immediate, Instruction, OpCode, Operand},
        metadata::{
            method::{MethodBody, VOID},
            types::TypeAttributes,
        },
        Error,
    };

    fn sample() -> Module {
        let mut module = Module::new("Assembly-CSharp.dll");
        let ty = module.add_type(
            "StartGame/<Start>c__Iterator10",
            TypeAttributes::NESTED_PRIVATE,
        );
        module.add_field(ty, 1, "$current", "System.Object").unwrap();
        module
            .add_method(
                ty,
                MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
                "Reset",
                MethodSignature::instance(&[], VOID),
                None,
            )
            .unwrap();
        module.import_type("UnityEngine.dll", "UnityEngine.Input");
        module.user_string("");
        module
    }

    #[test]
    fn empty_module_layout() {
        let bytes = write(&Module::new("A")).unwrap();
        assert_eq!(
            bytes,
            [
                b'C', b'I', b'L', b'M', 1, 0, 0, 0, 1, b'A', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 0
            ]
        );
        assert_eq!(read(&bytes).unwrap().name(), "A");
    }

    #[test]
    fn write_read_write_is_stable() {
        let first = write(&sample()).unwrap();
        let module = read(&first).unwrap();

        assert_eq!(module.types().len(), 1);
        assert_eq!(module.types()[0].fields[0].name, "$current");
        assert_eq!(module.type_refs()[0].scope, "UnityEngine.dll");
        assert_eq!(module.user_strings(), [String::new()]);
        assert_eq!(write(&module).unwrap(), first);
    }

    #[test]
    fn untouched_bodies_are_copied_verbatim() {
        let mut module = Module::new("Game.dll");
        let ty = module.add_type("Game", 0);

        let mut body = MethodBody::new();
        body.max_stack = 2;
        let delay = Operand::Immediate(Immediate::Float32(0.25));
        body.push(Instruction::new(OpCode::LDC_R4, delay).unwrap())
            .unwrap();
        body.push(Instruction::new(OpCode::RET, Operand::None).unwrap())
            .unwrap();
        let signature = MethodSignature::new_static(&[], "System.Single");
        module
            .add_method(ty, MethodAttributes::STATIC, "Delay", signature, Some(body))
            .unwrap();

        let bytes = write(&module).unwrap();
        let reloaded = read(&bytes).unwrap();
        let method = reloaded.find_method("Game", "Delay", None).unwrap();
        assert!(method.raw_body().is_some());
        assert_eq!(method.body().unwrap().len(), 2);
        assert_eq!(write(&reloaded).unwrap(), bytes);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        assert!(matches!(read(b"MZ\x90\x00\x03\x00\x00\x00"), Err(Error::NotSupported)));

        let mut bytes = write(&Module::new("A")).unwrap();
        bytes[4] = 2;
        assert!(matches!(read(&bytes), Err(Error::NotSupported)));
    }

    #[test]
    fn rejects_truncation_and_trailing_data() {
        let bytes = write(&sample()).unwrap();
        for len in [3, 10, bytes.len() / 2, bytes.len() - 1] {
            assert!(read(&bytes[..len]).is_err(), "length {len}");
        }

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(read(&padded), Err(Error::Malformed { .. })));
    }

    #[test]
    fn rejects_member_ref_without_parent() {
        let mut module = Module::new("A");
        module.push_member_ref(
            Token::from_parts(Token::TYPE_REF, 1),
            "GetKey".to_string(),
            MemberRefSignature::Field("System.Int32".to_string()),
        );
        let bytes = write(&module).unwrap();
        assert!(matches!(read(&bytes), Err(Error::Malformed { .. })));
    }
}
