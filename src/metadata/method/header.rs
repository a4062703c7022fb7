//! ECMA-335 method body headers and exception handling sections (II.25.4).
//!
//! A serialized method body is a tiny (1 byte) or fat (12 byte) header, the raw CIL code, and
//! for fat headers optionally a chain of 4-byte aligned data sections holding exception
//! handling clauses in small or fat layout. [`MethodHeader::parse`] reads all of this;
//! [`MethodHeader::write`] produces the most compact encoding for a given code blob.

use crate::{
    file::io::{read_le, read_le_at, write_le_to},
    metadata::{
        method::{ExceptionClause, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
    },
    Error::OutOfBounds,
    Result,
};

/// Size in bytes of a fat header.
pub const FAT_HEADER_SIZE: usize = 12;

/// Largest code size a tiny header can describe.
pub const TINY_MAX_CODE_SIZE: usize = 63;

/// Largest stack depth a tiny header implies.
pub const TINY_MAX_STACK: u16 = 8;

/// Describes the layout of one serialized method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodHeader {
    /// Size of the header in bytes (1 or 12)
    pub size_header: usize,
    /// Size of the CIL code in bytes
    pub size_code: usize,
    /// Maximum evaluation stack depth (8 for tiny headers)
    pub max_stack: u16,
    /// Token of the local variable signature, null if there are no locals
    pub local_var_sig_token: Token,
    /// Fat or tiny header
    pub is_fat: bool,
    /// Locals are zero-initialized
    pub init_locals: bool,
    /// Exception handling clauses from the data sections
    pub clauses: Vec<ExceptionClause>,
}

impl MethodHeader {
    /// Parses a serialized method body.
    ///
    /// # Arguments
    /// * `data` - The body, starting at the header; may extend past the body's end
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the body is truncated, or
    /// [`crate::Error::Malformed`] if the header format is invalid.
    pub fn parse(data: &[u8]) -> Result<MethodHeader> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_00000011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodHeader {
                    size_header: 1,
                    size_code,
                    max_stack: TINY_MAX_STACK,
                    local_var_sig_token: Token::new(0),
                    is_fat: false,
                    init_locals: false,
                    clauses: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < FAT_HEADER_SIZE {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;

                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat method header declares {} bytes",
                        size_header
                    ));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                let Some(code_end) = size_header.checked_add(size_code) else {
                    return Err(OutOfBounds);
                };
                if data.len() < code_end {
                    return Err(OutOfBounds);
                }

                let local_var_sig_token = Token::new(read_le::<u32>(&data[8..])?);
                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000111111111111_u16);
                let max_stack = read_le::<u16>(&data[2..])?;

                let clauses = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    parse_sections(data, code_end)?
                } else {
                    Vec::new()
                };

                Ok(MethodHeader {
                    size_header,
                    size_code,
                    max_stack,
                    local_var_sig_token,
                    is_fat: true,
                    init_locals: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    clauses,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// The code bytes of the body this header was parsed from.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the header describes.
    pub fn code<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        data.get(self.size_header..self.size_header + self.size_code)
            .ok_or(OutOfBounds)
    }

    /// Serializes a header for `code`, followed by the code and any exception sections.
    ///
    /// A tiny header is chosen whenever the body allows it: short code, a stack depth of at
    /// most 8, no locals, and no exception handlers. `size_header`, `size_code` and `is_fat`
    /// of `self` are ignored and derived from `code`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code or the clause table is too large to
    /// encode.
    pub fn write(&self, code: &[u8]) -> Result<Vec<u8>> {
        let is_tiny = code.len() <= TINY_MAX_CODE_SIZE
            && self.max_stack <= TINY_MAX_STACK
            && self.local_var_sig_token.is_null()
            && !self.init_locals
            && self.clauses.is_empty();

        let mut out = Vec::with_capacity(FAT_HEADER_SIZE + code.len());
        if is_tiny {
            // Fits in six bits, checked above
            #[allow(clippy::cast_possible_truncation)]
            let first_byte = ((code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8;
            out.push(first_byte);
            out.extend_from_slice(code);
            return Ok(out);
        }

        let code_size = u32::try_from(code.len())
            .map_err(|_| malformed_error!("Method code of {} bytes is too large", code.len()))?;

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.clauses.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        // Header size in dwords lives in the top four bits
        write_le_to(&mut out, flags.bits() | (3 << 12));
        write_le_to(&mut out, self.max_stack);
        write_le_to(&mut out, code_size);
        write_le_to(&mut out, self.local_var_sig_token.value());
        out.extend_from_slice(code);

        if !self.clauses.is_empty() {
            while out.len() % 4 != 0 {
                out.push(0);
            }
            write_section(&mut out, &self.clauses)?;
        }

        Ok(out)
    }
}

fn parse_sections(data: &[u8], code_end: usize) -> Result<Vec<ExceptionClause>> {
    let mut clauses = Vec::new();

    let mut cursor = (code_end + 3) & !3;
    loop {
        if data.len() < cursor + 4 {
            return Err(OutOfBounds);
        }

        let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(&data[cursor..])?);
        if !section_flags.contains(SectionFlags::EHTABLE) {
            return Err(malformed_error!(
                "Unsupported method data section kind - {:#x}",
                section_flags.bits()
            ));
        }

        let section_start = cursor;
        if section_flags.contains(SectionFlags::FAT_FORMAT) {
            let section_size = (read_le::<u32>(&data[cursor..])? >> 8) as usize;
            if section_size < 4 || data.len() < cursor + section_size {
                return Err(malformed_error!("Invalid fat section size - {}", section_size));
            }

            cursor += 4;
            for _ in 0..(section_size - 4) / 24 {
                // Flags occupy the low half of a 32-bit field in the fat layout
                #[allow(clippy::cast_possible_truncation)]
                let flags = read_le_at::<u32>(data, &mut cursor)? as u16;
                clauses.push(ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                    try_offset: read_le_at::<u32>(data, &mut cursor)?,
                    try_length: read_le_at::<u32>(data, &mut cursor)?,
                    handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                    handler_length: read_le_at::<u32>(data, &mut cursor)?,
                    class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
            cursor = section_start + section_size;
        } else {
            let section_size = usize::from(read_le::<u8>(&data[cursor + 1..])?);
            if section_size < 4 || data.len() < cursor + section_size {
                return Err(malformed_error!("Invalid small section size - {}", section_size));
            }

            cursor += 4;
            for _ in 0..(section_size - 4) / 12 {
                clauses.push(ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                        data,
                        &mut cursor,
                    )?),
                    try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                    handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                    class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                });
            }
            cursor = section_start + section_size;
        }

        if !section_flags.contains(SectionFlags::MORE_SECTS) {
            break;
        }
        cursor = (cursor + 3) & !3;
    }

    Ok(clauses)
}

// Narrowing casts below are bounded by ExceptionClause::is_small and the size checks
#[allow(clippy::cast_possible_truncation)]
fn write_section(out: &mut Vec<u8>, clauses: &[ExceptionClause]) -> Result<()> {
    let small_size = 4 + clauses.len() * 12;
    if small_size <= usize::from(u8::MAX) && clauses.iter().all(ExceptionClause::is_small) {
        out.push(SectionFlags::EHTABLE.bits());
        out.push(small_size as u8);
        write_le_to(out, 0_u16);

        for clause in clauses {
            write_le_to(out, clause.flags.bits());
            write_le_to(out, clause.try_offset as u16);
            write_le_to(out, clause.try_length as u8);
            write_le_to(out, clause.handler_offset as u16);
            write_le_to(out, clause.handler_length as u8);
            write_le_to(out, clause.class_token_or_filter);
        }
        return Ok(());
    }

    let fat_size = 4 + clauses.len() * 24;
    if fat_size > 0x00FF_FFFF {
        return Err(malformed_error!(
            "Too many exception clauses to encode - {}",
            clauses.len()
        ));
    }

    // 24-bit size above the kind byte
    let kind_and_size = u32::from((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits())
        | ((fat_size as u32) << 8);
    write_le_to(out, kind_and_size);

    for clause in clauses {
        write_le_to(out, u32::from(clause.flags.bits()));
        write_le_to(out, clause.try_offset);
        write_le_to(out, clause.try_length);
        write_le_to(out, clause.handler_offset);
        write_le_to(out, clause.handler_length);
        write_le_to(out, clause.class_token_or_filter);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(max_stack: u16, clauses: Vec<ExceptionClause>) -> MethodHeader {
        MethodHeader {
            size_header: 0,
            size_code: 0,
            max_stack,
            local_var_sig_token: Token::new(0),
            is_fat: false,
            init_locals: false,
            clauses,
        }
    }

    #[test]
    fn tiny() {
        // ldarg.0; ldfld 0x04000001; ret
        let data = [0x1E, 0x02, 0x7B, 0x01, 0x00, 0x00, 0x04, 0x2A];

        let method_header = MethodHeader::parse(&data).unwrap();

        assert!(!method_header.is_fat);
        assert!(!method_header.init_locals);
        assert_eq!(method_header.max_stack, 8);
        assert_eq!(method_header.size_code, 7);
        assert_eq!(method_header.size_header, 1);
        assert!(method_header.local_var_sig_token.is_null());
        assert_eq!(method_header.code(&data).unwrap(), &data[1..]);

        let written = header(1, Vec::new()).write(&data[1..]).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn tiny_truncated() {
        assert!(matches!(MethodHeader::parse(&[0x1A, 0x02]), Err(OutOfBounds)));
        assert!(MethodHeader::parse(&[]).is_err());
        assert!(MethodHeader::parse(&[0x01]).is_err());
    }

    #[test]
    fn fat() {
        let mut data = vec![
            0x13, 0x30, // flags: FAT | INIT_LOCALS, size 3 dwords
            0x05, 0x00, // max stack
            0x02, 0x00, 0x00, 0x00, // code size
            0x59, 0x00, 0x00, 0x11, // local var sig token
        ];
        data.extend_from_slice(&[0x16, 0x2A]);

        let method_header = MethodHeader::parse(&data).unwrap();

        assert!(method_header.is_fat);
        assert!(method_header.init_locals);
        assert!(method_header.clauses.is_empty());
        assert_eq!(method_header.max_stack, 5);
        assert_eq!(method_header.size_code, 2);
        assert_eq!(method_header.size_header, 12);
        assert_eq!(method_header.local_var_sig_token, Token::new(0x1100_0059));

        let written = method_header.write(&[0x16, 0x2A]).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn fat_forced_by_stack() {
        let code = [0x00; 10];
        let written = header(9, Vec::new()).write(&code).unwrap();
        assert_eq!(written.len(), FAT_HEADER_SIZE + code.len());

        let parsed = MethodHeader::parse(&written).unwrap();
        assert!(parsed.is_fat);
        assert_eq!(parsed.max_stack, 9);
    }

    #[test]
    fn small_exception_section() {
        let clause = ExceptionClause {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 0x0F,
            handler_offset: 0x0F,
            handler_length: 0x0D,
            class_token_or_filter: 0x0100_003F,
        };
        let code = [0x00; 0x1E];
        let written = header(1, vec![clause]).write(&code).unwrap();

        // 12 header + 30 code, padded to 44, then 4 + 12 section bytes
        assert_eq!(written.len(), 44 + 16);
        assert_eq!(written[44], SectionFlags::EHTABLE.bits());
        assert_eq!(written[45], 16);

        let parsed = MethodHeader::parse(&written).unwrap();
        assert_eq!(parsed.clauses, vec![clause]);
    }

    #[test]
    fn fat_exception_section() {
        let clauses = vec![
            ExceptionClause {
                flags: ExceptionHandlerFlags::FINALLY,
                try_offset: 0,
                try_length: 0x200,
                handler_offset: 0x200,
                handler_length: 0x10,
                class_token_or_filter: 0,
            },
            ExceptionClause {
                flags: ExceptionHandlerFlags::FILTER,
                try_offset: 0,
                try_length: 0x10,
                handler_offset: 0x220,
                handler_length: 0x2,
                class_token_or_filter: 0x210,
            },
        ];
        let code = vec![0x00; 0x230];
        let written = header(2, clauses.clone()).write(&code).unwrap();
        assert_eq!(
            written[FAT_HEADER_SIZE + code.len()],
            (SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits()
        );

        let parsed = MethodHeader::parse(&written).unwrap();
        assert_eq!(parsed.clauses, clauses);
        assert_eq!(parsed.code(&written).unwrap().len(), 0x230);
    }

    #[test]
    fn truncated_section() {
        let clause = ExceptionClause {
            flags: ExceptionHandlerFlags::FAULT,
            try_offset: 0,
            try_length: 1,
            handler_offset: 1,
            handler_length: 1,
            class_token_or_filter: 0,
        };
        let mut written = header(1, vec![clause]).write(&[0x00, 0xDC]).unwrap();
        written.truncate(written.len() - 4);
        assert!(MethodHeader::parse(&written).is_err());
    }
}
