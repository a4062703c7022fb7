//! Low-level byte stream parser for module images and CIL bytecode.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used by both the module image reader and the CIL instruction decoder. All reads are
//! bounds-checked; a truncated or corrupt input produces [`crate::Error::OutOfBounds`] or
//! [`crate::Error::Malformed`] instead of a panic.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser::seek`] / [`crate::file::parser::Parser::advance_by`] - navigation
//! - [`crate::file::parser::Parser::read_le`] - primitive values (little-endian)
//! - [`crate::file::parser::Parser::read_bytes`] - borrowed byte ranges
//! - [`crate::file::parser::Parser::read_7bit_encoded_int`] - length prefixes
//! - [`crate::file::parser::Parser::read_prefixed_string_utf8`] - length-prefixed UTF-8 strings
//!
//! # Usage Examples
//!
//! ```rust
//! use ilpatch::Parser;
//!
//! let data = [0x22, 0x17, 0xB7, 0xD1, 0x38]; // ldc.r4 0.0001
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0x22);
//! assert_eq!(parser.read_le::<f32>()?, 0.0001);
//! assert!(!parser.has_more_data());
//! # Ok::<(), ilpatch::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A cursor over a byte slice.
///
/// `Parser` maintains an internal position and provides bounds checking to prevent
/// buffer overruns when reading malformed or truncated data.
///
/// # Examples
///
/// ```rust
/// use ilpatch::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut parser = Parser::new(&data);
///
/// let first = parser.read_le::<u32>()?;
/// assert_eq!(first, 0x04030201);
///
/// parser.seek(6)?;
/// let last_bytes = parser.read_le::<u16>()?;
/// assert_eq!(last_bytes, 0x0807);
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is unread data left.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to `len()` is allowed and leaves the parser at end of data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if this would move past the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.calc_end_position(step)?;
        self.position = end;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes between the cursor and the end of data.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Read the byte at the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at end of data.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(OutOfBounds);
        }
        Ok(self.data[self.position])
    }

    /// Read a little-endian primitive and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `length` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a 7-bit encoded unsigned integer (`BinaryWriter.Write7BitEncodedInt` format).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or
    /// [`crate::Error::Malformed`] if the value does not fit a `u32`.
    pub fn read_7bit_encoded_int(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;

        loop {
            if self.position >= self.data.len() {
                return Err(OutOfBounds);
            }

            let byte = self.data[self.position];
            self.position += 1;

            value |= u32::from(byte & 0x7F) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }

            // A 5th continuation byte would push past 32 bits.
            if shift >= 32 {
                return Err(malformed_error!(
                    "7-bit encoded integer overflow: value exceeds u32 capacity after {} bits",
                    shift
                ));
            }
        }

        Ok(value)
    }

    /// Read a UTF-8 string prefixed with its 7-bit encoded byte length.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or
    /// [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let length = self.read_7bit_encoded_int()? as usize;
        let start = self.position;
        let string_data = self.read_bytes(length)?;

        String::from_utf8(string_data.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                e.utf8_error()
            )
        })
    }

    fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;

        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(end)
    }
}

/// Append a 7-bit encoded unsigned integer, the inverse of
/// [`Parser::read_7bit_encoded_int`].
pub fn write_7bit_encoded_int(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        // Intentional truncation: the low seven bits plus continuation flag
        #[allow(clippy::cast_possible_truncation)]
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    out.push(value as u8);
}

/// Append a UTF-8 string with a 7-bit encoded length prefix, the inverse of
/// [`Parser::read_prefixed_string_utf8`].
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the string is longer than `u32::MAX` bytes.
pub fn write_prefixed_string_utf8(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let length = u32::try_from(value.len())
        .map_err(|_| malformed_error!("String of {} bytes is too long", value.len()))?;
    write_7bit_encoded_int(out, length);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_and_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        assert!(parser.seek(3).is_ok());
        assert!(!parser.has_more_data());
        assert!(parser.seek(4).is_err());
        assert!(parser.peek_byte().is_err());
    }

    #[test]
    fn test_read_bytes() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut parser = Parser::new(&data);

        parser.advance_by(1).unwrap();
        assert_eq!(parser.read_bytes(2).unwrap(), &[0x02, 0x03]);
        assert_eq!(parser.remaining(), 1);
        assert!(parser.read_bytes(2).is_err());
        assert_eq!(parser.pos(), 3);
    }

    #[test]
    fn test_7bit_encoded_int() {
        let test_cases = [
            (vec![0x00], 0),
            (vec![0x7F], 127),
            (vec![0x80, 0x01], 128),
            (vec![0xFF, 0x7F], 16383),
            (vec![0x80, 0x80, 0x01], 16384),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_7bit_encoded_int().unwrap(), expected);

            let mut encoded = Vec::new();
            write_7bit_encoded_int(&mut encoded, expected);
            assert_eq!(encoded, input);
        }
    }

    #[test]
    fn test_7bit_encoded_int_overflow() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_7bit_encoded_int(),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_prefixed_string() {
        let mut encoded = Vec::new();
        write_prefixed_string_utf8(&mut encoded, "Dialogue/<SlowText>c__IteratorD").unwrap();
        write_prefixed_string_utf8(&mut encoded, "").unwrap();

        let mut parser = Parser::new(&encoded);
        assert_eq!(
            parser.read_prefixed_string_utf8().unwrap(),
            "Dialogue/<SlowText>c__IteratorD"
        );
        assert_eq!(parser.read_prefixed_string_utf8().unwrap(), "");
        assert!(!parser.has_more_data());
    }

    #[test]
    fn test_prefixed_string_invalid_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut parser = Parser::new(&data);
        assert!(parser.read_prefixed_string_utf8().is_err());
    }
}
