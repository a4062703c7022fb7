//! Little-endian reading and writing of primitive values.
//!
//! Everything `ilpatch` persists (module images, method body headers, CIL operands) is
//! little-endian. This module provides the [`CilIO`] trait plus bounds-checked helpers to
//! read values out of byte slices and to write them either in place or by appending to a
//! growable buffer.
//!
//! # Examples
//!
//! ```rust
//! use ilpatch::file::io::{read_le_at, write_le_to};
//!
//! let mut buffer = Vec::new();
//! write_le_to(&mut buffer, 0x0129_u32);
//! write_le_to(&mut buffer, 0.0001_f32);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u32>(&buffer, &mut offset)?, 0x0129);
//! assert_eq!(read_le_at::<f32>(&buffer, &mut offset)?, 0.0001);
//! # Ok::<(), ilpatch::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be converted to and from little-endian bytes.
pub trait CilIO: Sized {
    /// The byte array representation of this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode a value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode a value into its little-endian representation
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Read a value from the start of the buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a value at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Overwrite the bytes at `offset` with `value` and advance `offset` past it.
///
/// Used to back-patch sizes and offsets after the data following them has been emitted.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value would extend past the buffer.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

/// Append `value` to the end of a growable buffer.
pub fn write_le_to<T: CilIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_le_bytes().as_ref());
}
