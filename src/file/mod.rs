//! Raw access to module files.
//!
//! This module abstracts over where the bytes of a module image come from. A [`File`] is
//! backed either by a read-only memory mapping of a file on disk or by an owned buffer,
//! and exposes the same bounds-checked view in both cases.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - The byte source handed to the module image reader
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::parser::Parser`] - Cursor used to decode images and CIL
//! - [`crate::file::io`] - Little-endian primitives
//!
//! # Examples
//!
//! ```rust,no_run
//! use ilpatch::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Assembly-CSharp.dll"))?;
//! println!("{} bytes, sha1 {}", file.len(), file.sha1_hex());
//! # Ok::<(), ilpatch::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;

use crate::{
    Error::{OutOfBounds, Persist},
    Result,
};
use memory::Memory;
use physical::Physical;

/// Backend trait for file data sources.
///
/// The trait provides a common interface for accessing module data regardless of whether
/// it's mapped from a file on disk or held in a memory buffer.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// The bytes of one module image plus the path they were loaded from.
pub struct File {
    /// The underlying data source (memory or file).
    data: Box<dyn Backend>,
    /// Where the data came from, if it was loaded from disk.
    origin: Option<PathBuf>,
}

impl File {
    /// Maps the file at `file` read-only.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileNotFound`] if the path does not exist,
    /// [`crate::Error::FileError`] if it cannot be mapped, or
    /// [`crate::Error::Malformed`] if the file is empty.
    pub fn from_file(file: &Path) -> Result<File> {
        if !file.exists() {
            return Err(crate::Error::FileNotFound(file.to_path_buf()));
        }

        let input = Physical::new(file)?;
        if input.len() == 0 {
            return Err(malformed_error!("File is empty - {}", file.display()));
        }

        Ok(File {
            data: Box::new(input),
            origin: Some(file.to_path_buf()),
        })
    }

    /// Wraps an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the buffer is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(malformed_error!("Provided memory buffer is empty"));
        }

        Ok(File {
            data: Box::new(Memory::new(data)),
            origin: None,
        })
    }

    /// Returns the number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if there is no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the complete data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range is not inside the data.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        if offset.checked_add(len).is_none() {
            return Err(OutOfBounds);
        }
        self.data.data_slice(offset, len)
    }

    /// The path this file was mapped from, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Lower-case hexadecimal SHA-1 of the complete data.
    ///
    /// Used to identify which build of a target a patch run saw.
    #[must_use]
    pub fn sha1_hex(&self) -> String {
        sha1_hex(self.data())
    }
}

/// Lower-case hexadecimal SHA-1 of `data`.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    Sha1::digest(data)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Replaces the file at `path` with `data`.
///
/// The data is staged in a temporary file next to `path`, flushed to disk and renamed over
/// the destination, so readers see either the old or the new contents and never a partial
/// file. The staging file is removed if anything fails.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if the staging file cannot be written and
/// [`crate::Error::Persist`] if it cannot be moved over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(directory)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mem() {
        let file = File::from_mem(vec![0x43, 0x49, 0x4C, 0x4D]).unwrap();
        assert_eq!(file.len(), 4);
        assert!(!file.is_empty());
        assert!(file.origin().is_none());
        assert_eq!(file.data_slice(1, 2).unwrap(), &[0x49, 0x4C]);
        assert!(file.data_slice(3, 2).is_err());
    }

    #[test]
    fn from_mem_empty() {
        assert!(File::from_mem(Vec::new()).is_err());
    }

    #[test]
    fn from_file_missing() {
        let result = File::from_file(Path::new("/nonexistent/Assembly-CSharp.dll"));
        assert!(matches!(result, Err(crate::Error::FileNotFound(_))));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.dll");
        std::fs::write(&path, b"old").unwrap();

        write_atomic(&path, b"new contents").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new contents");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("target.dll");

        assert!(write_atomic(&path, b"data").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
