// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # ilpatch
//!
//! Drift-checked instruction patching for compiled CIL modules.
//!
//! `ilpatch` loads a module, locates instructions inside a method body, asserts that they
//! look exactly like the build a patch was written against, and only then rewrites them.
//! Branches and exception handlers refer to instructions by handle rather than by byte
//! offset, so inserting code never breaks control flow. When the bytes are written back,
//! branch forms are widened where needed and the method header is recomputed.
//!
//! ## Features
//!
//! - **Drift detection** - Every edit is preceded by an assertion; mismatches are collected
//!   and reported per site, and nothing is modified when any site fails
//! - **Stable instruction handles** - Edits never invalidate branch targets or handler
//!   boundaries
//! - **Code insertion with labels** - Build sequences with forward and backward branches and
//!   splice them after an anchor
//! - **Import management** - Reference methods of other modules, reusing existing
//!   references
//! - **Safe write-back** - Patches run on a working copy; the target is replaced atomically
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ilpatch::patch::PatchSession;
//! use ilpatch::patches::{default_patch_set, REFERENCE_MODULES};
//! use std::path::Path;
//!
//! let mut session = PatchSession::open(Path::new("Assembly-CSharp.dll"), REFERENCE_MODULES)?;
//! session.apply(&default_patch_set()?)?;
//! let report = session.commit()?;
//! println!("{} -> {}", report.sha1_before, report.sha1_after);
//! # Ok::<(), ilpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - CIL opcodes, instruction decoding and body encoding
//! - [`metadata`] - Modules, types, methods, editable bodies and cross-module references
//! - [`patch`] - Locating, asserting and editing instructions; patch sets and sessions
//! - [`patches`] - The built-in patches
//! - [`file`] - Memory-mapped or in-memory module bytes
//! - [`Error`] and [`Result`] - Error handling, with [`Drift`] records for mismatches
//!
//! ## Error Handling
//!
//! Drift is an expected outcome when a target is updated, and is kept apart from broken
//! input and misuse of the engine:
//!
//! ```rust,no_run
//! use ilpatch::{patch::PatchSession, Error};
//!
//! match PatchSession::open("Assembly-CSharp.dll".as_ref(), &[]) {
//!     Ok(_) => println!("Loaded"),
//!     Err(Error::FileNotFound(path)) => println!("Missing {}", path.display()),
//!     Err(e) if e.is_drift() => println!("Target changed: {e}"),
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Fixture modules shared by the unit tests, the integration tests and the CLI tests.
#[doc(hidden)]
pub mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use ilpatch::prelude::*;
///
/// let module = Module::from_file("Assembly-CSharp.dll".as_ref())?;
/// let body = module.find_method("Dialogue", "Update", None)?.body();
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub mod prelude;

/// CIL opcodes, instruction decoding and method body encoding based on ECMA-335
///
/// # Key Types
///
/// - [`assembly::OpCode`] - The instruction set with operand types and stack effects
/// - [`assembly::Instruction`] / [`assembly::Operand`] - A decoded instruction
/// - [`assembly::decode_body`] - Decode a serialized body into a [`metadata::method::MethodBody`]
/// - [`assembly::encode_body`] - Serialize a body, choosing branch forms and the header
pub mod assembly;

/// Access to module bytes on disk or in memory
pub mod file;

/// Modules, their types and methods, and references into other modules
pub mod metadata;

/// The patch engine: locate, assert, edit and write back
pub mod patch;

/// Built-in patches
pub mod patches;

/// `ilpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use ilpatch::{metadata::Module, Result};
///
/// fn load(path: &str) -> Result<Module> {
///     Module::from_file(std::path::Path::new(path))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `ilpatch` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// A mismatch between an expected and an actual instruction.
pub use error::Drift;

/// Provides access to low-level file and memory parsing utilities.
///
/// # Example
///
/// ```rust
/// use ilpatch::{assembly::{decode_instruction, OpCode}, Parser};
///
/// let code = [0x2A]; // ret
/// let mut parser = Parser::new(&code);
/// let instruction = decode_instruction(&mut parser)?;
/// assert_eq!(instruction.opcode, OpCode::RET);
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub use file::{parser::Parser, File};
