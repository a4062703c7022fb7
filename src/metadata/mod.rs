//! Module metadata: types, methods, references and their tokens.
//!
//! # Key Components
//!
//! - [`Module`] - A loaded module with its types, references and user strings
//! - [`method`] - Method definitions and their editable bodies
//! - [`types`] - Type and field definitions
//! - [`imports`] - References into other modules and the set of modules they resolve against
//! - [`token`] - Metadata table row references used throughout
//! - [`image`] - The module image container
//!
//! # Examples
//!
//! ```rust,no_run
//! use ilpatch::metadata::Module;
//!
//! let module = Module::from_file("Assembly-CSharp.dll".as_ref())?;
//! for ty in module.types() {
//!     println!("{} ({} methods)", ty.name, ty.methods.len());
//! }
//! # Ok::<(), ilpatch::Error>(())
//! ```

/// Implementation of the module image container
pub mod image;
/// Implementation of references into other modules
pub mod imports;
/// Implementation of methods, signatures and bodies
pub mod method;
/// Implementation of the in-memory module
pub mod module;
/// Commonly used metadata token type
pub mod token;
/// Implementation of type and field definitions
pub mod types;

pub use imports::References;
pub use module::Module;
