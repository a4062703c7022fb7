use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// A single mismatch between the instruction a patch expects and the instruction
/// actually present in the target.
///
/// Drifts are collected rather than thrown one at a time, so that a failing patch can
/// report every site that no longer matches the build it was authored against.
///
/// # Examples
///
/// ```rust
/// use ilpatch::Drift;
///
/// let drift = Drift::new("ldc.r4", "nop").at_offset(0x0129);
/// assert_eq!(drift.to_string(), "IL_0129: expected ldc.r4, got nop");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    /// Original byte offset of the inspected site, if it was located by offset
    pub offset: Option<u32>,
    /// Position of the inspected site within the instruction list, if known
    pub index: Option<usize>,
    /// Human-readable description of what the patch expected
    pub expected: String,
    /// Human-readable description of what was found
    pub actual: String,
}

impl Drift {
    /// Creates a drift record without location information.
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Drift {
            offset: None,
            index: None,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Attaches the original byte offset of the site.
    #[must_use]
    pub fn at_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attaches the instruction list position of the site.
    #[must_use]
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.offset, self.index) {
            (Some(offset), _) => write!(f, "IL_{offset:04x}: ")?,
            (None, Some(index)) => write!(f, "#{index}: ")?,
            (None, None) => {}
        }
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

fn join_drifts(drifts: &[Drift]) -> String {
    drifts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## I/O
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::FileNotFound`] - A target or reference module does not exist
/// - [`Error::Persist`] - The patched module could not replace the original file
///
/// ## Module image parsing
/// - [`Error::Malformed`] - Corrupted or invalid container or method body
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the data
/// - [`Error::NotSupported`] - Unknown container version
///
/// ## Symbol resolution
/// - [`Error::TypeNotFound`], [`Error::MethodNotFound`], [`Error::FieldNotFound`]
/// - [`Error::AmbiguousSymbol`] - A lookup matched more than one member
/// - [`Error::UnresolvedToken`] - An operand token points nowhere
///
/// ## Drift
/// - [`Error::VersionDrift`] - An asserted instruction has a different shape
/// - [`Error::IncompletePatch`] - Not every site of a patch descriptor matched
/// - [`Error::AlreadyApplied`] - The target already carries the patch
///
/// ## Engine misuse
/// - [`Error::StaleOffsets`], [`Error::StaleAnchor`], [`Error::ForeignInstruction`],
///   [`Error::UnboundLabel`], [`Error::ForeignLabel`], [`Error::DanglingTarget`],
///   [`Error::InstructionInUse`], [`Error::OperandMismatch`], [`Error::InvalidDescriptor`]
///
/// # Examples
///
/// ```rust,no_run
/// use ilpatch::{Error, metadata::Module};
/// use std::path::Path;
///
/// match Module::from_file(Path::new("Assembly-CSharp.dll")) {
///     Ok(module) => println!("loaded {}", module.name()),
///     Err(Error::FileNotFound(path)) => eprintln!("missing: {}", path.display()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // I/O errors
    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A module file that is required for the run does not exist.
    #[error("File not found - {}", .0.display())]
    FileNotFound(PathBuf),

    /// The patched module could not be moved over the original file.
    ///
    /// The original file is left untouched when this happens.
    #[error("Unable to save patched module to {}: {source}", path.display())]
    Persist {
        /// Destination that was supposed to receive the patched module
        path: PathBuf,
        /// The underlying I/O failure
        source: std::io::Error,
    },

    // Parsing errors
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type or container version is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    // Symbol resolution
    /// No type with this full name exists in the module.
    #[error("Type `{name}` not found in module `{module}`")]
    TypeNotFound {
        /// Module that was searched
        module: String,
        /// Full name of the requested type
        name: String,
    },

    /// No method matched the lookup.
    #[error("Method `{name}` not found on `{type_name}`")]
    MethodNotFound {
        /// Full name of the declaring type
        type_name: String,
        /// Requested method name (with parameter filter, if any)
        name: String,
    },

    /// No field with this name exists on the type.
    #[error("Field `{name}` not found on `{type_name}`")]
    FieldNotFound {
        /// Full name of the declaring type
        type_name: String,
        /// Requested field name
        name: String,
    },

    /// A lookup that must be unique matched several members.
    #[error("Lookup for `{0}` is ambiguous")]
    AmbiguousSymbol(String),

    /// A metadata token does not resolve to any row of the module.
    #[error("Token {0} does not resolve in this module")]
    UnresolvedToken(Token),

    // Drift
    /// An asserted instruction does not have the expected shape.
    ///
    /// This is the central failure mode of the engine: patches are authored against one
    /// exact build of the target and refuse to touch anything else.
    #[error("Version drift in {context}: {}", join_drifts(drifts))]
    VersionDrift {
        /// Method or procedure in which the drift was observed
        context: String,
        /// Every mismatch that was found
        drifts: Vec<Drift>,
    },

    /// Not all sites of a patch descriptor were matched.
    #[error(
        "Incomplete patch in {method}: {matched} of {expected} sites matched, target likely updated ({})",
        join_drifts(drifts)
    )]
    IncompletePatch {
        /// Method the descriptor targets
        method: String,
        /// Sites that were found with the expected shape
        matched: usize,
        /// Sites the descriptor declares
        expected: usize,
        /// Why the remaining sites did not match
        drifts: Vec<Drift>,
    },

    /// The target already contains the edit a procedure would make.
    #[error("Patch `{0}` is already applied to this module")]
    AlreadyApplied(String),

    // Engine misuse
    /// Offsets were used for lookup after the body had been shifted by an edit.
    #[error("Offsets of this body are stale after a previous edit")]
    StaleOffsets,

    /// A splice anchor is no longer part of the body.
    #[error("Anchor instruction is no longer attached to the body")]
    StaleAnchor,

    /// An instruction handle belongs to a different body.
    #[error("Instruction handle belongs to another method body")]
    ForeignInstruction,

    /// A sequence label was referenced but never bound to an instruction.
    #[error("Label {0} was referenced but never bound")]
    UnboundLabel(usize),

    /// A label created by one sequence was used in another.
    #[error("Label {0} belongs to another sequence")]
    ForeignLabel(usize),

    /// A branch operand targets an instruction that is not in the body.
    #[error("Branch target is not attached to the body")]
    DanglingTarget,

    /// An instruction cannot be removed while branches or handlers still point at it.
    #[error("Instruction is still referenced by {0} branch or handler operand(s)")]
    InstructionInUse(usize),

    /// An operand does not fit the opcode it was paired with.
    #[error("Operand mismatch for {opcode}: expected {expected}")]
    OperandMismatch {
        /// Mnemonic of the opcode
        opcode: &'static str,
        /// Operand kind the opcode requires
        expected: &'static str,
    },

    /// A patch descriptor failed structural validation.
    #[error("Invalid patch descriptor `{name}`: {message}")]
    InvalidDescriptor {
        /// Descriptor name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// A position in the instruction list does not exist.
    #[error("Instruction index {0} is out of range")]
    IndexOutOfRange(usize),

    /// No instruction starts at the requested offset.
    #[error("No instruction at offset IL_{0:04x}")]
    OffsetNotFound(u32),

    // Orchestration
    /// A procedure of a patch set failed; the run was aborted before write-back.
    #[error("Patch `{patch}` failed: {source}")]
    PatchFailed {
        /// Name of the failing procedure
        patch: String,
        /// The failure reported by the procedure
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if this error means the target is not the build the patch expects.
    ///
    /// Looks through [`Error::PatchFailed`] wrappers.
    #[must_use]
    pub fn is_drift(&self) -> bool {
        match self {
            Error::VersionDrift { .. }
            | Error::IncompletePatch { .. }
            | Error::AlreadyApplied(_) => true,
            Error::PatchFailed { source, .. } => source.is_drift(),
            _ => false,
        }
    }
}

impl From<Drift> for Error {
    fn from(drift: Drift) -> Self {
        Error::VersionDrift {
            context: "instruction".to_string(),
            drifts: vec![drift],
        }
    }
}
