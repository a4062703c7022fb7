//! One patch run against one target file.
//!
//! A session loads the target from a temporary copy, so the original file is not held open
//! while patches run, and loads the reference modules from the target's directory. Patches
//! edit the in-memory module only. Nothing touches the original file until
//! [`PatchSession::commit`], which writes the whole module in one atomic replace. Dropping a
//! session without committing leaves the original untouched, and the temporary copy is
//! removed either way.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ilpatch::patch::PatchSession;
//! use ilpatch::patches::{default_patch_set, REFERENCE_MODULES};
//! use std::path::Path;
//!
//! let mut session = PatchSession::open(Path::new("Managed/Assembly-CSharp.dll"), REFERENCE_MODULES)?;
//! session.apply(&default_patch_set()?)?;
//! let report = session.commit()?;
//! println!("{} -> {}", report.sha1_before, report.sha1_after);
//! # Ok::<(), ilpatch::Error>(())
//! ```

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use log::info;
use tempfile::NamedTempFile;

use crate::{
    file::{sha1_hex, write_atomic, File},
    metadata::{Module, References},
    patch::set::{PatchContext, PatchOutcome, PatchSet},
    Error::FileNotFound,
    Result,
};

/// Result of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The patched file
    pub target: PathBuf,
    /// Name of the patched module
    pub module: String,
    /// Every procedure that was applied, in order
    pub outcomes: Vec<PatchOutcome>,
    /// SHA-1 of the file before patching
    pub sha1_before: String,
    /// SHA-1 of the patched image
    pub sha1_after: String,
    /// False for a dry run
    pub written: bool,
}

/// An open target plus its reference modules.
pub struct PatchSession {
    target: PathBuf,
    working_copy: NamedTempFile,
    module: Module,
    references: References,
    sha1_before: String,
    outcomes: Vec<PatchOutcome>,
}

impl PatchSession {
    /// Opens `target` and the reference modules named in `reference_names`, which are
    /// looked up in the target's directory.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileNotFound`] if the target or a reference module is
    /// missing, and parse errors of any module.
    pub fn open(target: &Path, reference_names: &[&str]) -> Result<Self> {
        if !target.is_file() {
            return Err(FileNotFound(target.to_path_buf()));
        }

        let original = File::from_file(target)?;
        let sha1_before = original.sha1_hex();

        let mut working_copy = NamedTempFile::new()?;
        working_copy.write_all(original.data())?;
        working_copy.flush()?;
        drop(original);

        let module = Module::from_file(working_copy.path())?;
        info!(
            "Opened {} ({} types, sha1 {sha1_before})",
            target.display(),
            module.types().len()
        );

        let directory = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let references = References::open(directory, reference_names)?;
        info!("Loaded {} reference module(s)", references.modules().len());

        Ok(PatchSession {
            target: target.to_path_buf(),
            working_copy,
            module,
            references,
            sha1_before,
            outcomes: Vec::new(),
        })
    }

    /// The file that will be replaced on commit.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The temporary copy the module was loaded from.
    #[must_use]
    pub fn working_copy(&self) -> &Path {
        self.working_copy.path()
    }

    /// The module being patched.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The module being patched, for edits outside a patch set.
    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// The reference modules.
    #[must_use]
    pub fn references(&self) -> &References {
        &self.references
    }

    /// Procedures applied so far.
    #[must_use]
    pub fn outcomes(&self) -> &[PatchOutcome] {
        &self.outcomes
    }

    /// Runs every procedure of `set` against the module.
    ///
    /// # Errors
    /// Returns [`crate::Error::PatchFailed`] for the first failing procedure. The session
    /// should then be dropped; the original file has not been touched.
    pub fn apply(&mut self, set: &PatchSet) -> Result<&[PatchOutcome]> {
        let mut cx = PatchContext::new(&mut self.module, &self.references);
        let outcomes = set.apply(&mut cx)?;
        self.outcomes.extend(outcomes);
        Ok(&self.outcomes)
    }

    /// Encodes the module and replaces the target with it.
    ///
    /// # Errors
    /// Returns encoding errors, or [`crate::Error::FileError`] and
    /// [`crate::Error::Persist`] if writing fails. The original file is intact in every
    /// error case.
    pub fn commit(self) -> Result<PatchReport> {
        let bytes = self.module.to_bytes()?;
        write_atomic(&self.target, &bytes)?;
        info!("Saved {} ({} bytes)", self.target.display(), bytes.len());

        Ok(self.into_report(&bytes, true))
    }

    /// Encodes the module without writing it, to check that every edit can be saved.
    ///
    /// # Errors
    /// Returns encoding errors.
    pub fn dry_run(self) -> Result<PatchReport> {
        let bytes = self.module.to_bytes()?;
        info!("Dry run, {} left unchanged", self.target.display());

        Ok(self.into_report(&bytes, false))
    }

    fn into_report(self, bytes: &[u8], written: bool) -> PatchReport {
        PatchReport {
            target: self.target,
            module: self.module.name().to_string(),
            outcomes: self.outcomes,
            sha1_before: self.sha1_before,
            sha1_after: sha1_hex(bytes),
            written,
        }
    }
}
