//! Named patch procedures and the ordered set that runs them.

use std::fmt;

use log::info;

use crate::{
    metadata::{method::MethodBody, Module, References},
    Drift,
    Error::{InvalidDescriptor, PatchFailed, VersionDrift},
    Result,
};

/// What a patch procedure works on.
pub struct PatchContext<'a> {
    /// The module being patched
    pub target: &'a mut Module,
    /// Read-only modules symbols may be imported from
    pub references: &'a References,
}

impl<'a> PatchContext<'a> {
    /// Creates a context.
    pub fn new(target: &'a mut Module, references: &'a References) -> Self {
        PatchContext { target, references }
    }

    /// The body of `type_name::method_name`.
    ///
    /// # Errors
    /// Returns lookup errors from [`Module::find_method`], or [`crate::Error::VersionDrift`]
    /// if the method has no body.
    pub fn body(&self, type_name: &str, method_name: &str) -> Result<&MethodBody> {
        self.target
            .find_method(type_name, method_name, None)?
            .body()
            .ok_or_else(|| missing_body(type_name, method_name))
    }

    /// The body of `type_name::method_name`, borrowed for editing.
    ///
    /// # Errors
    /// See [`PatchContext::body`].
    pub fn body_mut(&mut self, type_name: &str, method_name: &str) -> Result<&mut MethodBody> {
        self.target
            .find_method_mut(type_name, method_name, None)?
            .body_mut()
            .ok_or_else(|| missing_body(type_name, method_name))
    }
}

fn missing_body(type_name: &str, method_name: &str) -> crate::Error {
    VersionDrift {
        context: format!("{type_name}::{method_name}"),
        drifts: vec![Drift::new("method body", "none")],
    }
}

/// Summary of one successfully applied procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Procedure name
    pub name: String,
    /// Patched method, as `Type::Method`
    pub method: String,
    /// Instructions replaced in place
    pub replaced: usize,
    /// Instructions inserted
    pub inserted: usize,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} replaced, {} inserted in {}",
            self.name, self.replaced, self.inserted, self.method
        )
    }
}

/// A single patch procedure.
///
/// Procedures validate the target before changing anything and must fail rather than apply
/// twice: running a procedure on a module it already patched returns a drift error
/// ([`crate::Error::is_drift`]).
///
/// # Examples
///
/// ```rust
/// use ilpatch::patch::{Patch, PatchContext, PatchOutcome};
/// use ilpatch::Result;
///
/// struct Nothing;
///
/// impl Patch for Nothing {
///     fn name(&self) -> &str {
///         "nothing"
///     }
///
///     fn apply(&self, _cx: &mut PatchContext<'_>) -> Result<PatchOutcome> {
///         Ok(PatchOutcome {
///             name: self.name().to_string(),
///             method: String::new(),
///             replaced: 0,
///             inserted: 0,
///         })
///     }
/// }
/// ```
pub trait Patch: Send + Sync {
    /// Unique name within a [`PatchSet`].
    fn name(&self) -> &str;

    /// One-line summary shown in logs and reports.
    fn description(&self) -> &str {
        "No description available"
    }

    /// Validates the target and applies the patch.
    ///
    /// # Errors
    /// Returns a drift error if the target is not the build the patch was written for or is
    /// already patched; the target may be partially modified only if the error is not a
    /// drift error.
    fn apply(&self, cx: &mut PatchContext<'_>) -> Result<PatchOutcome>;
}

/// Patch procedures applied in insertion order.
#[derive(Default)]
pub struct PatchSet {
    patches: Vec<Box<dyn Patch>>,
}

impl PatchSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        PatchSet::default()
    }

    /// Appends a procedure.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidDescriptor`] if a procedure with the same name is
    /// already in the set.
    pub fn push(&mut self, patch: Box<dyn Patch>) -> Result<()> {
        if self.patches.iter().any(|p| p.name() == patch.name()) {
            return Err(InvalidDescriptor {
                name: patch.name().to_string(),
                message: "duplicate patch name".to_string(),
            });
        }
        self.patches.push(patch);
        Ok(())
    }

    /// Number of procedures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Names in application order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.patches.iter().map(|patch| patch.name())
    }

    /// The procedures in application order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Patch> + '_ {
        self.patches.iter().map(|patch| &**patch)
    }

    /// Runs every procedure in order and stops at the first failure.
    ///
    /// # Errors
    /// Returns [`crate::Error::PatchFailed`] naming the failing procedure. Nothing is
    /// rolled back; callers discard the target module on error.
    pub fn apply(&self, cx: &mut PatchContext<'_>) -> Result<Vec<PatchOutcome>> {
        let mut outcomes = Vec::with_capacity(self.patches.len());

        for patch in &self.patches {
            info!("Applying patch `{}`: {}", patch.name(), patch.description());

            let outcome = patch.apply(cx).map_err(|source| PatchFailed {
                patch: patch.name().to_string(),
                source: Box::new(source),
            })?;

            info!("Applied {outcome}");
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

impl fmt::Debug for PatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Marker {
        name: &'static str,
        fail: bool,
    }

    impl Marker {
        fn new(name: &'static str, fail: bool) -> Box<Self> {
            Box::new(Marker { name, fail })
        }
    }

    impl Patch for Marker {
        fn name(&self) -> &str {
            self.name
        }

        fn apply(&self, cx: &mut PatchContext<'_>) -> Result<PatchOutcome> {
            if self.fail {
                return Err(Error::AlreadyApplied(self.name.to_string()));
            }
            cx.target.user_string(self.name);
            Ok(PatchOutcome {
                name: self.name.to_string(),
                method: "Type::Method".to_string(),
                replaced: 1,
                inserted: 0,
            })
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut set = PatchSet::new();
        set.push(Marker::new("a", false)).unwrap();
        assert!(matches!(
            set.push(Marker::new("a", false)),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn applies_in_order() {
        let mut set = PatchSet::new();
        set.push(Marker::new("first", false)).unwrap();
        set.push(Marker::new("second", false)).unwrap();

        let mut module = Module::new("Assembly-CSharp.dll");
        let references = References::default();
        let outcomes = set
            .apply(&mut PatchContext::new(&mut module, &references))
            .unwrap();

        assert_eq!(
            outcomes.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(module.user_strings(), &["first", "second"]);
        assert_eq!(outcomes[0].to_string(), "first: 1 replaced, 0 inserted in Type::Method");
    }

    #[test]
    fn stops_at_first_failure() {
        let mut set = PatchSet::new();
        set.push(Marker::new("first", true)).unwrap();
        set.push(Marker::new("second", false)).unwrap();

        let mut module = Module::new("Assembly-CSharp.dll");
        let references = References::default();
        let err = set
            .apply(&mut PatchContext::new(&mut module, &references))
            .unwrap_err();

        assert!(matches!(&err, Error::PatchFailed { patch, .. } if patch == "first"));
        assert!(err.is_drift());
        assert!(module.user_strings().is_empty());
    }

    #[test]
    fn missing_method_body() {
        let mut module = Module::new("Assembly-CSharp.dll");
        let references = References::default();
        let cx = PatchContext::new(&mut module, &references);

        assert!(matches!(
            cx.body("StartGame", "MoveNext"),
            Err(Error::TypeNotFound { .. })
        ));
    }
}
