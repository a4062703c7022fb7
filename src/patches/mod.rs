//! The built-in patches for *The Underground Man*.
//!
//! Both patches target `Assembly-CSharp.dll` of one specific game build. They check every
//! site before editing and fail with a drift error on any other build, including a build
//! they already patched.
//!
//! - [`transitions`] - Near-instant main menu fades
//! - [`dialogue`] - Right Shift skips the dialogue text animation

pub mod dialogue;
pub mod transitions;

use crate::{patch::PatchSet, Result};

/// Modules the built-in patches import from, looked up next to the target.
pub const REFERENCE_MODULES: &[&str] = &["mscorlib.dll", "UnityEngine.dll", "UnityEngine.UI.dll"];

/// The built-in patches, in the order they are applied.
///
/// # Errors
/// Returns [`crate::Error::InvalidDescriptor`] if a built-in descriptor fails validation.
///
/// # Examples
///
/// ```rust
/// let set = ilpatch::patches::default_patch_set()?;
/// assert_eq!(
///     set.names().collect::<Vec<_>>(),
///     ["slow-menu-transitions", "dialogue-controls"]
/// );
/// # Ok::<(), ilpatch::Error>(())
/// ```
pub fn default_patch_set() -> Result<PatchSet> {
    let transitions = transitions::descriptor();
    transitions.validate()?;

    let mut set = PatchSet::new();
    set.push(Box::new(transitions))?;
    set.push(Box::new(dialogue::DialogueControls))?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::Module,
        patch::PatchContext,
        test::factories::game::{game_module, references},
        Error,
    };

    #[test]
    fn full_set_applies_then_refuses() {
        let mut module = game_module().unwrap();
        let references = references().unwrap();
        let set = default_patch_set().unwrap();

        let outcomes = set
            .apply(&mut PatchContext::new(&mut module, &references))
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].replaced, 9);
        assert_eq!(outcomes[1].inserted, 18);

        let mut reloaded = Module::from_mem(module.to_bytes().unwrap()).unwrap();
        let err = set
            .apply(&mut PatchContext::new(&mut reloaded, &references))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PatchFailed { ref patch, .. } if patch == transitions::NAME
        ));
        assert!(err.is_drift());
    }
}
