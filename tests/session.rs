//! End-to-end tests of a patch run against files on disk.

mod common;

use common::{game_module, GameDir, GAME_MODULE};
use ilpatch::{
    assembly::{Immediate, OpCode, Operand},
    metadata::{Module, References},
    patch::PatchSession,
    patches::{default_patch_set, dialogue, transitions, REFERENCE_MODULES},
    Error, File,
};

#[test]
fn patches_target_in_place() {
    let game = GameDir::new();
    let before = File::from_file(&game.target).unwrap().sha1_hex();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    session.apply(&default_patch_set().unwrap()).unwrap();
    let report = session.commit().unwrap();

    assert!(report.written);
    assert_eq!(report.module, GAME_MODULE);
    assert_eq!(report.sha1_before, before);
    assert_ne!(report.sha1_after, before);
    assert_eq!(File::from_file(&game.target).unwrap().sha1_hex(), report.sha1_after);
    assert_eq!(
        report
            .outcomes
            .iter()
            .map(|outcome| (outcome.replaced, outcome.inserted))
            .collect::<Vec<_>>(),
        vec![(9, 0), (0, 18)]
    );

    let patched = Module::from_file(&game.target).unwrap();
    let timing = patched
        .find_method(transitions::TYPE_NAME, transitions::METHOD_NAME, None)
        .unwrap()
        .body()
        .unwrap();
    let duration = Operand::Immediate(Immediate::Float32(transitions::DURATION));
    assert_eq!(
        timing
            .iter()
            .filter(|(_, instruction)| instruction.operand.same_as(&duration))
            .count(),
        9
    );
}

#[test]
fn imports_resolve_after_reload() {
    let game = GameDir::new();
    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    session.apply(&default_patch_set().unwrap()).unwrap();
    session.commit().unwrap();

    let patched = Module::from_file(&game.target).unwrap();
    let references = References::open(game.path(), REFERENCE_MODULES).unwrap();
    let body = patched
        .find_method(dialogue::TYPE_NAME, dialogue::METHOD_NAME, None)
        .unwrap()
        .body()
        .unwrap();

    let mut resolved = Vec::new();
    for (_, instruction) in body.iter() {
        if !matches!(instruction.opcode, OpCode::CALL | OpCode::CALLVIRT) {
            continue;
        }
        let Operand::Token(token) = instruction.operand else {
            panic!("call without a token operand");
        };
        let symbol = patched.symbol(token).unwrap();
        let method = references.resolve_method(&symbol).unwrap();
        resolved.push(format!("{}({})", method.name, method.signature.params.join(", ")));
    }

    assert_eq!(
        resolved,
        vec![
            "GetKey(UnityEngine.KeyCode)",
            "get_text()",
            "Concat(System.String, System.String)",
            "set_text(System.String)",
        ]
    );
}

#[test]
fn drift_leaves_target_byte_identical() {
    let game = GameDir::with(game_module(Some(transitions::OFFSETS[1])));
    let before = game.target_bytes();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    let err = session.apply(&default_patch_set().unwrap()).unwrap_err();
    drop(session);

    assert!(err.is_drift());
    match err {
        Error::PatchFailed { patch, source } => {
            assert_eq!(patch, transitions::NAME);
            assert!(matches!(
                *source,
                Error::IncompletePatch { matched: 8, expected: 9, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(game.target_bytes(), before);
}

#[test]
fn second_run_is_refused() {
    let game = GameDir::new();
    let set = default_patch_set().unwrap();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    session.apply(&set).unwrap();
    session.commit().unwrap();
    let patched = game.target_bytes();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    let err = session.apply(&set).unwrap_err();
    assert!(err.is_drift());
    assert!(err.to_string().contains(transitions::NAME));
    drop(session);

    assert_eq!(game.target_bytes(), patched);
}

#[test]
fn dry_run_writes_nothing() {
    let game = GameDir::new();
    let before = game.target_bytes();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    session.apply(&default_patch_set().unwrap()).unwrap();
    let report = session.dry_run().unwrap();

    assert!(!report.written);
    assert_ne!(report.sha1_before, report.sha1_after);
    assert_eq!(game.target_bytes(), before);
}

#[test]
fn no_temporary_files_remain() {
    let game = GameDir::new();
    let entries = game.entries();

    let mut session = PatchSession::open(&game.target, REFERENCE_MODULES).unwrap();
    let working_copy = session.working_copy().to_path_buf();
    assert!(working_copy.exists());
    session.apply(&default_patch_set().unwrap()).unwrap();
    session.commit().unwrap();

    assert!(!working_copy.exists());
    assert_eq!(game.entries(), entries);
}

#[test]
fn missing_reference_module() {
    let game = GameDir::new();
    std::fs::remove_file(game.path().join("UnityEngine.UI.dll")).unwrap();

    let err = PatchSession::open(&game.target, REFERENCE_MODULES)
        .err()
        .unwrap();
    assert!(matches!(err, Error::FileNotFound(ref path) if path.ends_with("UnityEngine.UI.dll")));
}
