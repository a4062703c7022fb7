//! A miniature version of the game module the built-in patches target, plus the reference
//! modules they import from.
//!
//! Method bodies are built with [`Sequence`] and then encoded and decoded once, so the
//! returned modules carry original offsets exactly like a module loaded from disk.

use crate::{
    assembly::{Immediate, OpCode, Operand},
    metadata::{
        method::{MethodAttributes, MethodBody, MethodSignature, VOID},
        token::Token,
        types::{FieldAttributes, TypeAttributes},
        Module, References,
    },
    patch::Sequence,
    patches::{dialogue, transitions},
    Result,
};

const BOOLEAN: &str = "System.Boolean";
const STRING: &str = "System.String";

/// Module name of the game module.
pub const GAME_MODULE: &str = "Assembly-CSharp.dll";

/// Pads `sequence` with `nop`s until the next instruction has list position `index`.
pub fn pad_to(sequence: &mut Sequence, index: usize) {
    while sequence.len() < index {
        sequence.emit(OpCode::NOP, Operand::None);
    }
}

/// The start-game coroutine: an `ldc.r4 1.5; pop` pair at each duration offset.
///
/// With `nop_at`, the pair at that offset is replaced by six `nop`s, keeping every other
/// offset in place.
///
/// # Errors
/// Fails only if the sequence is malformed.
pub fn timing_body(nop_at: Option<u32>) -> Result<MethodBody> {
    let mut sequence = Sequence::new();
    let mut offset = 0u32;

    for &site in &transitions::OFFSETS {
        while offset < site {
            sequence.emit(OpCode::NOP, Operand::None);
            offset += 1;
        }
        if nop_at == Some(site) {
            for _ in 0..6 {
                sequence.emit(OpCode::NOP, Operand::None);
            }
        } else {
            sequence
                .emit(OpCode::LDC_R4, Operand::Immediate(Immediate::Float32(1.5)))
                .emit(OpCode::POP, Operand::None);
        }
        offset += 6;
    }

    sequence
        .emit(OpCode::LDC_I4_1, Operand::None)
        .emit(OpCode::RET, Operand::None);
    sequence.into_body()
}

/// Field tokens of the dialogue coroutine.
pub struct DialogueFields {
    /// Iterator state
    pub pc: Token,
    /// Value yielded last
    pub current: Token,
    /// The `UnityEngine.UI.Text` being filled
    pub ui_text: Token,
    /// The full line of dialogue
    pub text: Token,
}

/// The dialogue coroutine, laid out so the patch anchors hold the expected instructions:
/// the resume point is `ldarg.0`, the return branch is `br`, the two splice anchors are
/// plain instructions.
///
/// # Errors
/// Fails only if the sequence is malformed.
pub fn dialogue_body(fields: &DialogueFields) -> Result<MethodBody> {
    let mut sequence = Sequence::new();
    let start = sequence.label();
    let resume = sequence.label();
    let end = sequence.label();

    sequence
        .emit(OpCode::LDARG_0, Operand::None)
        .emit(OpCode::LDFLD, Operand::Token(fields.pc))
        .switch(vec![start.into(), resume.into()])
        .bind(start);
    pad_to(&mut sequence, dialogue::KEY_CHECK_ANCHOR_INDEX - 2);
    sequence
        .emit(OpCode::LDARG_0, Operand::None)
        .emit(OpCode::LDFLD, Operand::Token(fields.ui_text))
        .emit(OpCode::POP, Operand::None);

    pad_to(&mut sequence, dialogue::RESUME_INDEX);
    sequence
        .bind(resume)
        .emit(OpCode::LDARG_0, Operand::None)
        .emit(OpCode::LDNULL, Operand::None)
        .emit(OpCode::STFLD, Operand::Token(fields.current))
        .emit(OpCode::LDC_I4_1, Operand::None)
        .emit(OpCode::RET, Operand::None);

    pad_to(&mut sequence, dialogue::RETURN_BRANCH_INDEX);
    sequence.branch(OpCode::BR, end);
    pad_to(&mut sequence, dialogue::SKIP_ANCHOR_INDEX + 1);
    sequence
        .bind(end)
        .emit(OpCode::LDC_I4_0, Operand::None)
        .emit(OpCode::RET, Operand::None);

    sequence.into_body()
}

/// The game module with both coroutines. See [`timing_body`] for `nop_at`.
///
/// # Errors
/// Fails only if the module cannot be built or re-read.
pub fn game_module_with(nop_at: Option<u32>) -> Result<Module> {
    let mut module = Module::new(GAME_MODULE);
    let move_next = MethodSignature::instance(&[], BOOLEAN);
    let flags = MethodAttributes::PRIVATE | MethodAttributes::VIRTUAL | MethodAttributes::FINAL;

    module.add_type("StartGame", TypeAttributes::PUBLIC);
    let iterator = module.add_type(transitions::TYPE_NAME, TypeAttributes::NESTED_PRIVATE);
    module.add_method(
        iterator,
        flags,
        transitions::METHOD_NAME,
        move_next.clone(),
        Some(timing_body(nop_at)?),
    )?;

    module.add_type("Dialogue", TypeAttributes::PUBLIC);
    let iterator = module.add_type(dialogue::TYPE_NAME, TypeAttributes::NESTED_PRIVATE);
    let mut field =
        |name: &str, ty: &str| module.add_field(iterator, FieldAttributes::ASSEMBLY, name, ty);
    let fields = DialogueFields {
        pc: field("$PC", "System.Int32")?,
        current: field("$current", "System.Object")?,
        ui_text: field("uiText", "UnityEngine.UI.Text")?,
        text: field("<t>__0", STRING)?,
    };
    module.add_method(
        iterator,
        flags,
        dialogue::METHOD_NAME,
        move_next,
        Some(dialogue_body(&fields)?),
    )?;

    Module::from_mem(module.to_bytes()?)
}

/// The unmodified game module.
///
/// # Errors
/// See [`game_module_with`].
pub fn game_module() -> Result<Module> {
    game_module_with(None)
}

/// `mscorlib.dll` with the `String.Concat` overloads.
///
/// # Errors
/// Fails only if a method cannot be added.
pub fn mscorlib() -> Result<Module> {
    let mut module = Module::new("mscorlib.dll");
    let flags = MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG;

    module.add_type("System.Object", TypeAttributes::PUBLIC);
    let string = module.add_type(STRING, TypeAttributes::PUBLIC | TypeAttributes::SEALED);
    for params in [
        &["System.Object", "System.Object"][..],
        &[STRING, STRING][..],
        &[STRING, STRING, STRING][..],
    ] {
        module.add_method(
            string,
            flags,
            "Concat",
            MethodSignature::new_static(params, STRING),
            None,
        )?;
    }
    Ok(module)
}

/// `UnityEngine.dll` with both `Input.GetKey` overloads.
///
/// # Errors
/// Fails only if a method cannot be added.
pub fn unity_engine() -> Result<Module> {
    let mut module = Module::new("UnityEngine.dll");
    let flags = MethodAttributes::PUBLIC | MethodAttributes::STATIC;

    module.add_type("UnityEngine.KeyCode", TypeAttributes::PUBLIC | TypeAttributes::SEALED);
    let input = module.add_type("UnityEngine.Input", TypeAttributes::PUBLIC);
    for param in [STRING, "UnityEngine.KeyCode"] {
        module.add_method(
            input,
            flags,
            "GetKey",
            MethodSignature::new_static(&[param], BOOLEAN),
            None,
        )?;
    }
    Ok(module)
}

/// `UnityEngine.UI.dll` with the `Text.text` accessors.
///
/// # Errors
/// Fails only if a method cannot be added.
pub fn unity_engine_ui() -> Result<Module> {
    let mut module = Module::new("UnityEngine.UI.dll");
    let flags = MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::SPECIAL_NAME;

    let text = module.add_type("UnityEngine.UI.Text", TypeAttributes::PUBLIC);
    module.add_method(
        text,
        flags,
        "get_text",
        MethodSignature::instance(&[], STRING),
        None,
    )?;
    module.add_method(
        text,
        flags,
        "set_text",
        MethodSignature::instance(&[STRING], VOID),
        None,
    )?;
    Ok(module)
}

/// The three reference modules, in [`crate::patches::REFERENCE_MODULES`] order.
///
/// # Errors
/// See [`mscorlib`].
pub fn reference_modules() -> Result<Vec<Module>> {
    Ok(vec![mscorlib()?, unity_engine()?, unity_engine_ui()?])
}

/// All three reference modules.
///
/// # Errors
/// See [`mscorlib`].
pub fn references() -> Result<References> {
    Ok(References::new(reference_modules()?))
}
