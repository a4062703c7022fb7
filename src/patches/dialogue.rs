//! Lets the player skip the letter-by-letter dialogue animation by holding Right Shift.
//!
//! The dialogue coroutine appends one character of `<t>__0` per frame. The patch adds a
//! key check to the loop and, when the key is held, a block that appends the remaining
//! text in one go and jumps to the code that waits after a line completes:
//!
//! ```text
//! // after anchor #68
//! if (Input.GetKey(KeyCode.RightShift)) goto skip;
//!
//! // after anchor #141
//! skip:
//! this.$current = null;
//! this.uiText.text = this.uiText.text + this.<t>__0;
//! this.<t>__0 = "";
//! goto resume;   // #101
//! ```

use log::debug;

use crate::{
    assembly::{Immediate, OpCode, Operand},
    metadata::{method::MethodBody, token::Token, Module, References},
    patch::{assert_opcode, splice_after, Patch, PatchContext, PatchOutcome, Sequence},
    Drift,
    Error::{AlreadyApplied, VersionDrift},
    Result,
};

/// Patch name.
pub const NAME: &str = "dialogue-controls";

/// Declaring type of the patched coroutine.
pub const TYPE_NAME: &str = "Dialogue/<SlowText>c__IteratorD";

/// Patched method.
pub const METHOD_NAME: &str = "MoveNext";

/// `UnityEngine.KeyCode.RightShift`
pub const RIGHT_SHIFT: i32 = 303;

/// `ldarg.0` that starts the wait after a completed line; the skip block jumps here.
pub const RESUME_INDEX: usize = 101;

/// `br` out of the loop; only checked.
pub const RETURN_BRANCH_INDEX: usize = 138;

/// The skip block is inserted after this instruction.
pub const SKIP_ANCHOR_INDEX: usize = 141;

/// The key check is inserted after this instruction.
pub const KEY_CHECK_ANCHOR_INDEX: usize = 68;

const INPUT: &str = "UnityEngine.Input";
const TEXT: &str = "UnityEngine.UI.Text";
const STRING: &str = "System.String";

/// The dialogue skip patch.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogueControls;

/// Tokens the inserted code refers to.
struct Symbols {
    get_key: Token,
    get_text: Token,
    set_text: Token,
    concat: Token,
    current: Token,
    ui_text: Token,
    text: Token,
    empty: Token,
}

impl Symbols {
    fn import(target: &mut Module, references: &References) -> Result<Self> {
        let (unity, _) = references.find_type(INPUT)?;
        let get_key = target.import_method(unity, INPUT, "GetKey", Some(&["KeyCode"]))?;

        let (unity_ui, _) = references.find_type(TEXT)?;
        let get_text = target.import_method(unity_ui, TEXT, "get_text", Some(&[]))?;
        let set_text = target.import_method(unity_ui, TEXT, "set_text", Some(&["String"]))?;

        let (mscorlib, _) = references.find_type(STRING)?;
        let concat =
            target.import_method(mscorlib, STRING, "Concat", Some(&["String", "String"]))?;

        let field = |name: &str| target.find_field(TYPE_NAME, name).map(|f| f.token);
        let current = field("$current")?;
        let ui_text = field("uiText")?;
        let text = field("<t>__0")?;

        Ok(Symbols {
            get_key,
            get_text,
            set_text,
            concat,
            current,
            ui_text,
            text,
            empty: target.user_string(""),
        })
    }
}

/// Returns true if `body` already calls `UnityEngine.Input::GetKey`.
fn calls_get_key(target: &Module, body: &MethodBody) -> bool {
    body.iter().any(|(_, instruction)| {
        let Operand::Token(token) = instruction.operand else {
            return false;
        };
        if !instruction.calls(token) || token.table() != Token::MEMBER_REF {
            return false;
        }
        target
            .member_ref(token)
            .filter(|member| member.name == "GetKey")
            .and_then(|member| target.type_ref(member.parent))
            .is_some_and(|parent| parent.name == INPUT)
    })
}

/// Checks the anchors of the unmodified method.
fn check_anchors(body: &MethodBody) -> Result<()> {
    let checks = [
        (RESUME_INDEX, Some(OpCode::LDARG_0)),
        (RETURN_BRANCH_INDEX, Some(OpCode::BR)),
        (SKIP_ANCHOR_INDEX, None),
        (KEY_CHECK_ANCHOR_INDEX, None),
    ];

    let mut drifts = Vec::new();
    for (index, expected) in checks {
        let Some(instruction) = body.at(index).ok().and_then(|id| body.get(id)) else {
            let expected = expected.map_or("an instruction", |opcode| opcode.mnemonic());
            drifts.push(Drift::new(expected, "end of method").at_index(index));
            continue;
        };
        if let Some(opcode) = expected {
            if let Err(drift) = assert_opcode(instruction, opcode) {
                drifts.push(drift.at_index(index));
            }
        }
    }

    if drifts.is_empty() {
        Ok(())
    } else {
        Err(VersionDrift {
            context: format!("{TYPE_NAME}::{METHOD_NAME}"),
            drifts,
        })
    }
}

impl Patch for DialogueControls {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "hold Right Shift to show dialogue lines instantly"
    }

    fn apply(&self, cx: &mut PatchContext<'_>) -> Result<PatchOutcome> {
        let body = cx.body(TYPE_NAME, METHOD_NAME)?;
        if calls_get_key(cx.target, body) {
            return Err(AlreadyApplied(NAME.to_string()));
        }
        check_anchors(body)?;

        let resume = body.at(RESUME_INDEX)?;
        let skip_anchor = body.at(SKIP_ANCHOR_INDEX)?;
        let key_anchor = body.at(KEY_CHECK_ANCHOR_INDEX)?;

        let symbols = Symbols::import(cx.target, cx.references)?;

        let mut skip = Sequence::new();
        skip.emit(OpCode::LDARG_0, Operand::None)
            .emit(OpCode::LDNULL, Operand::None)
            .emit(OpCode::STFLD, Operand::Token(symbols.current))
            .emit(OpCode::LDARG_0, Operand::None)
            .emit(OpCode::LDFLD, Operand::Token(symbols.ui_text))
            .emit(OpCode::DUP, Operand::None)
            .emit(OpCode::CALLVIRT, Operand::Token(symbols.get_text))
            .emit(OpCode::LDARG_0, Operand::None)
            .emit(OpCode::LDFLD, Operand::Token(symbols.text))
            .emit(OpCode::CALL, Operand::Token(symbols.concat))
            .emit(OpCode::CALLVIRT, Operand::Token(symbols.set_text))
            .emit(OpCode::LDARG_0, Operand::None)
            .emit(OpCode::LDSTR, Operand::Token(symbols.empty))
            .emit(OpCode::STFLD, Operand::Token(symbols.text))
            .branch(OpCode::BR, resume);

        let body = cx.body_mut(TYPE_NAME, METHOD_NAME)?;
        let skip = splice_after(body, skip_anchor, skip)?;
        debug!("Inserted skip block at {}", skip.first());

        let mut key_check = Sequence::new();
        key_check
            .emit(OpCode::LDC_I4, Operand::Immediate(Immediate::Int32(RIGHT_SHIFT)))
            .emit(OpCode::CALL, Operand::Token(symbols.get_key))
            .branch(OpCode::BRTRUE, skip.first());
        let key_check = splice_after(body, key_anchor, key_check)?;

        Ok(PatchOutcome {
            name: NAME.to_string(),
            method: format!("{TYPE_NAME}::{METHOD_NAME}"),
            replaced: 0,
            inserted: skip.ids().len() + key_check.ids().len(),
        })
    }
}
