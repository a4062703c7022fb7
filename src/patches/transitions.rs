//! Makes the main menu's fade transitions effectively instant.
//!
//! The start-game coroutine waits on nine hard-coded `float` durations. Each one is replaced
//! with a tiny positive value; zero would stall some of the fades, which divide by it.

use crate::{
    assembly::{Immediate, OpCode, Operand},
    patch::{InstructionPattern, OperandPattern, PatchDescriptor, Site},
};

/// Patch name.
pub const NAME: &str = "slow-menu-transitions";

/// Declaring type of the patched coroutine.
pub const TYPE_NAME: &str = "StartGame/<Start>c__Iterator10";

/// Patched method.
pub const METHOD_NAME: &str = "MoveNext";

/// Original offsets of the `ldc.r4` duration literals.
pub const OFFSETS: [u32; 9] = [
    0x0062, 0x0129, 0x01b9, 0x0209, 0x023a, 0x026c, 0x02be, 0x02ef, 0x0321,
];

/// The duration every site is set to.
pub const DURATION: f32 = 0.0001;

/// The descriptor for the menu transition patch.
#[must_use]
pub fn descriptor() -> PatchDescriptor {
    let duration = Operand::Immediate(Immediate::Float32(DURATION));
    let expect = InstructionPattern::new(
        OpCode::LDC_R4,
        OperandPattern::NotEquals(duration.clone()),
    );

    OFFSETS.iter().fold(
        PatchDescriptor::new(NAME, TYPE_NAME, METHOD_NAME)
            .with_description("shorten main menu fade transitions"),
        |descriptor, &offset| {
            descriptor.site(Site::replace_at(offset, expect.clone(), duration.clone()))
        },
    )
}
