//! The CIL opcode table (ECMA-335 Partition III).
//!
//! Every opcode is an [`OpCode`] constant named after its mnemonic (`OpCode::LDC_R4` is
//! `ldc.r4`). Two-byte opcodes carry their `0xFE` prefix in the high byte of the value, so
//! `OpCode::CEQ` has the value `0xFE01`.
//!
//! Each opcode knows its operand encoding, its effect on control flow and how many stack
//! slots it pops and pushes. Calls and `ret` are [`StackCount::Variable`]: their effect
//! depends on a signature and is resolved by the encoder.

use std::fmt;

use crate::assembly::{FlowType, OperandType, StackCount};

/// Prefix byte of all two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

/// A CIL opcode.
///
/// Values can only be obtained from the constants of this type or through
/// [`OpCode::from_value`], so every `OpCode` names a defined instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpCode(u16);

struct OpCodeInfo {
    mnemonic: &'static str,
    operand: OperandType,
    flow: FlowType,
    pops: StackCount,
    pushes: StackCount,
}

macro_rules! stack {
    (var) => {
        StackCount::Variable
    };
    ($count:literal) => {
        StackCount::Fixed($count)
    };
}

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal, $operand:ident, $flow:ident, $pops:tt, $pushes:tt;)*) => {
        impl OpCode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                pub const $name: OpCode = OpCode($value);
            )*

            /// Every defined opcode, in encoding order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name),*];
        }

        fn lookup(value: u16) -> Option<&'static OpCodeInfo> {
            match value {
                $(
                    $value => Some(&OpCodeInfo {
                        mnemonic: $mnemonic,
                        operand: OperandType::$operand,
                        flow: FlowType::$flow,
                        pops: stack!($pops),
                        pushes: stack!($pushes),
                    }),
                )*
                _ => None,
            }
        }
    };
}

opcodes! {
    NOP = 0x00, "nop", None, Sequential, 0, 0;
    BREAK = 0x01, "break", None, Sequential, 0, 0;
    LDARG_0 = 0x02, "ldarg.0", None, Sequential, 0, 1;
    LDARG_1 = 0x03, "ldarg.1", None, Sequential, 0, 1;
    LDARG_2 = 0x04, "ldarg.2", None, Sequential, 0, 1;
    LDARG_3 = 0x05, "ldarg.3", None, Sequential, 0, 1;
    LDLOC_0 = 0x06, "ldloc.0", None, Sequential, 0, 1;
    LDLOC_1 = 0x07, "ldloc.1", None, Sequential, 0, 1;
    LDLOC_2 = 0x08, "ldloc.2", None, Sequential, 0, 1;
    LDLOC_3 = 0x09, "ldloc.3", None, Sequential, 0, 1;
    STLOC_0 = 0x0A, "stloc.0", None, Sequential, 1, 0;
    STLOC_1 = 0x0B, "stloc.1", None, Sequential, 1, 0;
    STLOC_2 = 0x0C, "stloc.2", None, Sequential, 1, 0;
    STLOC_3 = 0x0D, "stloc.3", None, Sequential, 1, 0;
    LDARG_S = 0x0E, "ldarg.s", UInt8, Sequential, 0, 1;
    LDARGA_S = 0x0F, "ldarga.s", UInt8, Sequential, 0, 1;
    STARG_S = 0x10, "starg.s", UInt8, Sequential, 1, 0;
    LDLOC_S = 0x11, "ldloc.s", UInt8, Sequential, 0, 1;
    LDLOCA_S = 0x12, "ldloca.s", UInt8, Sequential, 0, 1;
    STLOC_S = 0x13, "stloc.s", UInt8, Sequential, 1, 0;
    LDNULL = 0x14, "ldnull", None, Sequential, 0, 1;
    LDC_I4_M1 = 0x15, "ldc.i4.m1", None, Sequential, 0, 1;
    LDC_I4_0 = 0x16, "ldc.i4.0", None, Sequential, 0, 1;
    LDC_I4_1 = 0x17, "ldc.i4.1", None, Sequential, 0, 1;
    LDC_I4_2 = 0x18, "ldc.i4.2", None, Sequential, 0, 1;
    LDC_I4_3 = 0x19, "ldc.i4.3", None, Sequential, 0, 1;
    LDC_I4_4 = 0x1A, "ldc.i4.4", None, Sequential, 0, 1;
    LDC_I4_5 = 0x1B, "ldc.i4.5", None, Sequential, 0, 1;
    LDC_I4_6 = 0x1C, "ldc.i4.6", None, Sequential, 0, 1;
    LDC_I4_7 = 0x1D, "ldc.i4.7", None, Sequential, 0, 1;
    LDC_I4_8 = 0x1E, "ldc.i4.8", None, Sequential, 0, 1;
    LDC_I4_S = 0x1F, "ldc.i4.s", Int8, Sequential, 0, 1;
    LDC_I4 = 0x20, "ldc.i4", Int32, Sequential, 0, 1;
    LDC_I8 = 0x21, "ldc.i8", Int64, Sequential, 0, 1;
    LDC_R4 = 0x22, "ldc.r4", Float32, Sequential, 0, 1;
    LDC_R8 = 0x23, "ldc.r8", Float64, Sequential, 0, 1;
    DUP = 0x25, "dup", None, Sequential, 1, 2;
    POP = 0x26, "pop", None, Sequential, 1, 0;
    JMP = 0x27, "jmp", Token, Return, 0, 0;
    CALL = 0x28, "call", Token, Call, var, var;
    CALLI = 0x29, "calli", Token, Call, var, var;
    RET = 0x2A, "ret", None, Return, var, 0;
    BR_S = 0x2B, "br.s", ShortTarget, UnconditionalBranch, 0, 0;
    BRFALSE_S = 0x2C, "brfalse.s", ShortTarget, ConditionalBranch, 1, 0;
    BRTRUE_S = 0x2D, "brtrue.s", ShortTarget, ConditionalBranch, 1, 0;
    BEQ_S = 0x2E, "beq.s", ShortTarget, ConditionalBranch, 2, 0;
    BGE_S = 0x2F, "bge.s", ShortTarget, ConditionalBranch, 2, 0;
    BGT_S = 0x30, "bgt.s", ShortTarget, ConditionalBranch, 2, 0;
    BLE_S = 0x31, "ble.s", ShortTarget, ConditionalBranch, 2, 0;
    BLT_S = 0x32, "blt.s", ShortTarget, ConditionalBranch, 2, 0;
    BNE_UN_S = 0x33, "bne.un.s", ShortTarget, ConditionalBranch, 2, 0;
    BGE_UN_S = 0x34, "bge.un.s", ShortTarget, ConditionalBranch, 2, 0;
    BGT_UN_S = 0x35, "bgt.un.s", ShortTarget, ConditionalBranch, 2, 0;
    BLE_UN_S = 0x36, "ble.un.s", ShortTarget, ConditionalBranch, 2, 0;
    BLT_UN_S = 0x37, "blt.un.s", ShortTarget, ConditionalBranch, 2, 0;
    BR = 0x38, "br", Target, UnconditionalBranch, 0, 0;
    BRFALSE = 0x39, "brfalse", Target, ConditionalBranch, 1, 0;
    BRTRUE = 0x3A, "brtrue", Target, ConditionalBranch, 1, 0;
    BEQ = 0x3B, "beq", Target, ConditionalBranch, 2, 0;
    BGE = 0x3C, "bge", Target, ConditionalBranch, 2, 0;
    BGT = 0x3D, "bgt", Target, ConditionalBranch, 2, 0;
    BLE = 0x3E, "ble", Target, ConditionalBranch, 2, 0;
    BLT = 0x3F, "blt", Target, ConditionalBranch, 2, 0;
    BNE_UN = 0x40, "bne.un", Target, ConditionalBranch, 2, 0;
    BGE_UN = 0x41, "bge.un", Target, ConditionalBranch, 2, 0;
    BGT_UN = 0x42, "bgt.un", Target, ConditionalBranch, 2, 0;
    BLE_UN = 0x43, "ble.un", Target, ConditionalBranch, 2, 0;
    BLT_UN = 0x44, "blt.un", Target, ConditionalBranch, 2, 0;
    SWITCH = 0x45, "switch", Switch, Switch, 1, 0;
    LDIND_I1 = 0x46, "ldind.i1", None, Sequential, 1, 1;
    LDIND_U1 = 0x47, "ldind.u1", None, Sequential, 1, 1;
    LDIND_I2 = 0x48, "ldind.i2", None, Sequential, 1, 1;
    LDIND_U2 = 0x49, "ldind.u2", None, Sequential, 1, 1;
    LDIND_I4 = 0x4A, "ldind.i4", None, Sequential, 1, 1;
    LDIND_U4 = 0x4B, "ldind.u4", None, Sequential, 1, 1;
    LDIND_I8 = 0x4C, "ldind.i8", None, Sequential, 1, 1;
    LDIND_I = 0x4D, "ldind.i", None, Sequential, 1, 1;
    LDIND_R4 = 0x4E, "ldind.r4", None, Sequential, 1, 1;
    LDIND_R8 = 0x4F, "ldind.r8", None, Sequential, 1, 1;
    LDIND_REF = 0x50, "ldind.ref", None, Sequential, 1, 1;
    STIND_REF = 0x51, "stind.ref", None, Sequential, 2, 0;
    STIND_I1 = 0x52, "stind.i1", None, Sequential, 2, 0;
    STIND_I2 = 0x53, "stind.i2", None, Sequential, 2, 0;
    STIND_I4 = 0x54, "stind.i4", None, Sequential, 2, 0;
    STIND_I8 = 0x55, "stind.i8", None, Sequential, 2, 0;
    STIND_R4 = 0x56, "stind.r4", None, Sequential, 2, 0;
    STIND_R8 = 0x57, "stind.r8", None, Sequential, 2, 0;
    ADD = 0x58, "add", None, Sequential, 2, 1;
    SUB = 0x59, "sub", None, Sequential, 2, 1;
    MUL = 0x5A, "mul", None, Sequential, 2, 1;
    DIV = 0x5B, "div", None, Sequential, 2, 1;
    DIV_UN = 0x5C, "div.un", None, Sequential, 2, 1;
    REM = 0x5D, "rem", None, Sequential, 2, 1;
    REM_UN = 0x5E, "rem.un", None, Sequential, 2, 1;
    AND = 0x5F, "and", None, Sequential, 2, 1;
    OR = 0x60, "or", None, Sequential, 2, 1;
    XOR = 0x61, "xor", None, Sequential, 2, 1;
    SHL = 0x62, "shl", None, Sequential, 2, 1;
    SHR = 0x63, "shr", None, Sequential, 2, 1;
    SHR_UN = 0x64, "shr.un", None, Sequential, 2, 1;
    NEG = 0x65, "neg", None, Sequential, 1, 1;
    NOT = 0x66, "not", None, Sequential, 1, 1;
    CONV_I1 = 0x67, "conv.i1", None, Sequential, 1, 1;
    CONV_I2 = 0x68, "conv.i2", None, Sequential, 1, 1;
    CONV_I4 = 0x69, "conv.i4", None, Sequential, 1, 1;
    CONV_I8 = 0x6A, "conv.i8", None, Sequential, 1, 1;
    CONV_R4 = 0x6B, "conv.r4", None, Sequential, 1, 1;
    CONV_R8 = 0x6C, "conv.r8", None, Sequential, 1, 1;
    CONV_U4 = 0x6D, "conv.u4", None, Sequential, 1, 1;
    CONV_U8 = 0x6E, "conv.u8", None, Sequential, 1, 1;
    CALLVIRT = 0x6F, "callvirt", Token, Call, var, var;
    CPOBJ = 0x70, "cpobj", Token, Sequential, 2, 0;
    LDOBJ = 0x71, "ldobj", Token, Sequential, 1, 1;
    LDSTR = 0x72, "ldstr", Token, Sequential, 0, 1;
    NEWOBJ = 0x73, "newobj", Token, Call, var, 1;
    CASTCLASS = 0x74, "castclass", Token, Sequential, 1, 1;
    ISINST = 0x75, "isinst", Token, Sequential, 1, 1;
    CONV_R_UN = 0x76, "conv.r.un", None, Sequential, 1, 1;
    UNBOX = 0x79, "unbox", Token, Sequential, 1, 1;
    THROW = 0x7A, "throw", None, Throw, 1, 0;
    LDFLD = 0x7B, "ldfld", Token, Sequential, 1, 1;
    LDFLDA = 0x7C, "ldflda", Token, Sequential, 1, 1;
    STFLD = 0x7D, "stfld", Token, Sequential, 2, 0;
    LDSFLD = 0x7E, "ldsfld", Token, Sequential, 0, 1;
    LDSFLDA = 0x7F, "ldsflda", Token, Sequential, 0, 1;
    STSFLD = 0x80, "stsfld", Token, Sequential, 1, 0;
    STOBJ = 0x81, "stobj", Token, Sequential, 2, 0;
    CONV_OVF_I1_UN = 0x82, "conv.ovf.i1.un", None, Sequential, 1, 1;
    CONV_OVF_I2_UN = 0x83, "conv.ovf.i2.un", None, Sequential, 1, 1;
    CONV_OVF_I4_UN = 0x84, "conv.ovf.i4.un", None, Sequential, 1, 1;
    CONV_OVF_I8_UN = 0x85, "conv.ovf.i8.un", None, Sequential, 1, 1;
    CONV_OVF_U1_UN = 0x86, "conv.ovf.u1.un", None, Sequential, 1, 1;
    CONV_OVF_U2_UN = 0x87, "conv.ovf.u2.un", None, Sequential, 1, 1;
    CONV_OVF_U4_UN = 0x88, "conv.ovf.u4.un", None, Sequential, 1, 1;
    CONV_OVF_U8_UN = 0x89, "conv.ovf.u8.un", None, Sequential, 1, 1;
    CONV_OVF_I_UN = 0x8A, "conv.ovf.i.un", None, Sequential, 1, 1;
    CONV_OVF_U_UN = 0x8B, "conv.ovf.u.un", None, Sequential, 1, 1;
    BOX = 0x8C, "box", Token, Sequential, 1, 1;
    NEWARR = 0x8D, "newarr", Token, Sequential, 1, 1;
    LDLEN = 0x8E, "ldlen", None, Sequential, 1, 1;
    LDELEMA = 0x8F, "ldelema", Token, Sequential, 2, 1;
    LDELEM_I1 = 0x90, "ldelem.i1", None, Sequential, 2, 1;
    LDELEM_U1 = 0x91, "ldelem.u1", None, Sequential, 2, 1;
    LDELEM_I2 = 0x92, "ldelem.i2", None, Sequential, 2, 1;
    LDELEM_U2 = 0x93, "ldelem.u2", None, Sequential, 2, 1;
    LDELEM_I4 = 0x94, "ldelem.i4", None, Sequential, 2, 1;
    LDELEM_U4 = 0x95, "ldelem.u4", None, Sequential, 2, 1;
    LDELEM_I8 = 0x96, "ldelem.i8", None, Sequential, 2, 1;
    LDELEM_I = 0x97, "ldelem.i", None, Sequential, 2, 1;
    LDELEM_R4 = 0x98, "ldelem.r4", None, Sequential, 2, 1;
    LDELEM_R8 = 0x99, "ldelem.r8", None, Sequential, 2, 1;
    LDELEM_REF = 0x9A, "ldelem.ref", None, Sequential, 2, 1;
    STELEM_I = 0x9B, "stelem.i", None, Sequential, 3, 0;
    STELEM_I1 = 0x9C, "stelem.i1", None, Sequential, 3, 0;
    STELEM_I2 = 0x9D, "stelem.i2", None, Sequential, 3, 0;
    STELEM_I4 = 0x9E, "stelem.i4", None, Sequential, 3, 0;
    STELEM_I8 = 0x9F, "stelem.i8", None, Sequential, 3, 0;
    STELEM_R4 = 0xA0, "stelem.r4", None, Sequential, 3, 0;
    STELEM_R8 = 0xA1, "stelem.r8", None, Sequential, 3, 0;
    STELEM_REF = 0xA2, "stelem.ref", None, Sequential, 3, 0;
    LDELEM = 0xA3, "ldelem", Token, Sequential, 2, 1;
    STELEM = 0xA4, "stelem", Token, Sequential, 3, 0;
    UNBOX_ANY = 0xA5, "unbox.any", Token, Sequential, 1, 1;
    CONV_OVF_I1 = 0xB3, "conv.ovf.i1", None, Sequential, 1, 1;
    CONV_OVF_U1 = 0xB4, "conv.ovf.u1", None, Sequential, 1, 1;
    CONV_OVF_I2 = 0xB5, "conv.ovf.i2", None, Sequential, 1, 1;
    CONV_OVF_U2 = 0xB6, "conv.ovf.u2", None, Sequential, 1, 1;
    CONV_OVF_I4 = 0xB7, "conv.ovf.i4", None, Sequential, 1, 1;
    CONV_OVF_U4 = 0xB8, "conv.ovf.u4", None, Sequential, 1, 1;
    CONV_OVF_I8 = 0xB9, "conv.ovf.i8", None, Sequential, 1, 1;
    CONV_OVF_U8 = 0xBA, "conv.ovf.u8", None, Sequential, 1, 1;
    REFANYVAL = 0xC2, "refanyval", Token, Sequential, 1, 1;
    CKFINITE = 0xC3, "ckfinite", None, Sequential, 1, 1;
    MKREFANY = 0xC6, "mkrefany", Token, Sequential, 1, 1;
    LDTOKEN = 0xD0, "ldtoken", Token, Sequential, 0, 1;
    CONV_U2 = 0xD1, "conv.u2", None, Sequential, 1, 1;
    CONV_U1 = 0xD2, "conv.u1", None, Sequential, 1, 1;
    CONV_I = 0xD3, "conv.i", None, Sequential, 1, 1;
    CONV_OVF_I = 0xD4, "conv.ovf.i", None, Sequential, 1, 1;
    CONV_OVF_U = 0xD5, "conv.ovf.u", None, Sequential, 1, 1;
    ADD_OVF = 0xD6, "add.ovf", None, Sequential, 2, 1;
    ADD_OVF_UN = 0xD7, "add.ovf.un", None, Sequential, 2, 1;
    MUL_OVF = 0xD8, "mul.ovf", None, Sequential, 2, 1;
    MUL_OVF_UN = 0xD9, "mul.ovf.un", None, Sequential, 2, 1;
    SUB_OVF = 0xDA, "sub.ovf", None, Sequential, 2, 1;
    SUB_OVF_UN = 0xDB, "sub.ovf.un", None, Sequential, 2, 1;
    ENDFINALLY = 0xDC, "endfinally", None, EndFinally, 0, 0;
    LEAVE = 0xDD, "leave", Target, Leave, 0, 0;
    LEAVE_S = 0xDE, "leave.s", ShortTarget, Leave, 0, 0;
    STIND_I = 0xDF, "stind.i", None, Sequential, 2, 0;
    CONV_U = 0xE0, "conv.u", None, Sequential, 1, 1;
    ARGLIST = 0xFE00, "arglist", None, Sequential, 0, 1;
    CEQ = 0xFE01, "ceq", None, Sequential, 2, 1;
    CGT = 0xFE02, "cgt", None, Sequential, 2, 1;
    CGT_UN = 0xFE03, "cgt.un", None, Sequential, 2, 1;
    CLT = 0xFE04, "clt", None, Sequential, 2, 1;
    CLT_UN = 0xFE05, "clt.un", None, Sequential, 2, 1;
    LDFTN = 0xFE06, "ldftn", Token, Sequential, 0, 1;
    LDVIRTFTN = 0xFE07, "ldvirtftn", Token, Sequential, 1, 1;
    LDARG = 0xFE09, "ldarg", UInt16, Sequential, 0, 1;
    LDARGA = 0xFE0A, "ldarga", UInt16, Sequential, 0, 1;
    STARG = 0xFE0B, "starg", UInt16, Sequential, 1, 0;
    LDLOC = 0xFE0C, "ldloc", UInt16, Sequential, 0, 1;
    LDLOCA = 0xFE0D, "ldloca", UInt16, Sequential, 0, 1;
    STLOC = 0xFE0E, "stloc", UInt16, Sequential, 1, 0;
    LOCALLOC = 0xFE0F, "localloc", None, Sequential, 1, 1;
    ENDFILTER = 0xFE11, "endfilter", None, EndFinally, 1, 0;
    UNALIGNED = 0xFE12, "unaligned.", UInt8, Sequential, 0, 0;
    VOLATILE = 0xFE13, "volatile.", None, Sequential, 0, 0;
    TAIL = 0xFE14, "tail.", None, Sequential, 0, 0;
    INITOBJ = 0xFE15, "initobj", Token, Sequential, 1, 0;
    CONSTRAINED = 0xFE16, "constrained.", Token, Sequential, 0, 0;
    CPBLK = 0xFE17, "cpblk", None, Sequential, 3, 0;
    INITBLK = 0xFE18, "initblk", None, Sequential, 3, 0;
    NO = 0xFE19, "no.", UInt8, Sequential, 0, 0;
    RETHROW = 0xFE1A, "rethrow", None, Throw, 0, 0;
    SIZEOF = 0xFE1C, "sizeof", Token, Sequential, 0, 1;
    REFANYTYPE = 0xFE1D, "refanytype", None, Sequential, 1, 1;
    READONLY = 0xFE1E, "readonly.", None, Sequential, 0, 0;
}

// Never reached: an OpCode value always comes from the table.
static UNDEFINED: OpCodeInfo = OpCodeInfo {
    mnemonic: "???",
    operand: OperandType::None,
    flow: FlowType::Sequential,
    pops: StackCount::Fixed(0),
    pushes: StackCount::Fixed(0),
};

impl OpCode {
    /// Looks up an opcode by its value (`0x00XX` or `0xFEXX`).
    #[must_use]
    pub fn from_value(value: u16) -> Option<OpCode> {
        lookup(value).map(|_| OpCode(value))
    }

    /// The raw value, with the `0xFE` prefix in the high byte for two-byte opcodes.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }

    /// Number of bytes the opcode itself occupies (1 or 2).
    #[must_use]
    pub fn size(self) -> usize {
        if self.0 > 0xFF {
            2
        } else {
            1
        }
    }

    /// Appends the opcode bytes to `out`.
    pub fn write_to(self, out: &mut Vec<u8>) {
        let [prefix, code] = self.0.to_be_bytes();
        if self.0 > 0xFF {
            out.push(prefix);
        }
        out.push(code);
    }

    fn info(self) -> &'static OpCodeInfo {
        lookup(self.0).unwrap_or(&UNDEFINED)
    }

    /// The textual mnemonic, e.g. `ldc.r4`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// How the operand following the opcode is encoded.
    #[must_use]
    pub fn operand_type(self) -> OperandType {
        self.info().operand
    }

    /// Effect on control flow.
    #[must_use]
    pub fn flow(self) -> FlowType {
        self.info().flow
    }

    /// Stack slots consumed.
    #[must_use]
    pub fn pops(self) -> StackCount {
        self.info().pops
    }

    /// Stack slots produced.
    #[must_use]
    pub fn pushes(self) -> StackCount {
        self.info().pushes
    }

    /// Returns true for conditional and unconditional branches, `leave` and `switch`.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::ShortTarget | OperandType::Target | OperandType::Switch
        )
    }

    /// The 4-byte displacement form of a short branch, or `None` if this is not one.
    ///
    /// Short and long branches are laid out in parallel blocks of the table
    /// (`br.s`..`blt.un.s` mirror `br`..`blt.un`), plus the `leave` pair.
    #[must_use]
    pub fn long_form(self) -> Option<OpCode> {
        match self.0 {
            0x2B..=0x37 => Some(OpCode(self.0 + 0x0D)),
            0xDE => Some(OpCode::LEAVE),
            _ => None,
        }
    }

    /// The 1-byte displacement form of a long branch, or `None` if this is not one.
    #[must_use]
    pub fn short_form(self) -> Option<OpCode> {
        match self.0 {
            0x38..=0x44 => Some(OpCode(self.0 - 0x0D)),
            0xDD => Some(OpCode::LEAVE_S),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCode(0x{:02x}, {})", self.0, self.mnemonic())
    }
}
