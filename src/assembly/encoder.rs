//! CIL instruction encoding.
//!
//! [`encode_body`] serializes an editable [`MethodBody`] back into ECMA-335 form. Offsets are
//! recomputed from scratch, so an edited body never carries stale displacements:
//!
//! 1. Every instruction keeps its opcode form, except short branches whose displacement no
//!    longer fits in a signed byte. Those are widened to their 32-bit form and the layout is
//!    recomputed until no short branch overflows. Widening only ever grows instructions, so
//!    the loop terminates.
//! 2. Branch operands and exception handler boundaries are turned back into byte offsets.
//! 3. The evaluation stack is simulated over every reachable path to find the deepest point;
//!    the header declares the larger of that depth and the depth the body was decoded with.

use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    assembly::{FlowType, Immediate, OpCode, Operand, OperandType, StackCount},
    file::io::write_le_to,
    metadata::{
        method::{
            ExceptionClause, ExceptionHandler, ExceptionHandlerFlags, InstrId, MethodBody,
            MethodHeader, MethodSignature,
        },
        token::Token,
    },
    Error::{DanglingTarget, UnresolvedToken},
    Result,
};

/// Looks up the signature behind the token operand of a call.
///
/// The encoder uses it to work out how many stack slots `call`, `callvirt` and `newobj`
/// consume and produce.
pub trait SignatureResolver {
    /// Signature of the `MethodDef` or `MemberRef` behind `token`.
    fn method_signature(&self, token: Token) -> Option<&MethodSignature>;
}

/// Serializes `body` into a complete method body: header, code and exception sections.
///
/// # Arguments
/// * `body` - The body to encode
/// * `resolver` - Source of signatures for call instructions
/// * `returns_value` - Whether the owning method returns a value, which decides what `ret`
///   pops
///
/// # Errors
///
/// Returns [`crate::Error::DanglingTarget`] if a branch or handler boundary refers to an
/// instruction that is no longer in the body, [`crate::Error::UnresolvedToken`] if a call
/// target has no known signature, and [`crate::Error::Malformed`] if a handler range is
/// inverted or a short branch has no long form.
pub fn encode_body(
    body: &MethodBody,
    resolver: &dyn SignatureResolver,
    returns_value: bool,
) -> Result<Vec<u8>> {
    let layout = Layout::new(body)?;
    let code = layout.emit()?;

    let computed = max_stack(&layout, body, resolver, returns_value)?;
    let clauses = body
        .exception_handlers
        .iter()
        .map(|handler| layout.clause(handler))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Encoded {} instructions into {} bytes (max stack {} -> {})",
        layout.operands.len(),
        code.len(),
        body.max_stack,
        computed.max(body.max_stack)
    );

    let header = MethodHeader {
        size_header: 0,
        size_code: code.len(),
        max_stack: computed.max(body.max_stack),
        local_var_sig_token: body.local_var_sig_token,
        is_fat: false,
        init_locals: body.init_locals,
        clauses,
    };

    header.write(&code)
}

/// Final opcode forms and byte offsets of a body.
struct Layout<'a> {
    opcodes: Vec<OpCode>,
    operands: Vec<&'a Operand>,
    offsets: Vec<u32>,
    code_size: u32,
    index: HashMap<InstrId, usize>,
}

impl<'a> Layout<'a> {
    fn new(body: &'a MethodBody) -> Result<Self> {
        let mut opcodes = Vec::with_capacity(body.len());
        let mut operands = Vec::with_capacity(body.len());
        let mut index = HashMap::with_capacity(body.len());

        for (position, (id, instruction)) in body.iter().enumerate() {
            opcodes.push(instruction.opcode);
            operands.push(&instruction.operand);
            index.insert(id, position);
        }

        for operand in &operands {
            if operand.targets().iter().any(|target| !index.contains_key(target)) {
                return Err(DanglingTarget);
            }
        }
        for handler in &body.exception_handlers {
            if handler.boundaries().any(|boundary| !index.contains_key(&boundary)) {
                return Err(DanglingTarget);
            }
        }

        let mut layout = Layout {
            opcodes,
            operands,
            offsets: Vec::new(),
            code_size: 0,
            index,
        };

        loop {
            layout.assign_offsets()?;
            if !layout.widen()? {
                break;
            }
        }

        Ok(layout)
    }

    fn size_of(&self, position: usize) -> usize {
        let opcode = self.opcodes[position];
        let operand = match (self.operands[position], opcode.operand_type().size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 0,
        };
        opcode.size() + operand
    }

    fn assign_offsets(&mut self) -> Result<()> {
        let mut offsets = Vec::with_capacity(self.opcodes.len());
        let mut offset = 0_u32;
        for position in 0..self.opcodes.len() {
            offsets.push(offset);
            let size = u32::try_from(self.size_of(position))
                .map_err(|_| malformed_error!("Instruction at #{} is too large", position))?;
            offset = offset
                .checked_add(size)
                .ok_or_else(|| malformed_error!("Method code exceeds 4 GiB"))?;
        }
        self.offsets = offsets;
        self.code_size = offset;
        Ok(())
    }

    /// Switches every overflowing short branch to its long form. Returns true if any was.
    fn widen(&mut self) -> Result<bool> {
        let mut widened = false;
        for position in 0..self.opcodes.len() {
            let opcode = self.opcodes[position];
            if opcode.operand_type() != OperandType::ShortTarget {
                continue;
            }

            let Operand::Target(target) = self.operands[position] else {
                continue;
            };
            if i8::try_from(self.displacement(position, *target)).is_ok() {
                continue;
            }

            let Some(long) = opcode.long_form() else {
                return Err(malformed_error!("{} has no long form", opcode));
            };
            debug!("Widening {} at #{} to {}", opcode, position, long);
            self.opcodes[position] = long;
            widened = true;
        }
        Ok(widened)
    }

    fn position(&self, id: InstrId) -> usize {
        self.index[&id]
    }

    fn offset_of(&self, id: InstrId) -> u32 {
        self.offsets[self.position(id)]
    }

    /// Distance from the end of the instruction at `position` to `target`.
    fn displacement(&self, position: usize, target: InstrId) -> i64 {
        let end = i64::from(self.offsets[position]) + self.size_of(position) as i64;
        i64::from(self.offset_of(target)) - end
    }

    fn emit(&self) -> Result<Vec<u8>> {
        let mut code = Vec::with_capacity(self.code_size as usize);

        for (position, (opcode, operand)) in self.opcodes.iter().zip(&self.operands).enumerate()
        {
            opcode.write_to(&mut code);
            match operand {
                Operand::None => {}
                Operand::Immediate(immediate) => write_immediate(&mut code, *immediate),
                Operand::Token(token) => write_le_to(&mut code, token.value()),
                Operand::Target(target) => {
                    let displacement = self.displacement(position, *target);
                    if opcode.operand_type() == OperandType::ShortTarget {
                        let short = i8::try_from(displacement).map_err(|_| {
                            malformed_error!("Short branch at #{} out of range", position)
                        })?;
                        write_le_to(&mut code, short);
                    } else {
                        let long = i32::try_from(displacement).map_err(|_| {
                            malformed_error!("Branch at #{} out of range", position)
                        })?;
                        write_le_to(&mut code, long);
                    }
                }
                Operand::Switch(targets) => {
                    let count = u32::try_from(targets.len())
                        .map_err(|_| malformed_error!("Switch at #{} is too large", position))?;
                    write_le_to(&mut code, count);
                    for target in targets {
                        let displacement = i32::try_from(self.displacement(position, *target))
                            .map_err(|_| {
                                malformed_error!("Switch case at #{} out of range", position)
                            })?;
                        write_le_to(&mut code, displacement);
                    }
                }
            }
        }

        Ok(code)
    }

    fn clause(&self, handler: &ExceptionHandler) -> Result<ExceptionClause> {
        let end = |id: Option<InstrId>| id.map_or(self.code_size, |id| self.offset_of(id));
        let range = |start: InstrId, stop: Option<InstrId>| -> Result<(u32, u32)> {
            let start = self.offset_of(start);
            let length = end(stop)
                .checked_sub(start)
                .ok_or_else(|| malformed_error!("Exception handler range ends before it starts"))?;
            Ok((start, length))
        };

        let (try_offset, try_length) = range(handler.try_start, handler.try_end)?;
        let (handler_offset, handler_length) = range(handler.handler_start, handler.handler_end)?;

        let class_token_or_filter = match handler.filter_start {
            Some(filter) if handler.flags.contains(ExceptionHandlerFlags::FILTER) => {
                self.offset_of(filter)
            }
            _ => handler.class_token.value(),
        };

        Ok(ExceptionClause {
            flags: handler.flags,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            class_token_or_filter,
        })
    }
}

fn write_immediate(out: &mut Vec<u8>, immediate: Immediate) {
    match immediate {
        Immediate::Int8(value) => write_le_to(out, value),
        Immediate::UInt8(value) => write_le_to(out, value),
        Immediate::UInt16(value) => write_le_to(out, value),
        Immediate::Int32(value) => write_le_to(out, value),
        Immediate::Int64(value) => write_le_to(out, value),
        Immediate::Float32(value) => write_le_to(out, value),
        Immediate::Float64(value) => write_le_to(out, value),
    }
}

/// Stack slots popped and pushed by one instruction.
fn stack_effect(
    opcode: OpCode,
    operand: &Operand,
    resolver: &dyn SignatureResolver,
    returns_value: bool,
) -> Result<(usize, usize)> {
    let fixed = |count: StackCount| match count {
        StackCount::Fixed(n) => Some(usize::from(n)),
        StackCount::Variable => None,
    };

    if let (Some(pops), Some(pushes)) = (fixed(opcode.pops()), fixed(opcode.pushes())) {
        return Ok((pops, pushes));
    }

    Ok(match opcode {
        OpCode::RET => (usize::from(returns_value), 0),
        OpCode::NEWOBJ => (call_signature(opcode, operand, resolver)?.params.len(), 1),
        OpCode::CALL | OpCode::CALLVIRT => {
            let signature = call_signature(opcode, operand, resolver)?;
            (signature.call_pops(), usize::from(signature.returns_value()))
        }
        _ => {
            // Stand-alone call site signatures are not modelled; count the function pointer
            // and assume one result.
            warn!("Assuming a stack effect of -1/+1 for {}", opcode);
            (1, 1)
        }
    })
}

fn call_signature<'r>(
    opcode: OpCode,
    operand: &Operand,
    resolver: &'r dyn SignatureResolver,
) -> Result<&'r MethodSignature> {
    match operand {
        Operand::Token(token) => resolver
            .method_signature(*token)
            .ok_or(UnresolvedToken(*token)),
        _ => Err(malformed_error!("{} without a method token", opcode)),
    }
}

fn enter(
    position: usize,
    depth: usize,
    depths: &mut [Option<usize>],
    worklist: &mut Vec<usize>,
) {
    match depths.get_mut(position) {
        Some(slot) if slot.is_none() => {
            *slot = Some(depth);
            worklist.push(position);
        }
        _ => {}
    }
}

/// Deepest evaluation stack over every path reachable from the entry point or a handler.
fn max_stack(
    layout: &Layout<'_>,
    body: &MethodBody,
    resolver: &dyn SignatureResolver,
    returns_value: bool,
) -> Result<u16> {
    let mut depths: Vec<Option<usize>> = vec![None; layout.opcodes.len()];
    let mut worklist = Vec::new();

    enter(0, 0, &mut depths, &mut worklist);
    for handler in &body.exception_handlers {
        let depth = usize::from(handler.pushes_exception());
        enter(layout.position(handler.handler_start), depth, &mut depths, &mut worklist);
        if let Some(filter) = handler.filter_start {
            enter(layout.position(filter), 1, &mut depths, &mut worklist);
        }
    }

    let mut deepest = 0_usize;
    while let Some(position) = worklist.pop() {
        let depth = depths[position].unwrap_or(0);
        let opcode = layout.opcodes[position];
        let operand = layout.operands[position];

        let (pops, pushes) = stack_effect(opcode, operand, resolver, returns_value)?;
        if pops > depth {
            warn!("Stack underflow at #{} ({}): depth {}, pops {}", position, opcode, depth, pops);
        }
        let after = depth.saturating_sub(pops) + pushes;
        deepest = deepest.max(depth).max(after);

        let flow = opcode.flow();
        let branch_depth = if flow == FlowType::Leave { 0 } else { after };
        for target in operand.targets() {
            enter(layout.position(*target), branch_depth, &mut depths, &mut worklist);
        }
        if flow.falls_through() {
            enter(position + 1, after, &mut depths, &mut worklist);
        }
    }

    u16::try_from(deepest).map_err(|_| malformed_error!("Stack depth {} overflows", deepest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{decode_body, Instruction};

    struct Signatures(HashMap<Token, MethodSignature>);

    impl SignatureResolver for Signatures {
        fn method_signature(&self, token: Token) -> Option<&MethodSignature> {
            self.0.get(&token)
        }
    }

    fn none() -> Signatures {
        Signatures(HashMap::new())
    }

    fn push(body: &mut MethodBody, opcode: OpCode, operand: Operand) -> InstrId {
        body.push(Instruction::new(opcode, operand).unwrap()).unwrap()
    }

    #[test]
    fn round_trip_unchanged() {
        // Tiny header: ldarg.0; brfalse.s +1; nop; ret
        let data = [0x16, 0x02, 0x2C, 0x01, 0x00, 0x2A];
        let body = decode_body(&data).unwrap();

        let encoded = encode_body(&body, &none(), false).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn widens_overflowing_short_branch() {
        let mut body = MethodBody::new();
        let first = push(&mut body, OpCode::NOP, Operand::None);
        for _ in 0..200 {
            push(&mut body, OpCode::NOP, Operand::None);
        }
        push(&mut body, OpCode::BR_S, Operand::Target(first));

        let encoded = encode_body(&body, &none(), false).unwrap();
        let decoded = decode_body(&encoded).unwrap();

        let branch = decoded.instruction(decoded.at(201).unwrap()).unwrap();
        assert_eq!(branch.opcode, OpCode::BR);
        assert_eq!(branch.operand, Operand::Target(decoded.at(0).unwrap()));
    }

    #[test]
    fn keeps_short_branch_in_range() {
        let mut body = MethodBody::new();
        let first = push(&mut body, OpCode::NOP, Operand::None);
        push(&mut body, OpCode::BR_S, Operand::Target(first));

        let encoded = encode_body(&body, &none(), false).unwrap();
        // Tiny header, nop, br.s -3
        assert_eq!(encoded, [0x0E, 0x00, 0x2B, 0xFD]);
    }

    #[test]
    fn switch_displacements() {
        let mut body = MethodBody::new();
        push(&mut body, OpCode::LDC_I4_0, Operand::None);
        let nop = body.id_for_slot(2);
        let ret = body.id_for_slot(3);
        body.push_unchecked(Instruction::new(OpCode::SWITCH, Operand::Switch(vec![nop, ret])).unwrap());
        push(&mut body, OpCode::NOP, Operand::None);
        push(&mut body, OpCode::RET, Operand::None);

        let encoded = encode_body(&body, &none(), false).unwrap();
        let decoded = decode_body(&encoded).unwrap();
        let switch = decoded.instruction(decoded.at(1).unwrap()).unwrap();
        assert_eq!(
            switch.operand,
            Operand::Switch(vec![decoded.at(2).unwrap(), decoded.at(3).unwrap()])
        );
    }

    #[test]
    fn max_stack_counts_calls() {
        let concat = Token::from_parts(Token::MEMBER_REF, 1);
        let signatures = Signatures(HashMap::from([(
            concat,
            MethodSignature::new_static(&["System.String", "System.String"], "System.String"),
        )]));

        let mut body = MethodBody::new();
        body.max_stack = 1;
        for _ in 0..10 {
            push(&mut body, OpCode::LDNULL, Operand::None);
        }
        for _ in 0..9 {
            push(&mut body, OpCode::CALL, Operand::Token(concat));
        }
        push(&mut body, OpCode::RET, Operand::None);

        let encoded = encode_body(&body, &signatures, true).unwrap();
        let header = MethodHeader::parse(&encoded).unwrap();
        assert!(header.is_fat);
        assert_eq!(header.max_stack, 10);
    }

    #[test]
    fn max_stack_never_shrinks() {
        let mut body = MethodBody::new();
        body.max_stack = 16;
        push(&mut body, OpCode::RET, Operand::None);

        let encoded = encode_body(&body, &none(), false).unwrap();
        assert_eq!(MethodHeader::parse(&encoded).unwrap().max_stack, 16);
    }

    #[test]
    fn unresolved_call() {
        let mut body = MethodBody::new();
        let token = Token::from_parts(Token::MEMBER_REF, 9);
        push(&mut body, OpCode::CALL, Operand::Token(token));
        push(&mut body, OpCode::RET, Operand::None);

        assert!(matches!(
            encode_body(&body, &none(), false),
            Err(UnresolvedToken(t)) if t == token
        ));
    }

    #[test]
    fn dangling_target() {
        let mut body = MethodBody::new();
        let first = push(&mut body, OpCode::NOP, Operand::None);
        push(&mut body, OpCode::BR, Operand::Target(first));
        body.detach(first).unwrap();

        assert!(matches!(encode_body(&body, &none(), false), Err(DanglingTarget)));
    }

    #[test]
    fn exception_handlers_round_trip() {
        let mut body = MethodBody::new();
        let try_start = push(&mut body, OpCode::NOP, Operand::None);
        let leave_target = body.id_for_slot(3);
        body.push_unchecked(Instruction::new(OpCode::LEAVE_S, Operand::Target(leave_target)).unwrap());
        let handler = push(&mut body, OpCode::POP, Operand::None);
        body.push_unchecked(Instruction::new(OpCode::RET, Operand::None).unwrap());
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start,
            try_end: Some(handler),
            handler_start: handler,
            handler_end: Some(leave_target),
            filter_start: None,
            class_token: Token::from_parts(Token::TYPE_REF, 2),
        });

        let encoded = encode_body(&body, &none(), false).unwrap();
        let header = MethodHeader::parse(&encoded).unwrap();
        assert_eq!(header.clauses.len(), 1);
        assert_eq!(header.clauses[0].try_offset, 0);
        assert_eq!(header.clauses[0].try_length, 3);
        assert_eq!(header.clauses[0].handler_offset, 3);
        assert_eq!(header.clauses[0].handler_length, 1);
        assert_eq!(header.clauses[0].class_token_or_filter, 0x0100_0002);
        // The catch handler is entered with the exception on the stack
        assert!(header.max_stack >= 1);

        let decoded = decode_body(&encoded).unwrap();
        assert_eq!(decoded.exception_handlers[0].handler_start, decoded.at(2).unwrap());
        assert_eq!(decoded.exception_handlers[0].try_end, Some(decoded.at(2).unwrap()));
        assert_eq!(decoded.exception_handlers[0].handler_end, Some(decoded.at(3).unwrap()));
    }

    #[test]
    fn void_return_pops_nothing() {
        let mut body = MethodBody::new();
        push(&mut body, OpCode::RET, Operand::None);
        let encoded = encode_body(&body, &none(), false).unwrap();
        assert_eq!(encoded, [0x06, 0x2A]);
    }
}
