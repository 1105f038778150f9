//! The JIT execution variant (spec §4.4): decodes the whole program once
//! up front, then dispatches over plain `(op, operand)` pairs. Requires
//! every opcode in the program to be on [`MicroVmOp::jit_allowed`]'s list;
//! programs that don't qualify must fall back to [`super::interpreter::Interpreter`].

use nv_core::isa::MicroVmInstr;
use nv_core::tables::ReferenceTables;

use super::dispatch::{ExecError, StepOutcome, VmState, step};
use super::encode::decode_program;

/// A program that has passed the eligibility check and been fully
/// decoded. Cheap to dispatch repeatedly; expensive to construct (the
/// decode pass, amortized once per JIT instance rather than per call).
pub struct Jit {
    decoded: Vec<MicroVmInstr>,
}

impl Jit {
    /// Attempt to JIT-compile an encoded program. Returns `None` if any
    /// instruction's opcode isn't on the allow-list, per spec §4.4's
    /// eligibility policy: "opcodes outside a documented allow-list...
    /// cause the JIT path to refuse compilation and return an empty
    /// handle."
    pub fn try_compile(code: &[MicroVmInstr], seed: u64) -> Option<Jit> {
        let mut decoded = code.to_vec();
        decode_program(&mut decoded, seed);
        for instr in &decoded {
            let op = nv_core::isa::MicroVmOp::from_u8(instr.op)?;
            if !op.jit_allowed() {
                return None;
            }
        }
        Some(Jit { decoded })
    }

    pub fn run(&self, locals: Vec<i64>, tables: &ReferenceTables) -> Result<i64, ExecError> {
        let mut state = VmState::new(locals);
        let mut pc = 0usize;
        loop {
            if pc >= self.decoded.len() {
                return Ok(0);
            }
            let instr = &self.decoded[pc];
            match step(instr.op, instr.operand, tables, &mut state)? {
                StepOutcome::Continue => pc += 1,
                StepOutcome::Jump(target) => pc = target,
                StepOutcome::Return(v) => return Ok(v),
            }
        }
    }
}
