//! The interpreter execution variant (spec §4.4): decodes one instruction
//! per step, re-walking the state chain from the top of the program every
//! time. Slower than [`super::jit::Jit`] by construction, but able to run
//! any program the translator emits, including ones the JIT's eligibility
//! check would refuse.

use nv_core::isa::{GOLDEN_RATIO_64, KEY, MicroVmInstr};
use nv_core::tables::ReferenceTables;

use super::dispatch::{ExecError, StepOutcome, VmState, step};

fn evolve(state: u64) -> u64 {
    state.wrapping_add(KEY) ^ (KEY >> 3)
}

/// Recompute the decoded `(op, operand)` pair for `index` by replaying the
/// state chain from the start of the program. Deliberately not cached:
/// that's what makes this the "decodes per step" variant rather than the
/// JIT's "decodes once" variant.
fn decode_single(code: &[MicroVmInstr], index: usize, seed: u64) -> (u8, i64) {
    let mut state = KEY ^ seed;
    for instr in &code[..=index] {
        state = evolve(state);
        if std::ptr::eq(instr, &code[index]) {
            let op = instr.op ^ (state as u8);
            let operand_mask = state.wrapping_mul(GOLDEN_RATIO_64) as i64;
            let operand = instr.operand ^ operand_mask;
            return (op, operand);
        }
    }
    unreachable!("index within code bounds")
}

pub struct Interpreter<'a> {
    code: &'a [MicroVmInstr],
    seed: u64,
    tables: &'a ReferenceTables,
}

impl<'a> Interpreter<'a> {
    pub fn new(code: &'a [MicroVmInstr], seed: u64, tables: &'a ReferenceTables) -> Self {
        Interpreter { code, seed, tables }
    }

    /// Run the program to completion starting with the given locals,
    /// returning the value left by `HALT` (or `0` if the program runs off
    /// its own end without halting, matching the empty-method convention
    /// used by the code generator).
    pub fn run(&self, locals: Vec<i64>) -> Result<i64, ExecError> {
        let mut state = VmState::new(locals);
        let mut pc = 0usize;
        loop {
            if pc >= self.code.len() {
                return Ok(0);
            }
            let (op, operand) = decode_single(self.code, pc, self.seed);
            match step(op, operand, self.tables, &mut state)? {
                StepOutcome::Continue => pc += 1,
                StepOutcome::Jump(target) => pc = target,
                StepOutcome::Return(v) => return Ok(v),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microvm::encode::encode_program;
    use nv_core::isa::MicroVmOp;

    #[test]
    fn adds_two_constants() {
        let mut code = vec![
            MicroVmInstr::new(MicroVmOp::PushInt, 2_147_483_640),
            MicroVmInstr::new(MicroVmOp::PushInt, 10),
            MicroVmInstr::new(MicroVmOp::IAdd, 0),
            MicroVmInstr::new(MicroVmOp::Halt, 0),
        ];
        encode_program(&mut code, 42);
        let tables = ReferenceTables::default();
        let interp = Interpreter::new(&code, 42, &tables);
        let result = interp.run(vec![]).unwrap();
        assert_eq!(result, -2_147_483_646);
    }

    #[test]
    fn divide_by_zero_faults() {
        let mut code = vec![
            MicroVmInstr::new(MicroVmOp::PushInt, 5),
            MicroVmInstr::new(MicroVmOp::PushInt, 0),
            MicroVmInstr::new(MicroVmOp::IDiv, 0),
            MicroVmInstr::new(MicroVmOp::Halt, 0),
        ];
        encode_program(&mut code, 7);
        let tables = ReferenceTables::default();
        let interp = Interpreter::new(&code, 7, &tables);
        let err = interp.run(vec![]).unwrap_err();
        assert_eq!(
            err,
            ExecError::Host(crate::exceptions::HostException::ArithmeticDivideByZero)
        );
    }

    #[test]
    fn try_catch_recovers_to_constant() {
        // try { throw 1 } catch (Any e) { push 7 }; halt
        let mut code = vec![
            MicroVmInstr::new(MicroVmOp::TryStart, 3), // handler at index 3
            MicroVmInstr::new(MicroVmOp::PushInt, 1),
            MicroVmInstr::new(MicroVmOp::AThrow, 0),
            MicroVmInstr::new(MicroVmOp::CatchHandler, 0), // index 3: landing pad
            MicroVmInstr::new(MicroVmOp::Pop, 0),          // discard the thrown value
            MicroVmInstr::new(MicroVmOp::PushInt, 7),
            MicroVmInstr::new(MicroVmOp::Halt, 0),
        ];
        encode_program(&mut code, 3);
        let tables = ReferenceTables::default();
        let interp = Interpreter::new(&code, 3, &tables);
        let result = interp.run(vec![]).unwrap();
        assert_eq!(result, 7);
    }

    #[test]
    fn uncaught_throw_propagates() {
        let mut code = vec![
            MicroVmInstr::new(MicroVmOp::PushInt, 99),
            MicroVmInstr::new(MicroVmOp::AThrow, 0),
        ];
        encode_program(&mut code, 1);
        let tables = ReferenceTables::default();
        let interp = Interpreter::new(&code, 1, &tables);
        let err = interp.run(vec![]).unwrap_err();
        assert_eq!(err, ExecError::Uncaught(99));
    }
}
