//! The shared per-instruction dispatch loop (spec §4.4 "Dispatch").
//!
//! [`interpreter::Interpreter`] and [`jit::Jit`] both drive this with their
//! own way of turning a program counter into a decoded `(op, operand)`
//! pair; the actual opcode semantics live here exactly once.

use nv_core::bits::{
    f32_to_slot, f64_to_slot, mask_shift_32, mask_shift_64, sign_extend_32_to_64, slot_to_f32,
    slot_to_f64, truncate_64_to_32,
};
use nv_core::isa::MicroVmOp;
use nv_core::tables::ReferenceTables;

use crate::exceptions::HostException;

const OPERAND_STACK_CAPACITY: usize = 256;

/// Mutable execution state threaded through one method call.
pub struct VmState {
    stack: Vec<i64>,
    pub locals: Vec<i64>,
    pub statics: Vec<i64>,
    /// Arena of heap records (objects and arrays); a pointer is
    /// `index + 1` into this vec, `0` is null.
    pub heap: Vec<Vec<i64>>,
    /// Stack of active catch-handler target pcs, pushed by `TRY_START`.
    handler_stack: Vec<usize>,
}

impl VmState {
    pub fn new(locals: Vec<i64>) -> Self {
        VmState {
            stack: Vec::with_capacity(OPERAND_STACK_CAPACITY),
            locals,
            statics: vec![0; 64],
            heap: Vec::new(),
            handler_stack: Vec::new(),
        }
    }

    fn push(&mut self, v: i64) {
        debug_assert!(
            self.stack.len() < OPERAND_STACK_CAPACITY,
            "micro-VM operand stack overflow"
        );
        self.stack.push(v);
    }

    fn pop(&mut self) -> i64 {
        self.stack.pop().unwrap_or(0)
    }

    fn top(&self) -> i64 {
        *self.stack.last().unwrap_or(&0)
    }

    fn alloc(&mut self, size: usize) -> i64 {
        self.heap.push(vec![0i64; size]);
        self.heap.len() as i64
    }
}

/// What a single executed instruction asks the driving loop to do next.
pub enum StepOutcome {
    Continue,
    Jump(usize),
    Return(i64),
}

/// A fault raised while executing the program: either a host-platform
/// exception (spec §7) or an uncaught `ATHROW` with no active handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    Host(HostException),
    Uncaught(i64),
}

impl From<HostException> for ExecError {
    fn from(e: HostException) -> Self {
        ExecError::Host(e)
    }
}

/// Execute one instruction and report what the driving loop should do.
pub fn step(
    op: u8,
    operand: i64,
    tables: &ReferenceTables,
    state: &mut VmState,
) -> Result<StepOutcome, ExecError> {
    let Some(op) = MicroVmOp::from_u8(op) else {
        // An unrecognized opcode can only mean state desynchronization
        // between encoder and decoder; treat as a fatal host fault rather
        // than silently continuing on garbage.
        return Err(ExecError::Host(HostException::ClassLoaderNull));
    };

    use MicroVmOp::*;
    match op {
        PushInt | PushLong | PushFloat | PushDouble => {
            state.push(operand);
        }
        Ldc => {
            let entry = tables
                .constants
                .get(operand as usize)
                .ok_or(ExecError::Host(HostException::ClassLoaderNull))?;
            let v = match entry {
                nv_core::tables::ConstantEntry::Integer(i) => sign_extend_32_to_64(*i),
                nv_core::tables::ConstantEntry::Float(f) => f32_to_slot(*f),
                nv_core::tables::ConstantEntry::Long(l) => *l,
                nv_core::tables::ConstantEntry::Double(d) => f64_to_slot(*d),
                nv_core::tables::ConstantEntry::String(h) => *h as i64,
                nv_core::tables::ConstantEntry::Class(id) => *id as i64,
            };
            state.push(v);
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | IShl | IShr | IUshr => {
            let b = truncate_64_to_32(state.pop());
            let a = truncate_64_to_32(state.pop());
            let r = match op {
                IAdd => a.wrapping_add(b),
                ISub => a.wrapping_sub(b),
                IMul => a.wrapping_mul(b),
                IDiv => {
                    if b == 0 {
                        return Err(ExecError::Host(HostException::ArithmeticDivideByZero));
                    }
                    a.wrapping_div(b)
                }
                IRem => {
                    if b == 0 {
                        return Err(ExecError::Host(HostException::ArithmeticDivideByZero));
                    }
                    a.wrapping_rem(b)
                }
                IAnd => a & b,
                IOr => a | b,
                IXor => a ^ b,
                IShl => a.wrapping_shl(mask_shift_32(b)),
                IShr => a.wrapping_shr(mask_shift_32(b)),
                IUshr => ((a as u32).wrapping_shr(mask_shift_32(b))) as i32,
                _ => unreachable!(),
            };
            state.push(sign_extend_32_to_64(r));
        }
        INeg => {
            let a = truncate_64_to_32(state.pop());
            state.push(sign_extend_32_to_64(a.wrapping_neg()));
        }

        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | LShl | LShr | LUshr => {
            let b = state.pop();
            let a = state.pop();
            let r = match op {
                LAdd => a.wrapping_add(b),
                LSub => a.wrapping_sub(b),
                LMul => a.wrapping_mul(b),
                LDiv => {
                    if b == 0 {
                        return Err(ExecError::Host(HostException::ArithmeticDivideByZero));
                    }
                    a.wrapping_div(b)
                }
                LRem => {
                    if b == 0 {
                        return Err(ExecError::Host(HostException::ArithmeticDivideByZero));
                    }
                    a.wrapping_rem(b)
                }
                LAnd => a & b,
                LOr => a | b,
                LXor => a ^ b,
                LShl => a.wrapping_shl(mask_shift_64(b)),
                LShr => a.wrapping_shr(mask_shift_64(b)),
                LUshr => ((a as u64).wrapping_shr(mask_shift_64(b))) as i64,
                _ => unreachable!(),
            };
            state.push(r);
        }
        LNeg => {
            let a = state.pop();
            state.push(a.wrapping_neg());
        }

        FAdd | FSub | FMul | FDiv => {
            let b = slot_to_f32(state.pop());
            let a = slot_to_f32(state.pop());
            let r = match op {
                FAdd => a + b,
                FSub => a - b,
                FMul => a * b,
                FDiv => a / b,
                _ => unreachable!(),
            };
            state.push(f32_to_slot(r));
        }
        FNeg => {
            let a = slot_to_f32(state.pop());
            state.push(f32_to_slot(-a));
        }

        DAdd | DSub | DMul | DDiv => {
            let b = slot_to_f64(state.pop());
            let a = slot_to_f64(state.pop());
            let r = match op {
                DAdd => a + b,
                DSub => a - b,
                DMul => a * b,
                DDiv => a / b,
                _ => unreachable!(),
            };
            state.push(f64_to_slot(r));
        }
        DNeg => {
            let a = slot_to_f64(state.pop());
            state.push(f64_to_slot(-a));
        }

        Dup => {
            let v = state.top();
            state.push(v);
        }
        DupX1 => {
            let top = state.pop();
            let below = state.pop();
            state.push(top);
            state.push(below);
            state.push(top);
        }
        DupX2 => {
            let v1 = state.pop();
            let v2 = state.pop();
            let v3 = state.pop();
            state.push(v1);
            state.push(v3);
            state.push(v2);
            state.push(v1);
        }
        Dup2 => {
            let v1 = state.pop();
            let v2 = state.pop();
            state.push(v2);
            state.push(v1);
            state.push(v2);
            state.push(v1);
        }
        Dup2X1 => {
            let v1 = state.pop();
            let v2 = state.pop();
            let v3 = state.pop();
            state.push(v2);
            state.push(v1);
            state.push(v3);
            state.push(v2);
            state.push(v1);
        }
        Dup2X2 => {
            let v1 = state.pop();
            let v2 = state.pop();
            let v3 = state.pop();
            let v4 = state.pop();
            state.push(v2);
            state.push(v1);
            state.push(v4);
            state.push(v3);
            state.push(v2);
            state.push(v1);
        }
        Swap => {
            let a = state.pop();
            let b = state.pop();
            state.push(a);
            state.push(b);
        }
        Pop => {
            state.pop();
        }
        Pop2 => {
            state.pop();
            state.pop();
        }

        ILoad | LLoad | FLoad | DLoad | ALoad => {
            let idx = operand as usize;
            let v = *state.locals.get(idx).unwrap_or(&0);
            state.push(v);
        }
        IStore | LStore | FStore | DStore | AStore => {
            let idx = operand as usize;
            let v = state.pop();
            if idx >= state.locals.len() {
                state.locals.resize(idx + 1, 0);
            }
            state.locals[idx] = v;
        }

        IaLoad | LaLoad | FaLoad | DaLoad | AaLoad | BaLoad | CaLoad | SaLoad => {
            let index = truncate_64_to_32(state.pop()) as i64;
            let arrayref = state.pop();
            let v = array_load(state, arrayref, index)?;
            state.push(v);
        }
        IaStore | LaStore | FaStore | DaStore | AaStore | BaStore | CaStore | SaStore => {
            let value = state.pop();
            let index = truncate_64_to_32(state.pop()) as i64;
            let arrayref = state.pop();
            array_store(state, arrayref, index, value)?;
        }
        ArrayLength => {
            let arrayref = state.pop();
            let len = if arrayref == 0 {
                0
            } else {
                state.heap[(arrayref - 1) as usize].len() as i64
            };
            state.push(len);
        }

        I2L => {
            let v = truncate_64_to_32(state.pop());
            state.push(sign_extend_32_to_64(v));
        }
        I2F => {
            let v = truncate_64_to_32(state.pop());
            state.push(f32_to_slot(v as f32));
        }
        I2D => {
            let v = truncate_64_to_32(state.pop());
            state.push(f64_to_slot(v as f64));
        }
        L2I => {
            let v = state.pop();
            state.push(sign_extend_32_to_64(truncate_64_to_32(v)));
        }
        L2F => {
            let v = state.pop();
            state.push(f32_to_slot(v as f32));
        }
        L2D => {
            let v = state.pop();
            state.push(f64_to_slot(v as f64));
        }
        F2I => {
            let v = slot_to_f32(state.pop());
            state.push(sign_extend_32_to_64(v as i32));
        }
        F2L => {
            let v = slot_to_f32(state.pop());
            state.push(v as i64);
        }
        F2D => {
            let v = slot_to_f32(state.pop());
            state.push(f64_to_slot(v as f64));
        }
        D2I => {
            let v = slot_to_f64(state.pop());
            state.push(sign_extend_32_to_64(v as i32));
        }
        D2L => {
            let v = slot_to_f64(state.pop());
            state.push(v as i64);
        }
        D2F => {
            let v = slot_to_f64(state.pop());
            state.push(f32_to_slot(v as f32));
        }

        IfIcmpEq | IfIcmpNe | IfIcmpLt | IfIcmpLe | IfIcmpGt | IfIcmpGe => {
            let b = truncate_64_to_32(state.pop());
            let a = truncate_64_to_32(state.pop());
            let taken = match op {
                IfIcmpEq => a == b,
                IfIcmpNe => a != b,
                IfIcmpLt => a < b,
                IfIcmpLe => a <= b,
                IfIcmpGt => a > b,
                IfIcmpGe => a >= b,
                _ => unreachable!(),
            };
            if taken {
                return Ok(StepOutcome::Jump(operand as usize));
            }
        }
        Goto => {
            return Ok(StepOutcome::Jump(operand as usize));
        }

        TableSwitch => {
            let desc = tables
                .table_switches
                .get(operand as usize)
                .ok_or(ExecError::Host(HostException::ClassLoaderNull))?;
            let key = truncate_64_to_32(state.pop());
            let target = if key >= desc.low && key <= desc.high {
                desc.targets[(key - desc.low) as usize]
            } else {
                desc.default_target
            };
            return Ok(StepOutcome::Jump(target));
        }
        LookupSwitch => {
            let desc = tables
                .lookup_switches
                .get(operand as usize)
                .ok_or(ExecError::Host(HostException::ClassLoaderNull))?;
            let key = truncate_64_to_32(state.pop());
            let target = desc
                .keys
                .iter()
                .position(|&k| k == key)
                .map(|i| desc.targets[i])
                .unwrap_or(desc.default_target);
            return Ok(StepOutcome::Jump(target));
        }

        InvokeStatic => {
            // Simplified per spec §3: real invocation is out of scope for
            // the micro-VM; programs containing this opcode are normally
            // rejected by the eligibility filter before reaching here
            // unless the permissive switch is enabled.
            state.push(0);
        }

        New => {
            let ptr = state.alloc(operand.max(0) as usize);
            state.push(ptr);
        }
        ANewArray => {
            let count = truncate_64_to_32(state.pop());
            if count < 0 {
                return Err(ExecError::Host(HostException::NegativeArraySize {
                    size: count as i64,
                }));
            }
            let ptr = state.alloc(count as usize);
            state.push(ptr);
        }
        MultiANewArray => {
            let info = tables
                .multi_arrays
                .get(operand as usize)
                .ok_or(ExecError::Host(HostException::ClassLoaderNull))?;
            let dims = info.dims.max(1) as usize;
            let mut sizes = Vec::with_capacity(dims);
            for _ in 0..dims {
                sizes.push(truncate_64_to_32(state.pop()));
            }
            let outer = sizes[dims - 1];
            if sizes.iter().any(|&s| s < 0) {
                return Err(ExecError::Host(HostException::NegativeArraySize {
                    size: outer as i64,
                }));
            }
            // Leaf arrays are left null; only the outermost level is
            // materialized (spec §8 boundary: "terminates at leaf arrays
            // without recursing").
            let ptr = state.alloc(outer as usize);
            state.push(ptr);
        }
        CheckCast => {
            // No static type information is modeled; passthrough.
        }
        InstanceOf => {
            let v = state.pop();
            state.push(if v != 0 { 1 } else { 0 });
        }

        GetStatic => {
            let idx = operand as usize;
            let v = *state.statics.get(idx).unwrap_or(&0);
            state.push(v);
        }
        PutStatic => {
            let idx = operand as usize;
            let v = state.pop();
            if idx >= state.statics.len() {
                state.statics.resize(idx + 1, 0);
            }
            state.statics[idx] = v;
        }
        GetField => {
            let objref = state.pop();
            let v = field_load(state, objref, operand)?;
            state.push(v);
        }
        PutField => {
            let v = state.pop();
            let objref = state.pop();
            field_store(state, objref, operand, v)?;
        }

        AThrow => {
            let exc = state.pop();
            if let Some(handler_pc) = state.handler_stack.pop() {
                state.push(exc);
                return Ok(StepOutcome::Jump(handler_pc));
            }
            return Err(ExecError::Uncaught(exc));
        }
        TryStart => {
            state.handler_stack.push(operand as usize);
        }
        CatchHandler | FinallyHandler | ExceptionCheck => {
            // Landing-pad / reserved markers; no additional runtime effect
            // beyond being a valid jump target.
        }
        ExceptionClear => {
            state.handler_stack.pop();
        }

        Halt => {
            return Ok(StepOutcome::Return(state.top()));
        }
    }

    Ok(StepOutcome::Continue)
}

fn array_load(state: &VmState, arrayref: i64, index: i64) -> Result<i64, ExecError> {
    if arrayref == 0 {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index,
            length: 0,
        }));
    }
    let arr = &state.heap[(arrayref - 1) as usize];
    if index < 0 || index as usize >= arr.len() {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index,
            length: arr.len() as i64,
        }));
    }
    Ok(arr[index as usize])
}

fn array_store(state: &mut VmState, arrayref: i64, index: i64, value: i64) -> Result<(), ExecError> {
    if arrayref == 0 {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index,
            length: 0,
        }));
    }
    let arr = &mut state.heap[(arrayref - 1) as usize];
    if index < 0 || index as usize >= arr.len() {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index,
            length: arr.len() as i64,
        }));
    }
    arr[index as usize] = value;
    Ok(())
}

fn field_load(state: &VmState, objref: i64, field_index: i64) -> Result<i64, ExecError> {
    if objref == 0 {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index: field_index,
            length: 0,
        }));
    }
    Ok(*state.heap[(objref - 1) as usize]
        .get(field_index as usize)
        .unwrap_or(&0))
}

fn field_store(state: &mut VmState, objref: i64, field_index: i64, value: i64) -> Result<(), ExecError> {
    if objref == 0 {
        return Err(ExecError::Host(HostException::ArrayIndexOutOfBounds {
            index: field_index,
            length: 0,
        }));
    }
    let rec = &mut state.heap[(objref - 1) as usize];
    let idx = field_index as usize;
    if idx >= rec.len() {
        rec.resize(idx + 1, 0);
    }
    rec[idx] = value;
    Ok(())
}
