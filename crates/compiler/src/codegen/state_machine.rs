//! State-Machine Codegen (C6, spec §4.6): the fallback path used when a
//! method is not eligible for micro-VM translation. Emits one dispatch
//! state per bytecode instruction; each state's body is produced by a
//! per-opcode handler and its tail transitions to the next state unless
//! the instruction already redirects control flow.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::bytecode::{BytecodeMethod, Instruction, Operand, SourceOp, ValueType};
use crate::pools::LabelPool;

use super::{catch_resolver, StateFragment};

/// Maps a descriptor-level type to the pseudo-C native type used in the
/// emitted dispatch entry point signature (spec §6: "each subsequent
/// argument is typed per the source descriptor").
fn native_type(vt: &ValueType) -> &'static str {
    match vt {
        ValueType::Int => "int32_t",
        ValueType::Long => "int64_t",
        ValueType::Float => "float",
        ValueType::Double => "double",
        ValueType::Reference(_) => "void*",
        ValueType::Void => "void",
    }
}

/// The field of the tagged `Value` union a given type lives in.
fn value_field(vt: &ValueType) -> &'static str {
    match vt {
        ValueType::Int => "i",
        ValueType::Long => "l",
        ValueType::Float => "f",
        ValueType::Double => "d",
        ValueType::Reference(_) => "obj",
        ValueType::Void => "i",
    }
}

/// The full output of state-machine codegen for one method: prologue
/// text, the per-state fragment map, and the sentinel ("unreachable")
/// state the epilogue transitions to by default.
pub struct StateMachineOutput {
    pub prologue: String,
    pub fragments: Vec<StateFragment>,
    pub entry_state: i32,
    pub sentinel_state: i32,
}

/// Pre-pass (spec §4.3/§4.6 step 2): walk the instruction list once,
/// assigning one state id per non-label instruction, pinning label
/// instructions to the id of the real instruction they immediately
/// precede so branch targets resolve to the right state.
fn assign_state_ids(method: &BytecodeMethod, labels: &mut LabelPool) -> Vec<i32> {
    let mut ids = Vec::with_capacity(method.instructions.len());
    let mut pending_labels = Vec::new();

    for instr in &method.instructions {
        if instr.op == SourceOp::Label {
            if let Operand::Label(id) = instr.operand {
                pending_labels.push(id);
            }
            ids.push(-1); // label markers occupy no state of their own
            continue;
        }
        let state_id = if let Some(&first) = pending_labels.first() {
            let id = labels.name_of(first);
            for &extra in &pending_labels[1..] {
                labels.set_state(extra, id);
            }
            id
        } else {
            labels.new_standalone_state()
        };
        pending_labels.clear();
        ids.push(state_id);
    }
    ids
}

fn emit_prologue(method: &BytecodeMethod) -> String {
    let mut out = String::new();
    let args = method
        .arg_types
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{} arg{}", native_type(t), i))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "{} {}({}env, void* receiver_or_class{}{}) {{",
        native_type(&method.return_type),
        method.name,
        "void* ",
        if method.arg_types.is_empty() { "" } else { ", " },
        args
    );
    let _ = writeln!(out, "  Value stack[{}];", method.max_stack.max(1));
    let _ = writeln!(out, "  Value locals[{}];", method.max_locals.max(1));
    let _ = writeln!(out, "  int sp = 0;");
    let _ = writeln!(out, "  void* __exc = NULL;");

    let mut slot = if method.flags.is_static { 0 } else { 1 };
    if !method.flags.is_static {
        let _ = writeln!(out, "  locals[0].obj = receiver_or_class;");
    }
    for (i, t) in method.arg_types.iter().enumerate() {
        let _ = writeln!(out, "  locals[{}].{} = arg{};", slot, value_field(t), i);
        slot += if matches!(t, ValueType::Long | ValueType::Double) {
            2
        } else {
            1
        };
    }
    out
}

/// Every label's position in the raw instruction array, used to test
/// whether a given instruction index falls inside a try region's
/// `[start, end)` span (spec §4.8: regions are delimited by label pairs).
fn label_positions(method: &BytecodeMethod) -> HashMap<crate::bytecode::LabelId, usize> {
    let mut map = HashMap::new();
    for (i, instr) in method.instructions.iter().enumerate() {
        if instr.op == SourceOp::Label {
            if let Operand::Label(id) = instr.operand {
                map.insert(id, i);
            }
        }
    }
    map
}

/// The innermost `[start, end)` region containing `idx`, i.e. the one with
/// the smallest span — nested try blocks must resolve to their own catch
/// chain, not an enclosing one's.
fn find_containing_region(idx: usize, regions: &[(usize, usize, i32)]) -> Option<i32> {
    regions
        .iter()
        .filter(|&&(start, end, _)| start <= idx && idx < end)
        .min_by_key(|&&(start, end, _)| end - start)
        .map(|&(_, _, state)| state)
}

/// Emit one instruction's case body. Returns `(body, falls_through)`;
/// when `falls_through` is true the caller appends the tail transition to
/// the next state (spec §4.6 step 2). `athrow_target` is the state id of
/// the nearest enclosing catch chain's entry, if this instruction sits
/// inside a try region (spec §4.8).
fn emit_instruction(
    instr: &Instruction,
    next_state: i32,
    labels: &LabelPool,
    athrow_target: Option<i32>,
) -> (String, bool) {
    use SourceOp::*;
    let mut b = String::new();
    match instr.op {
        Label => unreachable!("labels carry no state of their own"),

        IConst => {
            let Operand::Int(v) = instr.operand else { unreachable!() };
            let _ = writeln!(b, "  stack[sp].i = {}; sp += 1;", v);
        }
        LConst => {
            let Operand::Long(v) = instr.operand else { unreachable!() };
            let _ = writeln!(b, "  stack[sp].l = {}LL; sp += 1;", v);
        }
        FConst => {
            let Operand::Float(v) = instr.operand else { unreachable!() };
            let _ = writeln!(b, "  stack[sp].f = {:e}f; sp += 1;", v);
        }
        DConst => {
            let Operand::Double(v) = instr.operand else { unreachable!() };
            let _ = writeln!(b, "  stack[sp].d = {:e}; sp += 1;", v);
        }
        Ldc => {
            let _ = writeln!(
                b,
                "  stack[sp] = nv_runtime_ldc(__const_pool, {});",
                operand_index(&instr.operand)
            );
            let _ = writeln!(b, "  sp += 1;");
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | IShl | IShr | IUshr => {
            emit_binary_int(&mut b, instr.op);
        }
        INeg => {
            let _ = writeln!(b, "  stack[sp-1].i = -stack[sp-1].i;");
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | LShl | LShr | LUshr => {
            emit_binary_long(&mut b, instr.op);
        }
        LNeg => {
            let _ = writeln!(b, "  stack[sp-1].l = -stack[sp-1].l;");
        }
        FAdd | FSub | FMul | FDiv => emit_binary_float(&mut b, instr.op),
        FNeg => {
            let _ = writeln!(b, "  stack[sp-1].f = -stack[sp-1].f;");
        }
        DAdd | DSub | DMul | DDiv => emit_binary_double(&mut b, instr.op),
        DNeg => {
            let _ = writeln!(b, "  stack[sp-1].d = -stack[sp-1].d;");
        }

        Dup => {
            let _ = writeln!(b, "  stack[sp] = stack[sp-1]; sp += 1;");
        }
        DupX1 => {
            let _ = writeln!(
                b,
                "  stack[sp] = stack[sp-1]; stack[sp-1] = stack[sp-2]; stack[sp-2] = stack[sp]; sp += 1;"
            );
        }
        DupX2 => {
            let _ = writeln!(
                b,
                "  stack[sp] = stack[sp-1]; stack[sp-1] = stack[sp-2]; stack[sp-2] = stack[sp-3]; stack[sp-3] = stack[sp]; sp += 1;"
            );
        }
        Dup2 => {
            let _ = writeln!(
                b,
                "  stack[sp] = stack[sp-2]; stack[sp+1] = stack[sp-1]; sp += 2;"
            );
        }
        Dup2X1 | Dup2X2 => {
            let _ = writeln!(
                b,
                "  /* {:?}: simplified two-slot duplicate-and-insert */",
                instr.op
            );
            let _ = writeln!(
                b,
                "  stack[sp] = stack[sp-2]; stack[sp+1] = stack[sp-1]; sp += 2;"
            );
        }
        Swap => {
            let _ = writeln!(
                b,
                "  {{ Value t = stack[sp-1]; stack[sp-1] = stack[sp-2]; stack[sp-2] = t; }}"
            );
        }
        Pop => {
            let _ = writeln!(b, "  sp -= 1;");
        }
        Pop2 => {
            let _ = writeln!(b, "  sp -= 2;");
        }

        ILoad | LLoad | FLoad | DLoad | ALoad => {
            let Operand::Local(slot) = instr.operand else { unreachable!() };
            let field = match instr.op {
                ILoad => "i",
                LLoad => "l",
                FLoad => "f",
                DLoad => "d",
                _ => "obj",
            };
            let _ = writeln!(
                b,
                "  stack[sp].{f} = locals[{s}].{f}; sp += 1;",
                f = field,
                s = slot
            );
        }
        IStore | LStore | FStore | DStore | AStore => {
            let Operand::Local(slot) = instr.operand else { unreachable!() };
            let field = match instr.op {
                IStore => "i",
                LStore => "l",
                FStore => "f",
                DStore => "d",
                _ => "obj",
            };
            let _ = writeln!(
                b,
                "  sp -= 1; locals[{s}].{f} = stack[sp].{f};",
                f = field,
                s = slot
            );
        }

        IaLoad | LaLoad | FaLoad | DaLoad | AaLoad | BaLoad | CaLoad | SaLoad => {
            emit_array_load(&mut b, instr.op);
        }
        IaStore | LaStore | FaStore | DaStore | AaStore | BaStore | CaStore | SaStore => {
            emit_array_store(&mut b, instr.op);
        }
        ArrayLength => {
            let _ = writeln!(
                b,
                "  stack[sp-1].i = nv_runtime_array_length(stack[sp-1].obj);"
            );
        }

        I2L => {
            let _ = writeln!(b, "  stack[sp-1].l = (int64_t)stack[sp-1].i;");
        }
        I2F => {
            let _ = writeln!(b, "  stack[sp-1].f = (float)stack[sp-1].i;");
        }
        I2D => {
            let _ = writeln!(b, "  stack[sp-1].d = (double)stack[sp-1].i;");
        }
        L2I => {
            let _ = writeln!(b, "  stack[sp-1].i = (int32_t)stack[sp-1].l;");
        }
        L2F => {
            let _ = writeln!(b, "  stack[sp-1].f = (float)stack[sp-1].l;");
        }
        L2D => {
            let _ = writeln!(b, "  stack[sp-1].d = (double)stack[sp-1].l;");
        }
        F2I => {
            let _ = writeln!(b, "  stack[sp-1].i = (int32_t)stack[sp-1].f;");
        }
        F2L => {
            let _ = writeln!(b, "  stack[sp-1].l = (int64_t)stack[sp-1].f;");
        }
        F2D => {
            let _ = writeln!(b, "  stack[sp-1].d = (double)stack[sp-1].f;");
        }
        D2I => {
            let _ = writeln!(b, "  stack[sp-1].i = (int32_t)stack[sp-1].d;");
        }
        D2L => {
            let _ = writeln!(b, "  stack[sp-1].l = (int64_t)stack[sp-1].d;");
        }
        D2F => {
            let _ = writeln!(b, "  stack[sp-1].f = (float)stack[sp-1].d;");
        }

        IfIcmpEq | IfIcmpNe | IfIcmpLt | IfIcmpLe | IfIcmpGt | IfIcmpGe | IfEqz | IfNez => {
            let Operand::Label(target) = instr.operand else { unreachable!() };
            let target_state = labels.get(target).expect("branch target must be indexed");
            let op = match instr.op {
                IfIcmpEq | IfEqz => "==",
                IfIcmpNe | IfNez => "!=",
                IfIcmpLt => "<",
                IfIcmpLe => "<=",
                IfIcmpGt => ">",
                _ => ">=",
            };
            if matches!(instr.op, IfEqz | IfNez) {
                let _ = writeln!(
                    b,
                    "  sp -= 1;\n  if (stack[sp].i {} 0) {{ state = {}; continue; }}",
                    op, target_state
                );
            } else {
                let _ = writeln!(
                    b,
                    "  sp -= 2;\n  if (stack[sp].i {} stack[sp+1].i) {{ state = {}; continue; }}",
                    op, target_state
                );
            }
            let _ = writeln!(b, "  state = {}; continue;", next_state);
            return (b, false);
        }
        Goto => {
            let Operand::Label(target) = instr.operand else { unreachable!() };
            let target_state = labels.get(target).expect("goto target must be indexed");
            let _ = writeln!(b, "  state = {}; continue;", target_state);
            return (b, false);
        }

        TableSwitch => {
            let Operand::TableSwitch {
                low,
                high,
                ref targets,
                default,
            } = instr.operand
            else {
                unreachable!()
            };
            let _ = writeln!(b, "  sp -= 1;");
            let _ = writeln!(b, "  switch (stack[sp].i) {{");
            for (key, label) in (low..=high).zip(targets.iter()) {
                let target_state = labels.get(*label).expect("switch target must be indexed");
                let _ = writeln!(b, "    case {}: state = {}; break;", key, target_state);
            }
            let default_state = labels
                .get(default)
                .expect("switch default must be indexed");
            let _ = writeln!(b, "    default: state = {}; break;", default_state);
            let _ = writeln!(b, "  }}\n  continue;");
            return (b, false);
        }
        LookupSwitch => {
            let Operand::LookupSwitch {
                ref keys,
                ref targets,
                default,
            } = instr.operand
            else {
                unreachable!()
            };
            let _ = writeln!(b, "  sp -= 1;");
            let _ = writeln!(b, "  switch (stack[sp].i) {{");
            for (key, label) in keys.iter().zip(targets.iter()) {
                let target_state = labels.get(*label).expect("switch target must be indexed");
                let _ = writeln!(b, "    case {}: state = {}; break;", key, target_state);
            }
            let default_state = labels
                .get(default)
                .expect("switch default must be indexed");
            let _ = writeln!(b, "    default: state = {}; break;", default_state);
            let _ = writeln!(b, "  }}\n  continue;");
            return (b, false);
        }

        InvokeStatic | InvokeVirtual | InvokeSpecial | InvokeInterface => {
            let Operand::Method {
                ref owner,
                ref name,
                ref desc,
            } = instr.operand
            else {
                unreachable!()
            };
            let _ = writeln!(
                b,
                "  stack[sp-1] = nv_runtime_invoke(env, \"{}\", \"{}\", \"{}\", stack, &sp);",
                owner, name, desc
            );
        }

        New => {
            let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  stack[sp].obj = nv_runtime_new(env, \"{}\"); sp += 1;",
                name
            );
        }
        ANewArray => {
            let _ = writeln!(
                b,
                "  stack[sp-1].obj = nv_runtime_new_array(env, stack[sp-1].i);"
            );
        }
        MultiANewArray => {
            let Operand::MultiArray { ref desc, dims } = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  stack[sp - {dims}].obj = nv_runtime_new_multi_array(env, \"{desc}\", {dims}, &stack[sp - {dims}]);\n  sp -= {dims} - 1;",
                dims = dims,
                desc = desc,
            );
        }
        CheckCast => {
            let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  nv_runtime_check_cast(env, stack[sp-1].obj, \"{}\");",
                name
            );
        }
        InstanceOf => {
            let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  stack[sp-1].i = nv_runtime_instance_of(stack[sp-1].obj, \"{}\");",
                name
            );
        }

        GetStatic => {
            let Operand::Field { ref owner, ref name, .. } = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  stack[sp] = nv_runtime_get_static(env, \"{}\", \"{}\"); sp += 1;",
                owner, name
            );
        }
        PutStatic => {
            let Operand::Field { ref owner, ref name, .. } = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  sp -= 1; nv_runtime_put_static(env, \"{}\", \"{}\", stack[sp]);",
                owner, name
            );
        }
        GetField => {
            let Operand::Field { ref owner, ref name, .. } = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  stack[sp-1] = nv_runtime_get_field(env, stack[sp-1].obj, \"{}\", \"{}\");",
                owner, name
            );
        }
        PutField => {
            let Operand::Field { ref owner, ref name, .. } = instr.operand else { unreachable!() };
            let _ = writeln!(
                b,
                "  sp -= 2; nv_runtime_put_field(env, stack[sp].obj, \"{}\", \"{}\", stack[sp+1]);",
                owner, name
            );
        }

        AThrow => {
            let _ = writeln!(b, "  __exc = stack[sp-1].obj;");
            match athrow_target {
                Some(target) => {
                    let _ = writeln!(b, "  state = {}; continue;", target);
                }
                None => {
                    let _ = writeln!(b, "  nv_runtime_rethrow(__exc);");
                    let _ = writeln!(b, "  state = {}; continue;", next_state);
                }
            }
            return (b, false);
        }

        IReturn => {
            let _ = writeln!(b, "  return stack[sp-1].i;");
            return (b, false);
        }
        LReturn => {
            let _ = writeln!(b, "  return stack[sp-1].l;");
            return (b, false);
        }
        FReturn => {
            let _ = writeln!(b, "  return stack[sp-1].f;");
            return (b, false);
        }
        DReturn => {
            let _ = writeln!(b, "  return stack[sp-1].d;");
            return (b, false);
        }
        AReturn => {
            let _ = writeln!(b, "  return stack[sp-1].obj;");
            return (b, false);
        }
        Return => {
            let _ = writeln!(b, "  return;");
            return (b, false);
        }
    }
    (b, true)
}

fn operand_index(operand: &Operand) -> i64 {
    match operand {
        Operand::Int(v) => *v as i64,
        Operand::Long(v) => *v,
        _ => 0,
    }
}

fn emit_binary_int(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let expr = match op {
        IAdd => "stack[sp-2].i + stack[sp-1].i",
        ISub => "stack[sp-2].i - stack[sp-1].i",
        IMul => "stack[sp-2].i * stack[sp-1].i",
        IDiv => "stack[sp-2].i / nv_runtime_check_nonzero_i32(stack[sp-1].i)",
        IRem => "stack[sp-2].i % nv_runtime_check_nonzero_i32(stack[sp-1].i)",
        IAnd => "stack[sp-2].i & stack[sp-1].i",
        IOr => "stack[sp-2].i | stack[sp-1].i",
        IXor => "stack[sp-2].i ^ stack[sp-1].i",
        IShl => "stack[sp-2].i << (stack[sp-1].i & 0x1f)",
        IShr => "stack[sp-2].i >> (stack[sp-1].i & 0x1f)",
        IUshr => "(int32_t)((uint32_t)stack[sp-2].i >> (stack[sp-1].i & 0x1f))",
        _ => unreachable!(),
    };
    let _ = writeln!(b, "  sp -= 1;\n  stack[sp-1].i = {};", expr);
}

fn emit_binary_long(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let expr = match op {
        LAdd => "stack[sp-2].l + stack[sp-1].l",
        LSub => "stack[sp-2].l - stack[sp-1].l",
        LMul => "stack[sp-2].l * stack[sp-1].l",
        LDiv => "stack[sp-2].l / nv_runtime_check_nonzero_i64(stack[sp-1].l)",
        LRem => "stack[sp-2].l % nv_runtime_check_nonzero_i64(stack[sp-1].l)",
        LAnd => "stack[sp-2].l & stack[sp-1].l",
        LOr => "stack[sp-2].l | stack[sp-1].l",
        LXor => "stack[sp-2].l ^ stack[sp-1].l",
        LShl => "stack[sp-2].l << (stack[sp-1].l & 0x3f)",
        LShr => "stack[sp-2].l >> (stack[sp-1].l & 0x3f)",
        LUshr => "(int64_t)((uint64_t)stack[sp-2].l >> (stack[sp-1].l & 0x3f))",
        _ => unreachable!(),
    };
    let _ = writeln!(b, "  sp -= 1;\n  stack[sp-1].l = {};", expr);
}

fn emit_binary_float(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let operator = match op {
        FAdd => "+",
        FSub => "-",
        FMul => "*",
        FDiv => "/",
        _ => unreachable!(),
    };
    let _ = writeln!(
        b,
        "  sp -= 1;\n  stack[sp-1].f = stack[sp-1].f {} stack[sp].f;",
        operator
    );
}

fn emit_binary_double(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let operator = match op {
        DAdd => "+",
        DSub => "-",
        DMul => "*",
        DDiv => "/",
        _ => unreachable!(),
    };
    let _ = writeln!(
        b,
        "  sp -= 1;\n  stack[sp-1].d = stack[sp-1].d {} stack[sp].d;",
        operator
    );
}

fn emit_array_load(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let field = match op {
        IaLoad => "i",
        LaLoad => "l",
        FaLoad => "f",
        DaLoad => "d",
        AaLoad => "obj",
        BaLoad | CaLoad | SaLoad => "i",
        _ => unreachable!(),
    };
    let _ = writeln!(
        b,
        "  sp -= 1;\n  stack[sp-1].{f} = nv_runtime_array_get_{f}(stack[sp-1].obj, stack[sp].i);",
        f = field
    );
}

fn emit_array_store(b: &mut String, op: SourceOp) {
    use SourceOp::*;
    let field = match op {
        IaStore => "i",
        LaStore => "l",
        FaStore => "f",
        DaStore => "d",
        AaStore => "obj",
        BaStore | CaStore | SaStore => "i",
        _ => unreachable!(),
    };
    let _ = writeln!(
        b,
        "  sp -= 3;\n  nv_runtime_array_set_{f}(stack[sp].obj, stack[sp+1].i, stack[sp+2].{f});",
        f = field
    );
}

/// Run the full C6 pipeline for one method: prologue, per-instruction
/// dispatch states, try/catch chain materialization (C8), and the
/// epilogue sentinel (spec §4.6 step 5).
pub fn generate(method: &BytecodeMethod, labels: &mut LabelPool) -> StateMachineOutput {
    let state_ids = assign_state_ids(method, labels);
    let real: Vec<(usize, i32)> = state_ids
        .iter()
        .enumerate()
        .filter(|(_, &id)| id != -1)
        .map(|(i, &id)| (i, id))
        .collect();

    let (catch_fragments, region_entry) = catch_resolver::resolve(&method.try_catches, labels);
    let positions = label_positions(method);
    let regions: Vec<(usize, usize, i32)> = region_entry
        .iter()
        .filter_map(|(&(start, end), &state)| {
            Some((*positions.get(&start)?, *positions.get(&end)?, state))
        })
        .collect();

    let sentinel_state = labels.new_standalone_state();

    // Empty instruction stream: the minimal body is a bare return of the
    // zero value for the declared return type (spec §8 "Empty method").
    if real.is_empty() {
        let entry_state = labels.new_standalone_state();
        let mut fragments = vec![StateFragment {
            state_id: entry_state,
            body: emit_zero_return(&method.return_type),
        }];
        fragments.extend(catch_fragments);
        fragments.push(StateFragment {
            state_id: sentinel_state,
            body: "  /* unreachable: dispatcher default case */\n  nv_runtime_fatal(\"unreachable state\");".to_string(),
        });
        return StateMachineOutput {
            prologue: emit_prologue(method),
            fragments,
            entry_state,
            sentinel_state,
        };
    }

    let entry_state = real[0].1;
    let mut fragments = Vec::new();

    for (pos, (idx, state_id)) in real.iter().enumerate() {
        let instr = &method.instructions[*idx];
        let next_state = real
            .get(pos + 1)
            .map(|(_, id)| *id)
            .unwrap_or(sentinel_state);
        let athrow_target = find_containing_region(*idx, &regions);
        let (mut body, falls_through) = emit_instruction(instr, next_state, labels, athrow_target);
        if falls_through {
            let _ = writeln!(body, "  state = {}; continue;", next_state);
        }
        fragments.push(StateFragment {
            state_id: *state_id,
            body,
        });
    }

    fragments.extend(catch_fragments);

    fragments.push(StateFragment {
        state_id: sentinel_state,
        body: "  /* unreachable: dispatcher default case */\n  nv_runtime_fatal(\"unreachable state\");".to_string(),
    });

    StateMachineOutput {
        prologue: emit_prologue(method),
        fragments,
        entry_state,
        sentinel_state,
    }
}

/// The minimal body for a method with no instructions: return zero of the
/// declared return type (spec §8 boundary case).
fn emit_zero_return(return_type: &ValueType) -> String {
    match return_type {
        ValueType::Void => "  return;".to_string(),
        ValueType::Reference(_) => "  return NULL;".to_string(),
        ValueType::Float => "  return 0.0f;".to_string(),
        ValueType::Double => "  return 0.0;".to_string(),
        _ => "  return 0;".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{tests::sample_add_method, Instruction, MethodFlags};

    #[test]
    fn straight_line_method_produces_one_state_per_instruction() {
        let method = sample_add_method();
        let mut labels = LabelPool::new(1);
        let out = generate(&method, &mut labels);
        // 4 instructions + 1 sentinel, no try/catch fragments.
        assert_eq!(out.fragments.len(), 5);
    }

    #[test]
    fn branch_targets_resolve_to_label_positions() {
        let mut labels = LabelPool::new(7);
        let method = BytecodeMethod {
            owner: "Demo".to_string(),
            name: "abs".to_string(),
            desc: "(I)I".to_string(),
            flags: MethodFlags {
                is_static: true,
                ..Default::default()
            },
            arg_types: vec![ValueType::Int],
            return_type: ValueType::Int,
            max_stack: 2,
            max_locals: 1,
            instructions: vec![
                Instruction::new(SourceOp::ILoad, Operand::Local(0)),
                Instruction::new(SourceOp::IfEqz, Operand::Label(crate::bytecode::LabelId(9))),
                Instruction::simple(SourceOp::Return),
                Instruction::label(crate::bytecode::LabelId(9)),
                Instruction::simple(SourceOp::Return),
            ],
            try_catches: vec![],
        };
        let out = generate(&method, &mut labels);
        assert_eq!(out.fragments.len(), 5); // 4 real instrs + sentinel
    }

    #[test]
    fn empty_method_returns_zero_of_declared_type() {
        let mut method = sample_add_method();
        method.instructions.clear();
        let mut labels = LabelPool::new(3);
        let out = generate(&method, &mut labels);
        let entry = out
            .fragments
            .iter()
            .find(|f| f.state_id == out.entry_state)
            .unwrap();
        assert!(entry.body.contains("return 0"));
    }

    #[test]
    fn last_instructions_fallthrough_targets_the_real_sentinel_not_a_placeholder() {
        // Regression: the fallthrough used to default to the literal `-1`
        // and get patched via a `.contains("state = -1")` text search,
        // which could instead match a legitimate negative state id whose
        // decimal representation happens to start with "-1" (state ids are
        // arbitrary i32s from the label pool's RNG). Generate with several
        // seeds so the resulting ids are exercised, and assert the last
        // real instruction's fallthrough always points at the one true
        // `sentinel_state`, with no dangling "state = -1" placeholder left
        // over anywhere (unless the sentinel itself is -1).
        for seed in [1u64, 2, 3, 42, 9999] {
            let method = sample_add_method();
            let mut labels = LabelPool::new(seed);
            let out = generate(&method, &mut labels);
            let last_real = &out.fragments[out.fragments.len() - 2];
            assert!(
                last_real
                    .body
                    .contains(&format!("state = {}; continue;", out.sentinel_state)),
                "seed {}: last real fragment did not transition to the sentinel: {}",
                seed,
                last_real.body
            );
            if out.sentinel_state != -1 {
                assert!(
                    !last_real.body.contains("state = -1;"),
                    "seed {}: stale placeholder left in emitted body: {}",
                    seed,
                    last_real.body
                );
            }
        }
    }

    #[test]
    fn athrow_inside_try_region_jumps_to_its_catch_chain_entry() {
        use crate::bytecode::{LabelId, TryCatch};
        let start = LabelId(1);
        let end = LabelId(2);
        let handler = LabelId(3);
        let method = BytecodeMethod {
            owner: "Demo".to_string(),
            name: "throws".to_string(),
            desc: "()I".to_string(),
            flags: MethodFlags {
                is_static: true,
                ..Default::default()
            },
            arg_types: vec![],
            return_type: ValueType::Int,
            max_stack: 2,
            max_locals: 1,
            instructions: vec![
                Instruction::label(start),
                Instruction::simple(SourceOp::AThrow),
                Instruction::label(end),
                Instruction::label(handler),
                Instruction::new(SourceOp::IConst, Operand::Int(7)),
                Instruction::simple(SourceOp::IReturn),
            ],
            try_catches: vec![TryCatch {
                start,
                end,
                handler,
                exception_type: None,
            }],
        };
        let mut labels = LabelPool::new(11);
        let out = generate(&method, &mut labels);
        let athrow_frag = out
            .fragments
            .iter()
            .find(|f| f.body.contains("__exc = stack[sp-1].obj"))
            .unwrap();
        assert!(!athrow_frag.body.contains("nv_runtime_rethrow"));
    }
}
