//! VM Translator (C5, spec §4.5): converts a bytecode method's instruction
//! sequence into the parallel micro-VM instruction sequence, when the
//! method is eligible, producing the reference tables, constant pool, and
//! switch descriptors alongside it.

use std::collections::HashMap;

use nv_core::bits::{f32_to_slot, f64_to_slot};
use nv_core::isa::MicroVmInstr;
use nv_core::isa::MicroVmOp;
use nv_core::tables::{
    ConstantEntry, FieldRef, LookupSwitchDescriptor, MethodRef, MultiArrayInfo, ReferenceTables,
    TableSwitchDescriptor,
};

use crate::bytecode::{BytecodeMethod, ClassShape, Instruction, LabelId, Operand, SourceOp};
use crate::error::CompileError;

/// Objects allocated by `NEW` are not modeled with real field layouts in
/// this core (no class-file parser is in scope); every object gets this
/// many generic slots. `GETFIELD`/`PUTFIELD` operand indices are expected
/// to stay within this bound for any fixture exercised here.
const DEFAULT_OBJECT_SIZE: i64 = 8;

/// How many micro-VM instructions one source instruction lowers to. Only
/// `Return` (void) and the unary `IfEqz`/`IfNez` forms expand to more than
/// one, since the VM has no unary-compare or bare-`HALT`-with-no-value
/// form (spec §4.5: branches are `IF_ICMP*`/`GOTO` only).
fn vm_instruction_count(op: SourceOp) -> usize {
    match op {
        SourceOp::Label => 0,
        SourceOp::Return | SourceOp::IfEqz | SourceOp::IfNez => 2,
        _ => 1,
    }
}

/// Pass 1: compute each label's target VM-instruction index without
/// emitting anything, so forward branches resolve correctly (spec §4.5:
/// "jump operands are resolved to VM-instruction indices using a per-method
/// label map computed during the same walk").
fn index_labels(instructions: &[Instruction]) -> HashMap<LabelId, usize> {
    let mut map = HashMap::new();
    let mut index = 0usize;
    for instr in instructions {
        if instr.op == SourceOp::Label {
            if let Operand::Label(id) = instr.operand {
                map.insert(id, index);
            }
        } else {
            index += vm_instruction_count(instr.op);
        }
    }
    map
}

struct Translator<'a> {
    labels: &'a HashMap<LabelId, usize>,
    tables: ReferenceTables,
    code: Vec<MicroVmInstr>,
    /// String literals seen during translation, in first-seen order. The
    /// orchestrator (C9) resolves these to masked string-pool handles once
    /// per class and rewrites the matching `ConstantEntry::String` index
    /// (spec §4.2: string handles are assigned when the pool is flushed,
    /// not at the point of use).
    strings: Vec<String>,
}

impl<'a> Translator<'a> {
    fn resolve(&self, label: LabelId) -> Result<usize, CompileError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(CompileError::LabelNotFound(crate::error::LabelRef(
                label.0,
            )))
    }

    fn push(&mut self, op: MicroVmOp, operand: i64) {
        self.code.push(MicroVmInstr::new(op, operand));
    }

    fn intern_constant(&mut self, entry: ConstantEntry) -> i64 {
        self.tables.constants.push(entry);
        (self.tables.constants.len() - 1) as i64
    }

    fn intern_class(&mut self, name: &str) -> i64 {
        if let Some(pos) = self.tables.classes.iter().position(|c| c == name) {
            return pos as i64;
        }
        self.tables.classes.push(name.to_string());
        (self.tables.classes.len() - 1) as i64
    }

    fn intern_field(&mut self, f: FieldRef) -> i64 {
        self.tables.fields.push(f);
        (self.tables.fields.len() - 1) as i64
    }

    fn intern_method(&mut self, m: MethodRef) -> i64 {
        self.tables.methods.push(m);
        (self.tables.methods.len() - 1) as i64
    }

    fn emit(&mut self, instr: &Instruction, permissive: bool) -> Result<(), CompileError> {
        use SourceOp::*;
        match instr.op {
            Label => {}

            IConst => {
                let Operand::Int(v) = instr.operand else { unreachable!() };
                self.push(MicroVmOp::PushInt, v as i64);
            }
            LConst => {
                let Operand::Long(v) = instr.operand else { unreachable!() };
                self.push(MicroVmOp::PushLong, v);
            }
            FConst => {
                let Operand::Float(v) = instr.operand else { unreachable!() };
                self.push(MicroVmOp::PushFloat, f32_to_slot(v));
            }
            DConst => {
                let Operand::Double(v) = instr.operand else { unreachable!() };
                self.push(MicroVmOp::PushDouble, f64_to_slot(v));
            }
            Ldc => {
                let entry = match &instr.operand {
                    Operand::Int(v) => ConstantEntry::Integer(*v),
                    Operand::Long(v) => ConstantEntry::Long(*v),
                    Operand::Float(v) => ConstantEntry::Float(*v),
                    Operand::Double(v) => ConstantEntry::Double(*v),
                    Operand::StringConst(text) => {
                        let idx = self.strings.len() as u64;
                        self.strings.push(text.clone());
                        ConstantEntry::String(idx)
                    }
                    Operand::ClassConst(name) => {
                        ConstantEntry::Class(self.intern_class(name) as u32)
                    }
                    _ => unreachable!("LDC operand shape"),
                };
                let idx = self.intern_constant(entry);
                self.push(MicroVmOp::Ldc, idx);
            }

            IAdd => self.push(MicroVmOp::IAdd, 0),
            ISub => self.push(MicroVmOp::ISub, 0),
            IMul => self.push(MicroVmOp::IMul, 0),
            IDiv => self.push(MicroVmOp::IDiv, 0),
            IRem => self.push(MicroVmOp::IRem, 0),
            INeg => self.push(MicroVmOp::INeg, 0),
            IAnd => self.push(MicroVmOp::IAnd, 0),
            IOr => self.push(MicroVmOp::IOr, 0),
            IXor => self.push(MicroVmOp::IXor, 0),
            IShl => self.push(MicroVmOp::IShl, 0),
            IShr => self.push(MicroVmOp::IShr, 0),
            IUshr => self.push(MicroVmOp::IUshr, 0),

            LAdd => self.push(MicroVmOp::LAdd, 0),
            LSub => self.push(MicroVmOp::LSub, 0),
            LMul => self.push(MicroVmOp::LMul, 0),
            LDiv => self.push(MicroVmOp::LDiv, 0),
            LRem => self.push(MicroVmOp::LRem, 0),
            LNeg => self.push(MicroVmOp::LNeg, 0),
            LAnd => self.push(MicroVmOp::LAnd, 0),
            LOr => self.push(MicroVmOp::LOr, 0),
            LXor => self.push(MicroVmOp::LXor, 0),
            LShl => self.push(MicroVmOp::LShl, 0),
            LShr => self.push(MicroVmOp::LShr, 0),
            LUshr => self.push(MicroVmOp::LUshr, 0),

            FAdd => self.push(MicroVmOp::FAdd, 0),
            FSub => self.push(MicroVmOp::FSub, 0),
            FMul => self.push(MicroVmOp::FMul, 0),
            FDiv => self.push(MicroVmOp::FDiv, 0),
            FNeg => self.push(MicroVmOp::FNeg, 0),
            DAdd => self.push(MicroVmOp::DAdd, 0),
            DSub => self.push(MicroVmOp::DSub, 0),
            DMul => self.push(MicroVmOp::DMul, 0),
            DDiv => self.push(MicroVmOp::DDiv, 0),
            DNeg => self.push(MicroVmOp::DNeg, 0),

            Dup => self.push(MicroVmOp::Dup, 0),
            DupX1 => self.push(MicroVmOp::DupX1, 0),
            DupX2 => self.push(MicroVmOp::DupX2, 0),
            Dup2 => self.push(MicroVmOp::Dup2, 0),
            Dup2X1 => self.push(MicroVmOp::Dup2X1, 0),
            Dup2X2 => self.push(MicroVmOp::Dup2X2, 0),
            Swap => self.push(MicroVmOp::Swap, 0),
            Pop => self.push(MicroVmOp::Pop, 0),
            Pop2 => self.push(MicroVmOp::Pop2, 0),

            ILoad | LLoad | FLoad | DLoad | ALoad => {
                let Operand::Local(slot) = instr.operand else { unreachable!() };
                let op = match instr.op {
                    ILoad => MicroVmOp::ILoad,
                    LLoad => MicroVmOp::LLoad,
                    FLoad => MicroVmOp::FLoad,
                    DLoad => MicroVmOp::DLoad,
                    _ => MicroVmOp::ALoad,
                };
                self.push(op, slot as i64);
            }
            IStore | LStore | FStore | DStore | AStore => {
                let Operand::Local(slot) = instr.operand else { unreachable!() };
                let op = match instr.op {
                    IStore => MicroVmOp::IStore,
                    LStore => MicroVmOp::LStore,
                    FStore => MicroVmOp::FStore,
                    DStore => MicroVmOp::DStore,
                    _ => MicroVmOp::AStore,
                };
                self.push(op, slot as i64);
            }

            IaLoad => self.push(MicroVmOp::IaLoad, 0),
            LaLoad => self.push(MicroVmOp::LaLoad, 0),
            FaLoad => self.push(MicroVmOp::FaLoad, 0),
            DaLoad => self.push(MicroVmOp::DaLoad, 0),
            AaLoad => self.push(MicroVmOp::AaLoad, 0),
            BaLoad => self.push(MicroVmOp::BaLoad, 0),
            CaLoad => self.push(MicroVmOp::CaLoad, 0),
            SaLoad => self.push(MicroVmOp::SaLoad, 0),
            IaStore => self.push(MicroVmOp::IaStore, 0),
            LaStore => self.push(MicroVmOp::LaStore, 0),
            FaStore => self.push(MicroVmOp::FaStore, 0),
            DaStore => self.push(MicroVmOp::DaStore, 0),
            AaStore => self.push(MicroVmOp::AaStore, 0),
            BaStore => self.push(MicroVmOp::BaStore, 0),
            CaStore => self.push(MicroVmOp::CaStore, 0),
            SaStore => self.push(MicroVmOp::SaStore, 0),
            ArrayLength => self.push(MicroVmOp::ArrayLength, 0),

            I2L => self.push(MicroVmOp::I2L, 0),
            I2F => self.push(MicroVmOp::I2F, 0),
            I2D => self.push(MicroVmOp::I2D, 0),
            L2I => self.push(MicroVmOp::L2I, 0),
            L2F => self.push(MicroVmOp::L2F, 0),
            L2D => self.push(MicroVmOp::L2D, 0),
            F2I => self.push(MicroVmOp::F2I, 0),
            F2L => self.push(MicroVmOp::F2L, 0),
            F2D => self.push(MicroVmOp::F2D, 0),
            D2I => self.push(MicroVmOp::D2I, 0),
            D2L => self.push(MicroVmOp::D2L, 0),
            D2F => self.push(MicroVmOp::D2F, 0),

            IfIcmpEq | IfIcmpNe | IfIcmpLt | IfIcmpLe | IfIcmpGt | IfIcmpGe => {
                let Operand::Label(target) = instr.operand else { unreachable!() };
                let target = self.resolve(target)?;
                let op = match instr.op {
                    IfIcmpEq => MicroVmOp::IfIcmpEq,
                    IfIcmpNe => MicroVmOp::IfIcmpNe,
                    IfIcmpLt => MicroVmOp::IfIcmpLt,
                    IfIcmpLe => MicroVmOp::IfIcmpLe,
                    IfIcmpGt => MicroVmOp::IfIcmpGt,
                    _ => MicroVmOp::IfIcmpGe,
                };
                self.push(op, target as i64);
            }
            IfEqz | IfNez => {
                let Operand::Label(target) = instr.operand else { unreachable!() };
                let target = self.resolve(target)?;
                self.push(MicroVmOp::PushInt, 0);
                let op = if instr.op == IfEqz {
                    MicroVmOp::IfIcmpEq
                } else {
                    MicroVmOp::IfIcmpNe
                };
                self.push(op, target as i64);
            }
            Goto => {
                let Operand::Label(target) = instr.operand else { unreachable!() };
                let target = self.resolve(target)?;
                self.push(MicroVmOp::Goto, target as i64);
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
                let mut resolved = Vec::with_capacity(targets.len());
                for t in targets {
                    resolved.push(self.resolve(*t)?);
                }
                let default_target = self.resolve(default)?;
                self.tables.table_switches.push(TableSwitchDescriptor {
                    low,
                    high,
                    targets: resolved,
                    default_target,
                });
                let idx = (self.tables.table_switches.len() - 1) as i64;
                self.push(MicroVmOp::TableSwitch, idx);
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
                let mut resolved = Vec::with_capacity(targets.len());
                for t in targets {
                    resolved.push(self.resolve(*t)?);
                }
                let default_target = self.resolve(default)?;
                self.tables.lookup_switches.push(LookupSwitchDescriptor {
                    keys: keys.clone(),
                    targets: resolved,
                    default_target,
                });
                let idx = (self.tables.lookup_switches.len() - 1) as i64;
                self.push(MicroVmOp::LookupSwitch, idx);
            }

            InvokeStatic if permissive => {
                let Operand::Method {
                    ref owner,
                    ref name,
                    ref desc,
                } = instr.operand
                else {
                    unreachable!()
                };
                let idx = self.intern_method(MethodRef {
                    owner: owner.clone(),
                    name: name.clone(),
                    desc: desc.clone(),
                });
                self.push(MicroVmOp::InvokeStatic, idx);
            }
            InvokeStatic | InvokeVirtual | InvokeSpecial | InvokeInterface => {
                return Err(CompileError::VmTranslationRejected(format!(
                    "{:?} opcode present",
                    instr.op
                )));
            }

            New => {
                let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
                self.intern_class(name);
                self.push(MicroVmOp::New, DEFAULT_OBJECT_SIZE);
            }
            ANewArray => self.push(MicroVmOp::ANewArray, 0),
            MultiANewArray => {
                let Operand::MultiArray { ref desc, dims } = instr.operand else { unreachable!() };
                self.tables.multi_arrays.push(MultiArrayInfo {
                    desc: desc.clone(),
                    dims,
                });
                let idx = (self.tables.multi_arrays.len() - 1) as i64;
                self.push(MicroVmOp::MultiANewArray, idx);
            }
            CheckCast => {
                let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
                let idx = self.intern_class(name);
                self.push(MicroVmOp::CheckCast, idx);
            }
            InstanceOf => {
                let Operand::ClassConst(ref name) = instr.operand else { unreachable!() };
                let idx = self.intern_class(name);
                self.push(MicroVmOp::InstanceOf, idx);
            }

            GetStatic | PutStatic | GetField | PutField => {
                let Operand::Field {
                    ref owner,
                    ref name,
                    ref desc,
                } = instr.operand
                else {
                    unreachable!()
                };
                let idx = self.intern_field(FieldRef {
                    owner: owner.clone(),
                    name: name.clone(),
                    desc: desc.clone(),
                });
                let op = match instr.op {
                    GetStatic => MicroVmOp::GetStatic,
                    PutStatic => MicroVmOp::PutStatic,
                    GetField => MicroVmOp::GetField,
                    _ => MicroVmOp::PutField,
                };
                self.push(op, idx);
            }

            AThrow => self.push(MicroVmOp::AThrow, 0),

            IReturn | LReturn | FReturn | DReturn | AReturn => {
                self.push(MicroVmOp::Halt, 0);
            }
            Return => {
                self.push(MicroVmOp::PushInt, 0);
                self.push(MicroVmOp::Halt, 0);
            }
        }
        Ok(())
    }
}

/// Translate `method` to a micro-VM program. Rejects per spec §3's
/// eligibility invariant: any invoke opcode (unless the permissive switch
/// lets `INVOKESTATIC` through), any abstract/interface method shape, or an
/// empty instruction stream (spec glossary: "Eligibility filter").
/// The result of translating one method: VM code, the reference tables,
/// and the raw string literals encountered (still unmasked — the
/// orchestrator interns them into the archive-wide string pool).
pub struct VmTranslation {
    pub code: Vec<MicroVmInstr>,
    pub tables: ReferenceTables,
    pub strings: Vec<String>,
}

pub fn translate_to_vm(
    method: &BytecodeMethod,
    class_shape: &ClassShape,
    permissive_vm_eligibility: bool,
) -> Result<VmTranslation, CompileError> {
    if method.flags.is_abstract {
        return Err(CompileError::VmTranslationRejected(
            "abstract methods have no body to translate".to_string(),
        ));
    }
    if class_shape.is_interface {
        return Err(CompileError::VmTranslationRejected(
            "interface methods have no body to translate".to_string(),
        ));
    }
    if method.instructions.is_empty() {
        return Err(CompileError::VmTranslationRejected(
            "empty instruction stream".to_string(),
        ));
    }
    if !method.try_catches.is_empty() {
        // The VM translator never lowers `try_catches` into
        // `TryStart`/`CatchHandler` micro-VM instructions — only the
        // state-machine path's catch resolver (C8) models exception
        // regions. Letting a method with handlers through here would
        // produce a VM program that silently drops them.
        return Err(CompileError::VmTranslationRejected(
            "method has exception handlers; only the state-machine path resolves try/catch"
                .to_string(),
        ));
    }

    let labels = index_labels(&method.instructions);
    let mut translator = Translator {
        labels: &labels,
        tables: ReferenceTables::default(),
        code: Vec::new(),
        strings: Vec::new(),
    };

    for instr in &method.instructions {
        translator.emit(instr, permissive_vm_eligibility)?;
    }

    Ok(VmTranslation {
        code: translator.code,
        tables: translator.tables,
        strings: translator.strings,
    })
}
