//! Method Compiler / Orchestrator (C9, spec §4.9): the per-method driver.
//! Selects the special processor, tries VM translation, falls back to
//! state-machine codegen, and assembles the final source fragment.

use nv_core::isa::MicroVmInstr;
use nv_core::tables::{ConstantEntry, ReferenceTables};
use nv_runtime::StringPool;
use nv_runtime::microvm::encode_program;

use crate::bytecode::{BytecodeMethod, ClassShape};
use crate::config::CompilerConfig;

use super::{flattener, state_machine, vm_translator};
use crate::pools::{LabelPool, NameKind, NamePool};

/// One method's compiled output: the native source fragment plus which
/// path produced it, surfaced for the compilation report (spec §4's
/// ambient diagnostics).
pub struct CompiledMethod {
    pub source: String,
    pub used_vm_path: bool,
}

/// Compile one method, or return `None` when the skip policy applies
/// (spec §4.9 step 1, §3 invariant: enum-declaring classes and
/// switch-map holders are never native-redirected; `<init>` is never
/// compiled).
///
/// `name_pool` and `string_pool` are the archive-wide C1/C2 pools (see
/// [`super::super::class::ClassCompiler`]): every method of a class shares
/// the same two pools, so identical literals across methods dedup to the
/// same id regardless of compilation order.
///
/// # Panics
/// Panics if `method` is a constructor that somehow reached this call —
/// callers must filter those out upstream (spec §7 "unsupported method
/// shape": a constructor queued for native redirection is a fatal
/// invariant violation, not a recoverable error).
pub fn compile_method(
    method: &BytecodeMethod,
    class_shape: &ClassShape,
    config: &CompilerConfig,
    name_pool: &mut NamePool,
    string_pool: &mut StringPool,
) -> Option<CompiledMethod> {
    if class_shape.skips_native_redirection() {
        return None;
    }
    if method.is_constructor() {
        panic!(
            "constructor {} was queued for native redirection; constructors are never compiled",
            method.identity()
        );
    }
    if method.is_class_initializer() {
        return Some(compile_class_initializer(
            method,
            class_shape,
            config,
            name_pool,
            string_pool,
        ));
    }

    Some(compile_body(method, class_shape, config, name_pool, string_pool))
}

/// Compile one method's translated body — VM path when eligible, else the
/// state-machine path — under whatever name `method.name` already carries.
/// Shared by ordinary methods and, with a renamed clone, by the `<clinit>`
/// hidden proxy (spec §4.9 step 2).
fn compile_body(
    method: &BytecodeMethod,
    class_shape: &ClassShape,
    config: &CompilerConfig,
    name_pool: &mut NamePool,
    string_pool: &mut StringPool,
) -> CompiledMethod {
    let method_seed = config.master_seed.derive_method_seed(&method.identity());

    if config.virtualize {
        if let Ok(translation) =
            vm_translator::translate_to_vm(method, class_shape, config.permissive_vm_eligibility)
        {
            return emit_vm_method(method, translation, method_seed, name_pool, string_pool);
        }
    }

    let mut labels = LabelPool::new(method_seed);
    let sm = state_machine::generate(method, &mut labels);
    let obfuscation = if config.flatten_control_flow {
        Some(config.master_seed.derive_state_obfuscation(&method.identity()))
    } else {
        None
    };
    let body = if let Some((a, b)) = obfuscation {
        flattener::emit_flattened(&sm.fragments, sm.entry_state, sm.sentinel_state, Some((a, b)))
    } else {
        flattener::emit_linear(&sm.fragments, sm.entry_state)
    };

    let mut source = sm.prologue;
    source.push_str(&body);
    source.push_str("}\n");

    CompiledMethod {
        source,
        used_vm_path: false,
    }
}

/// `<clinit>` gets a dedicated processor (spec §4.9 step 2): the original
/// class initializer's own instructions are translated, under a renamed
/// hidden-proxy identity, through the exact same VM/state-machine pipeline
/// as any other method; the original `<clinit>` is then rewritten to
/// register natives and invoke that proxy instead of running its own body.
fn compile_class_initializer(
    method: &BytecodeMethod,
    class_shape: &ClassShape,
    config: &CompilerConfig,
    name_pool: &mut NamePool,
    string_pool: &mut StringPool,
) -> CompiledMethod {
    let clinit_name = method.name.replace('<', "_").replace('>', "_");
    let proxy_name = format!("{}__hidden_proxy", clinit_name);

    let mut proxy_method = method.clone();
    proxy_method.name = proxy_name.clone();
    let proxy = compile_body(&proxy_method, class_shape, config, name_pool, string_pool);

    let stub = format!(
        "void {name}(void* env, void* declaring_class) {{\n  registerNativesForClass(__class_index, declaring_class);\n  {proxy_name}(env, declaring_class);\n  return;\n}}\n",
        name = clinit_name,
        proxy_name = proxy_name,
    );

    let mut source = proxy.source;
    source.push_str(&stub);

    CompiledMethod {
        source,
        used_vm_path: proxy.used_vm_path,
    }
}

/// Resolve a translated method's reference tables against the archive-wide
/// pools: string constants become real masked string-pool handles (spec
/// §4.2 "handles are assigned when the pool is flushed, not at the point
/// of use"), and each class/field/method name gets an array-indexed
/// accessor token from the name pool (spec §4.1). The per-method dense
/// indices the micro-VM operands already carry (positions into
/// `tables.classes`/`fields`/`methods`) are left untouched — only the
/// *text* backing each table row is resolved to its pool-wide identity.
fn resolve_into_pools(
    tables: &mut ReferenceTables,
    strings: &[String],
    name_pool: &mut NamePool,
    string_pool: &mut StringPool,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    for entry in tables.constants.iter_mut() {
        if let ConstantEntry::String(idx) = entry {
            let handle = string_pool.intern(&strings[*idx as usize]);
            *idx = handle;
        }
    }

    let class_tokens: Vec<String> = tables
        .classes
        .iter()
        .map(|name| {
            let id = name_pool.intern(NameKind::ClassInternalName, name);
            name_pool.token(NameKind::ClassInternalName, id)
        })
        .collect();
    let field_tokens: Vec<String> = tables
        .fields
        .iter()
        .map(|f| {
            let key = format!("{}.{}:{}", f.owner, f.name, f.desc);
            let id = name_pool.intern(NameKind::FieldRef, &key);
            name_pool.token(NameKind::FieldRef, id)
        })
        .collect();
    let method_tokens: Vec<String> = tables
        .methods
        .iter()
        .map(|m| {
            let key = format!("{}.{}{}", m.owner, m.name, m.desc);
            let id = name_pool.intern(NameKind::MethodRef, &key);
            name_pool.token(NameKind::MethodRef, id)
        })
        .collect();

    (class_tokens, field_tokens, method_tokens)
}

fn emit_vm_method(
    method: &BytecodeMethod,
    mut translation: vm_translator::VmTranslation,
    seed: u64,
    name_pool: &mut NamePool,
    string_pool: &mut StringPool,
) -> CompiledMethod {
    let mut code: Vec<MicroVmInstr> = translation.code;
    // Performed once, by the compiler itself: the literal embedded below
    // is already ciphertext, so the generated source never carries plain
    // opcodes (spec §4.9 step 4's "encrypted instruction array literal").
    encode_program(&mut code, seed);

    let (class_tokens, field_tokens, method_tokens) = resolve_into_pools(
        &mut translation.tables,
        &translation.strings,
        name_pool,
        string_pool,
    );

    let mut source = String::new();
    source.push_str(&format!(
        "/* {} — micro-VM path, seed {:#018x} */\n",
        method.identity(),
        seed
    ));
    source.push_str("static const MicroVmInstr __prog[] = {\n");
    for instr in &code {
        source.push_str(&format!(
            "  {{ {}, {}LL, {}ULL }},\n",
            instr.op, instr.operand, instr.nonce
        ));
    }
    source.push_str("};\n");
    source.push_str(&format!(
        "static const uint64_t __vm_seed = {:#018x}ULL;\n",
        seed
    ));

    source.push_str(&format!(
        "static const char* __ref_classes[] = {{ {} }};\n",
        join_or_placeholder(&class_tokens)
    ));
    source.push_str(&format!(
        "static const char* __ref_fields[] = {{ {} }};\n",
        join_or_placeholder(&field_tokens)
    ));
    source.push_str(&format!(
        "static const char* __ref_methods[] = {{ {} }};\n",
        join_or_placeholder(&method_tokens)
    ));
    source.push_str(&format!(
        "static const NvConstEntry __ref_constants[] = {{\n{}}};\n",
        render_constants(&translation.tables.constants)
    ));
    source.push_str(&format!(
        "static const NvRefTables __ref_tables = {{ __ref_classes, {}, __ref_fields, {}, __ref_methods, {}, __ref_constants, {} }};\n",
        class_tokens.len(),
        field_tokens.len(),
        method_tokens.len(),
        translation.tables.constants.len(),
    ));
    source.push_str(&format!(
        "{} {}(void* env, void* receiver_or_class, ...) {{\n",
        crate_native_return_type(method),
        method.name
    ));
    source.push_str(
        "  return nv_runtime_vm_entry(__prog, sizeof(__prog)/sizeof(__prog[0]), __vm_seed, &__ref_tables, env, receiver_or_class);\n",
    );
    source.push_str("}\n");

    CompiledMethod {
        source,
        used_vm_path: true,
    }
}

/// An empty C initializer list (`{}`) isn't legal in every dialect this
/// output might be fed through; a single sentinel `NULL`/`{0}` keeps every
/// table declaration well-formed even when a method interns nothing of
/// that kind.
fn join_or_placeholder(tokens: &[String]) -> String {
    if tokens.is_empty() {
        "NULL".to_string()
    } else {
        tokens.join(", ")
    }
}

fn render_constants(constants: &[ConstantEntry]) -> String {
    let mut out = String::new();
    for entry in constants {
        let line = match entry {
            ConstantEntry::Integer(v) => format!("  {{ NV_CONST_INT, .i = {} }},\n", v),
            ConstantEntry::Float(v) => format!("  {{ NV_CONST_FLOAT, .f = {:e}f }},\n", v),
            ConstantEntry::Long(v) => format!("  {{ NV_CONST_LONG, .l = {}LL }},\n", v),
            ConstantEntry::Double(v) => format!("  {{ NV_CONST_DOUBLE, .d = {:e} }},\n", v),
            ConstantEntry::String(handle) => {
                format!("  {{ NV_CONST_STRING, .handle = {}ULL }},\n", handle)
            }
            ConstantEntry::Class(id) => format!("  {{ NV_CONST_CLASS, .class_id = {} }},\n", id),
        };
        out.push_str(&line);
    }
    out
}

fn crate_native_return_type(method: &BytecodeMethod) -> &'static str {
    use crate::bytecode::ValueType::*;
    match method.return_type {
        Int => "int32_t",
        Long => "int64_t",
        Float => "float",
        Double => "double",
        Reference(_) => "void*",
        Void => "void",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::tests::sample_add_method;
    use crate::config::CompilerConfig;

    fn pools() -> (NamePool, StringPool) {
        (NamePool::new(), StringPool::new())
    }

    #[test]
    fn default_config_compiles_via_vm_path() {
        let method = sample_add_method();
        let shape = ClassShape::default();
        let config = CompilerConfig::new().with_master_seed(0xDEAD_BEEF);
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        assert!(compiled.used_vm_path);
        assert!(compiled.source.contains("MicroVmInstr"));
        assert!(compiled.source.contains("__ref_tables"));
    }

    #[test]
    fn disabling_virtualization_falls_back_to_state_machine() {
        let method = sample_add_method();
        let shape = ClassShape::default();
        let config = CompilerConfig::new().with_virtualize(false);
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        assert!(!compiled.used_vm_path);
    }

    #[test]
    fn enum_classes_are_skipped() {
        let method = sample_add_method();
        let shape = ClassShape {
            is_enum: true,
            is_switch_map_holder: false,
            is_interface: false,
        };
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        assert!(compile_method(&method, &shape, &config, &mut names, &mut strings).is_none());
    }

    #[test]
    fn constructors_are_skipped() {
        let mut method = sample_add_method();
        method.name = "<init>".to_string();
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        assert!(compile_method(&method, &shape, &config, &mut names, &mut strings).is_none());
    }

    #[test]
    fn class_initializer_gets_the_special_processor() {
        let mut method = sample_add_method();
        method.name = "<clinit>".to_string();
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        assert!(compiled.source.contains("registerNativesForClass"));
    }

    #[test]
    fn class_initializer_emits_the_hidden_proxy_body_it_calls() {
        // The rewritten <clinit> stub must not be the only thing emitted —
        // the hidden proxy it calls has to carry the original
        // initializer's own translated instructions, or that code is
        // silently dropped.
        let mut method = sample_add_method();
        method.name = "<clinit>".to_string();
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();

        assert!(compiled.source.contains("_clinit___hidden_proxy"));
        assert!(compiled
            .source
            .contains("_clinit___hidden_proxy(env, declaring_class);"));
        // sample_add_method is straight-line arithmetic with no try/catch,
        // so it's VM-eligible; the proxy's own translated body must show up
        // as the VM path's instruction-array literal, not just the stub.
        assert!(compiled.used_vm_path);
        assert!(compiled.source.contains("__prog[]"));
    }

    #[test]
    fn vm_rejection_falls_back_and_still_compiles() {
        use crate::bytecode::{Instruction, Operand, SourceOp};
        let mut method = sample_add_method();
        method.instructions.push(Instruction::new(
            SourceOp::InvokeStatic,
            Operand::Method {
                owner: "java/lang/Math".to_string(),
                name: "max".to_string(),
                desc: "(II)I".to_string(),
            },
        ));
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        assert!(!compiled.used_vm_path);
    }

    #[test]
    fn string_constants_resolve_to_string_pool_handles() {
        use crate::bytecode::{Instruction, Operand, SourceOp};
        let mut method = sample_add_method();
        method.instructions.insert(
            0,
            Instruction::new(SourceOp::Ldc, Operand::StringConst("hello".to_string())),
        );
        method.instructions.insert(1, Instruction::simple(SourceOp::Pop));
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        let expected_handle = strings.intern("hello");
        assert!(
            compiled
                .source
                .contains(&format!(".handle = {}ULL", expected_handle))
        );
    }

    #[test]
    fn repeated_class_names_share_one_name_pool_id() {
        use crate::bytecode::{Instruction, Operand, SourceOp};
        let mut method = sample_add_method();
        method.instructions.insert(
            0,
            Instruction::new(
                SourceOp::CheckCast,
                Operand::ClassConst("java/lang/String".to_string()),
            ),
        );
        method.instructions.insert(
            1,
            Instruction::new(
                SourceOp::InstanceOf,
                Operand::ClassConst("java/lang/String".to_string()),
            ),
        );
        let shape = ClassShape::default();
        let config = CompilerConfig::new();
        let (mut names, mut strings) = pools();
        let compiled = compile_method(&method, &shape, &config, &mut names, &mut strings).unwrap();
        assert_eq!(names.size(NameKind::ClassInternalName), 1);
        assert!(compiled.source.contains("nv_classes[0]"));
    }
}
