//! Class Compiler: the archive-level wrapper around the per-method
//! orchestrator (C9). Owns the name pool (C1) and the string pool (C2) for
//! one class's worth of methods — both are created once per class and
//! flushed to source after the last method compiles (spec §4.1, §4.2, §5
//! "Shared-resource policy": "name and string pools are explicit
//! per-archive-compilation-session state, not per-method").

use nv_runtime::StringPool;

use crate::bytecode::{BytecodeMethod, ClassShape};
use crate::codegen::{CompiledMethod, compile_method};
use crate::config::CompilerConfig;
use crate::pools::{NameKind, NamePool};

/// Everything the class compiler produced for one class: the compiled
/// method fragments, plus the flushed C1/C2 pool source that every
/// fragment's `nv_classes[...]`/`nv_fields[...]`/`nv_methods[...]` tokens
/// and masked string handles resolve against.
pub struct CompiledClass {
    pub methods: Vec<CompiledMethod>,
    /// `static const char* nv_strings[] = {...};` etc. — one array per
    /// [`NameKind`] (spec §4.1 "array-indexed accessor").
    pub name_pool_source: String,
    /// The encrypted byte arena plus decrypt/clear runtime declarations
    /// (spec §4.2 `build`).
    pub string_pool_source: String,
}

/// Drives one class's worth of methods through [`compile_method`], holding
/// the name pool and string pool steady across the whole run so that
/// identical literals anywhere in the class dedup to one id (spec §4.1
/// invariant: pools reset only *between* classes, never mid-class).
pub struct ClassCompiler {
    name_pool: NamePool,
    string_pool: StringPool,
}

impl ClassCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        let mut string_pool = StringPool::new();
        string_pool.reset(config.obfuscate_strings);
        ClassCompiler {
            name_pool: NamePool::new(),
            string_pool,
        }
    }

    /// Compile every non-constructor method of a class (`<init>` is never
    /// native-redirected — spec §4.9 step 2 — so callers may pass the
    /// constructor through unfiltered; it's dropped here rather than at
    /// every call site).
    pub fn compile_class(
        &mut self,
        methods: &[BytecodeMethod],
        class_shape: &ClassShape,
        config: &CompilerConfig,
    ) -> CompiledClass {
        let compiled: Vec<CompiledMethod> = methods
            .iter()
            .filter(|m| !m.is_constructor())
            .filter_map(|m| {
                compile_method(
                    m,
                    class_shape,
                    config,
                    &mut self.name_pool,
                    &mut self.string_pool,
                )
            })
            .collect();

        CompiledClass {
            methods: compiled,
            name_pool_source: emit_name_pool_tables(&self.name_pool),
            string_pool_source: self.string_pool.build(),
        }
    }

    /// Reset both pools, e.g. between archive classes in a multi-class run
    /// sharing one `ClassCompiler` (spec §4.1 `reset`, generalized to the
    /// string pool per its own doc comment).
    pub fn reset(&mut self, config: &CompilerConfig) {
        self.name_pool.reset();
        self.string_pool.reset(config.obfuscate_strings);
    }
}

const NAME_KINDS: [NameKind; 4] = [
    NameKind::StringLiteral,
    NameKind::ClassInternalName,
    NameKind::MethodRef,
    NameKind::FieldRef,
];

fn emit_name_pool_tables(pool: &NamePool) -> String {
    let mut out = String::new();
    for kind in NAME_KINDS {
        let array = match kind {
            NameKind::StringLiteral => "nv_strings",
            NameKind::ClassInternalName => "nv_classes",
            NameKind::MethodRef => "nv_methods",
            NameKind::FieldRef => "nv_fields",
        };
        let entries = pool.entries(kind);
        let literals: Vec<String> = entries.iter().map(|e| format!("{:?}", e)).collect();
        let body = if literals.is_empty() {
            "NULL".to_string()
        } else {
            literals.join(", ")
        };
        out.push_str(&format!(
            "static const char* {}[] = {{ {} }};\n",
            array, body
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, Operand, SourceOp};
    use crate::bytecode::tests::sample_add_method;

    fn method_with_string(text: &str) -> BytecodeMethod {
        let mut m = sample_add_method();
        m.instructions
            .insert(0, Instruction::new(SourceOp::Ldc, Operand::StringConst(text.to_string())));
        m.instructions.insert(1, Instruction::simple(SourceOp::Pop));
        m
    }

    #[test]
    fn methods_sharing_a_class_dedup_identical_strings() {
        let mut a = method_with_string("shared");
        a.name = "a".to_string();
        let mut b = method_with_string("shared");
        b.name = "b".to_string();

        let config = CompilerConfig::new();
        let mut compiler = ClassCompiler::new(&config);
        let compiled = compiler.compile_class(&[a, b], &ClassShape::default(), &config);

        assert_eq!(compiled.methods.len(), 2);
        // Exactly one entry went into the byte arena for both methods'
        // identical literal (the string pool's own dedup-by-text).
        let handle_count = compiled
            .methods
            .iter()
            .filter(|m| m.source.contains(".handle ="))
            .count();
        assert_eq!(handle_count, 2);
    }

    #[test]
    fn constructors_never_reach_the_method_compiler() {
        let mut ctor = sample_add_method();
        ctor.name = "<init>".to_string();
        let config = CompilerConfig::new();
        let mut compiler = ClassCompiler::new(&config);
        let compiled = compiler.compile_class(&[ctor], &ClassShape::default(), &config);
        assert!(compiled.methods.is_empty());
    }

    #[test]
    fn reset_clears_accumulated_pool_state() {
        let config = CompilerConfig::new();
        let mut compiler = ClassCompiler::new(&config);
        let method = method_with_string("one-off");
        let _ = compiler.compile_class(&[method], &ClassShape::default(), &config);
        compiler.reset(&config);
        assert!(emit_name_pool_tables(&compiler.name_pool).contains("NULL"));
    }
}
