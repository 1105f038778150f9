//! `nv-compile` — a debug/demo harness for the method compilation core.
//!
//! Not the archive tool (out of scope per spec §1): this feeds one
//! hand-written bytecode method, loaded from a JSON fixture file, through
//! the pipeline and prints the emitted native source fragment. Useful for
//! poking at a single method's output without an archive walker.

use std::path::PathBuf;
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use serde::Deserialize;

use nv_compiler::{BytecodeMethod, ClassCompiler, ClassShape, CompilerConfig};

#[derive(ClapParser)]
#[command(name = "nv-compile")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Debug harness for the bytecode-to-native method compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one bytecode method fixture and print the emitted fragment.
    Compile {
        /// JSON fixture file: `{"method": BytecodeMethod, "class_shape": ClassShape?}`
        input: PathBuf,

        /// Disable the micro-VM path; always use state-machine codegen.
        #[arg(long)]
        no_virtualize: bool,

        /// Disable control-flow flattening (emit a linear goto layout).
        #[arg(long)]
        no_flatten: bool,

        /// Emit the string pool in plaintext instead of ChaCha20-encrypted.
        #[arg(long)]
        no_obfuscate_strings: bool,

        /// Allow INVOKESTATIC through the VM translator instead of forcing
        /// a state-machine fallback.
        #[arg(long)]
        permissive_vm_eligibility: bool,

        /// Archive-wide seed driving per-method VM seeds and state
        /// obfuscation parameters.
        #[arg(long, default_value_t = 0)]
        master_seed: u64,

        /// Print reference tables and the label-to-state map alongside
        /// the emitted fragment.
        #[arg(long)]
        dump_tables: bool,
    },
}

/// The on-disk shape `nv-compile` reads: a single method plus whatever
/// declaring-class shape information the skip policy needs, since there is
/// no class-file parser in scope to derive it from (spec §1 Non-goals).
#[derive(Deserialize)]
struct Fixture {
    method: BytecodeMethod,
    #[serde(default)]
    class_shape: ClassShape,
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            input,
            no_virtualize,
            no_flatten,
            no_obfuscate_strings,
            permissive_vm_eligibility,
            master_seed,
            dump_tables,
        } => run_compile(
            &input,
            CompilerConfig::new()
                .with_master_seed(master_seed)
                .with_virtualize(!no_virtualize)
                .with_flatten_control_flow(!no_flatten)
                .with_obfuscate_strings(!no_obfuscate_strings)
                .with_permissive_vm_eligibility(permissive_vm_eligibility),
            dump_tables,
        ),
    }
}

fn run_compile(input: &PathBuf, config: CompilerConfig, dump_tables: bool) {
    let raw = match std::fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("nv-compile: could not read {}: {e}", input.display());
            process::exit(1);
        }
    };
    let fixture: Fixture = match serde_json::from_str(&raw) {
        Ok(fixture) => fixture,
        Err(e) => {
            eprintln!("nv-compile: malformed fixture: {e}");
            process::exit(1);
        }
    };

    let mut report = nv_compiler::report::CompilationReport::new();

    if dump_tables {
        dump_tables_for(&fixture.method, &fixture.class_shape, &config);
    }

    let mut compiler = ClassCompiler::new(&config);
    let compiled = compiler.compile_class(&[fixture.method], &fixture.class_shape, &config);

    if compiled.methods.is_empty() {
        report.record_skipped();
        nv_compiler::report::emit(&report);
        eprintln!("nv-compile: method was skipped (enum/switch-map class, or a constructor)");
        process::exit(1);
    }

    for method in &compiled.methods {
        report.record_compiled(method.used_vm_path);
        println!("{}", method.source);
    }
    println!("{}", compiled.name_pool_source);
    println!("{}", compiled.string_pool_source);

    nv_compiler::report::emit(&report);
}

/// `--dump-tables`: translate the method a second time, independent of the
/// final compile decision, purely to surface the reference tables and
/// label/state map a reader would otherwise only see rendered inline in
/// the VM-path source fragment.
fn dump_tables_for(method: &BytecodeMethod, class_shape: &ClassShape, config: &CompilerConfig) {
    use nv_compiler::codegen::{state_machine, vm_translator};
    use nv_compiler::{LabelPool, MasterSeed};

    println!("--- vm translator attempt ---");
    match vm_translator::translate_to_vm(method, class_shape, config.permissive_vm_eligibility) {
        Ok(translation) => {
            println!("classes:  {:?}", translation.tables.classes);
            println!("fields:   {:?}", translation.tables.fields);
            println!("methods:  {:?}", translation.tables.methods);
            println!("constants: {} entries", translation.tables.constants.len());
            println!("vm instructions: {}", translation.code.len());
        }
        Err(e) => println!("rejected: {e}"),
    }

    println!("--- state-machine label/state map ---");
    let seed = MasterSeed::new(0).derive_method_seed(&method.identity());
    let mut labels = LabelPool::new(seed);
    let sm = state_machine::generate(method, &mut labels);
    for fragment in &sm.fragments {
        println!("state {}: {} byte fragment", fragment.state_id, fragment.body.len());
    }
    println!("entry state: {}, sentinel state: {}", sm.entry_state, sm.sentinel_state);
}
