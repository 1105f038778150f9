//! Method compilation core for a class-archive native obfuscator.
//!
//! Turns JVM-style bytecode methods into native source fragments through
//! one of two paths: a micro-VM path (C4/C5) that ships an encrypted
//! instruction stream interpreted at runtime, or a state-machine path
//! (C6/C7/C8) that lowers the method into a flattened dispatch loop. The
//! orchestrator (C9) decides per method which path applies and assembles
//! the final fragment; [`class::ClassCompiler`] drives it across a whole
//! class's methods, sharing the name pool (C1) and string pool (C2)
//! between them.
//!
//! No archive/class-file reader lives here — callers hand in a
//! [`bytecode::BytecodeMethod`] already decoded from whatever container
//! format they use; the `nv-compile` binary's JSON fixture loader is one
//! such caller, scaled down to a single method at a time.

pub mod bytecode;
pub mod class;
pub mod codegen;
pub mod config;
pub mod error;
pub mod pools;
pub mod report;

pub use bytecode::{
    BytecodeMethod, ClassShape, Instruction, LabelId, MethodFlags, Operand, SourceOp, TryCatch,
    ValueType,
};
pub use class::{ClassCompiler, CompiledClass};
pub use codegen::{CompiledMethod, compile_method};
pub use config::{CompilerConfig, MasterSeed};
pub use error::{CompileError, LabelRef};
pub use pools::{LabelPool, NameKind, NamePool};
