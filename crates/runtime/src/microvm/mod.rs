//! The micro-VM: encoder, interpreter, and JIT variant (spec §4.4).
//!
//! Both execution variants share one dispatch loop (see [`dispatch::step`]);
//! they differ only in how they get from an encoded [`nv_core::MicroVmInstr`]
//! to a plain `(op, operand)` pair for a given program counter — see
//! [`interpreter`] (decodes per step) and [`jit`] (decodes once, up front).

pub mod dispatch;
pub mod encode;
pub mod interpreter;
pub mod jit;

pub use dispatch::{ExecError, StepOutcome, VmState};
pub use encode::{decode_program, encode_program};
pub use interpreter::Interpreter;
pub use jit::Jit;
