//! Code generation: the VM path (C5), the state-machine fallback (C6), the
//! control-flow flattener (C7), and the try-catch resolver (C8). Wired
//! together by the per-method orchestrator (C9, see
//! [`orchestrator::compile_method`]).

pub mod catch_resolver;
pub mod flattener;
pub mod orchestrator;
pub mod state_machine;
pub mod vm_translator;

pub use orchestrator::{CompiledMethod, compile_method};

/// A state-machine fragment: the native source text emitted for one state
/// id, keyed so the flattener (C7) can either wrap it in a `switch` or lay
/// it out linearly with labels (spec §4.6 step 2, §4.7).
#[derive(Debug, Clone)]
pub struct StateFragment {
    pub state_id: i32,
    pub body: String,
}
