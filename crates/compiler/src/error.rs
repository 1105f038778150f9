//! Compile-time error taxonomy (spec §7).
//!
//! Failures that can abort a single method's compilation while leaving the
//! rest of the archive compilation to proceed (`Compile*` variants below),
//! versus the one invariant violation the spec calls out as fatal to the
//! whole archive: a method shape with no special processor at all. That one
//! is raised as a panic at the call site, not through this enum — see
//! `orchestrator::compile_method`'s doc comment.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The VM translator rejected the method (contains an invoke opcode
    /// outside the permissive switch, an interface method, or an empty
    /// instruction stream). Recoverable: the orchestrator falls through to
    /// the state-machine path.
    VmTranslationRejected(String),
    /// A branch, switch target, or try-region label has no assigned state
    /// id. Invariant violation; fatal to the method, not the archive.
    LabelNotFound(LabelRef),
    /// The declaring class could not be resolved while materializing the
    /// method's native entry signature.
    ClassResolution { class: String, cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRef(pub u32);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::VmTranslationRejected(reason) => {
                write!(f, "VM translation rejected: {}", reason)
            }
            CompileError::LabelNotFound(LabelRef(id)) => {
                write!(f, "label {} has no assigned state id", id)
            }
            CompileError::ClassResolution { class, cause } => {
                write!(f, "could not resolve class {}: {}", class, cause)
            }
        }
    }
}

impl std::error::Error for CompileError {}
