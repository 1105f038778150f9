//! Process-wide-per-archive mutable state (spec §2 C1, C2; §5 "Shared-resource
//! policy"): the name pools and the string pool. Both are created once at
//! the start of archive compilation and flushed to source at the end; the
//! label pool (C3) is per-method and lives in [`crate::bytecode`]'s caller
//! instead, see [`label_pool`].

pub mod label_pool;
pub mod name_pool;

pub use label_pool::LabelPool;
pub use name_pool::{NameKind, NamePool};
