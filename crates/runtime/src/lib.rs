//! Runtime support for generated native-obfuscator code.
//!
//! This crate is what the C-family source the method-compilation core
//! emits calls into: the encrypted string pool's runtime decrypt
//! accessors, the micro-VM's encoder/decoder and both interpreter
//! variants, and the host exception taxonomy that fault paths in
//! generated code surface through.
//!
//! None of this crate parses bytecode or emits source text — that is
//! `nv-compiler`'s job. This crate only has to agree bit-for-bit with what
//! `nv-compiler` produces.

pub mod exceptions;
pub mod microvm;
pub mod string_pool;

pub use exceptions::HostException;
pub use string_pool::StringPool;
