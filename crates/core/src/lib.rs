//! Wire-level primitives shared by the method-compilation core and the
//! runtime support library it emits references to.
//!
//! Nothing in this crate knows how to parse bytecode or emit source text.
//! It only fixes the bit-exact shapes and constants that both
//! `nv-compiler` (which builds micro-VM programs and reference tables at
//! compile time) and `nv-runtime` (which decodes and interprets them at
//! emitted-program runtime) must agree on.

pub mod bits;
pub mod isa;
pub mod rng;
pub mod tables;

pub use bits::*;
pub use isa::*;
pub use rng::SplitMix64;
pub use tables::*;
