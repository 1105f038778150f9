//! Host-platform exception taxonomy (spec §7).
//!
//! Generated code's fault paths — division, array access, class
//! resolution — surface through these variants rather than aborting
//! silently. The interpreter (spec §4.4) signals the fault and then
//! returns 0, matching the host runtime's own "throw, then unwind"
//! contract without this crate having to model exception objects itself.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum HostException {
    /// Division or remainder by zero (spec §4.4 "Division by zero in DIV
    /// throws an arithmetic exception through the host runtime").
    ArithmeticDivideByZero,
    /// Negative or out-of-range array index.
    ArrayIndexOutOfBounds { index: i64, length: i64 },
    /// `MULTIANEWARRAY`/`ANEWARRAY` with a negative dimension.
    NegativeArraySize { size: i64 },
    /// Class resolution failure, wrapping the original cause chain
    /// (spec §6 "Class resolution failure").
    NoClassDefFoundError { class: String, cause: String },
    /// A non-static invocation path observed a null class loader; the
    /// method cannot proceed safely (spec §7 "Classloader-null").
    ClassLoaderNull,
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostException::ArithmeticDivideByZero => write!(f, "ArithmeticException: / by zero"),
            HostException::ArrayIndexOutOfBounds { index, length } => write!(
                f,
                "ArrayIndexOutOfBoundsException: index {} out of bounds for length {}",
                index, length
            ),
            HostException::NegativeArraySize { size } => {
                write!(f, "NegativeArraySizeException: {}", size)
            }
            HostException::NoClassDefFoundError { class, cause } => {
                write!(f, "NoClassDefFoundError: {} (caused by {})", class, cause)
            }
            HostException::ClassLoaderNull => {
                write!(f, "fatal: class loader is null on non-static invocation path")
            }
        }
    }
}

impl std::error::Error for HostException {}
