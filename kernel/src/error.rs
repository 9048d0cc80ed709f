//! Error types for kernel operations.
//!
//! Scoped to the failures this kernel can actually produce: thread-table
//! capacity, bad arguments/states at the public API boundary, and heap
//! exhaustion. The public thread/heap API still returns bool/pointer/Option
//! per the external-interface contract; internally it is built on
//! [`KernelResult`] so the failure paths are explicit and `?`-composable.

use core::fmt;

/// Kernel-internal error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Thread table has no free slot for a new thread.
    ThreadTableFull,
    /// No thread exists with the given id.
    ThreadNotFound { tid: usize },
    /// Thread is not in the state the requested operation requires.
    InvalidState {
        tid: usize,
        expected: &'static str,
        actual: &'static str,
    },
    /// An argument passed to a public entry point is out of range.
    InvalidArgument { name: &'static str },
    /// The heap has no chunk large enough to satisfy a request.
    HeapExhausted { requested: usize },
    /// A public entry point was called before `kernel_init`.
    NotInitialized,
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadTableFull => write!(f, "thread table is full"),
            Self::ThreadNotFound { tid } => write!(f, "no thread with id {tid}"),
            Self::InvalidState {
                tid,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "thread {tid}: expected state {expected}, found {actual}"
                )
            }
            Self::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
            Self::HeapExhausted { requested } => {
                write!(f, "heap exhausted: no chunk fits {requested} bytes")
            }
            Self::NotInitialized => write!(f, "kernel used before kernel_init"),
        }
    }
}
