//! Memory management.
//!
//! A single subsystem: the first-fit heap allocator. There is no virtual
//! memory here — a single flat address space is one of this kernel's
//! Non-goals.

pub mod heap;

pub use heap::{alloc, free, heap_init};
