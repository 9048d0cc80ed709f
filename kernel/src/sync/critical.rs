//! RAII critical-section guard.
//!
//! Wraps the active [`crate::arch::Platform`] backend's interrupt
//! enable/disable pair so that a scope can manipulate shared scheduler state
//! without being preempted mid-update. Nests correctly: entering while
//! already inside a critical section is a no-op on exit until the outermost
//! guard drops, because each guard remembers the *previous* interrupt state
//! rather than unconditionally re-enabling interrupts.

use crate::arch::{self, Platform};

/// Disables interrupts for as long as the guard is alive, restoring the
/// prior interrupt state (enabled or already-disabled) on drop.
#[must_use = "the critical section ends as soon as this guard is dropped"]
pub struct CriticalSection {
    saved: usize,
}

impl CriticalSection {
    /// Enter a critical section now.
    pub fn enter() -> Self {
        Self {
            saved: arch::active().enter_critical(),
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        // SAFETY: `saved` was produced by the matching `enter_critical` call
        // above and is restored exactly once here.
        unsafe {
            arch::active().exit_critical(self.saved);
        }
    }
}

/// Run `f` with interrupts disabled, restoring prior state afterwards.
pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let _guard = CriticalSection::enter();
    f()
}
