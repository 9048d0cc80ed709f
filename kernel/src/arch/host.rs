//! Host test backend.
//!
//! Stands in for real hardware when the crate is compiled for `cargo test`
//! on a development machine. There is no PendSV exception to defer to, so
//! [`Host::pend_switch`] just raises a flag; tests that want to observe a
//! requested switch call [`take_pending_switch`] to drain it, mirroring what
//! the PendSV handler would have done on target.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::Platform;

static CRITICAL_DEPTH: AtomicUsize = AtomicUsize::new(0);
static SWITCH_PENDING: AtomicBool = AtomicBool::new(false);

pub struct Host;

impl Platform for Host {
    fn enter_critical(&self) -> usize {
        CRITICAL_DEPTH.fetch_add(1, Ordering::SeqCst)
    }

    unsafe fn exit_critical(&self, saved: usize) {
        let _ = saved;
        CRITICAL_DEPTH.fetch_sub(1, Ordering::SeqCst);
    }

    fn pend_switch(&self) {
        SWITCH_PENDING.store(true, Ordering::SeqCst);
    }

    fn wait_for_interrupt(&self) {
        core::hint::spin_loop();
    }

    fn configure_tick(&self, _period_ms: u32) {
        // No real SysTick to program; host tests drive ticks by calling
        // `timer::on_tick` directly.
    }

    fn configure_switch_priority(&self) {
        // No NVIC to configure on the host.
    }
}

/// Test-only: consume and report whether a switch was pended since the last
/// call.
pub fn take_pending_switch() -> bool {
    SWITCH_PENDING.swap(false, Ordering::SeqCst)
}

/// Host test harness: stands in for the PendSV exception firing. If a
/// switch is pending, hands off to the scheduler exactly as the naked
/// PendSV handler would (just without any real registers to save) and
/// clears the flag. Returns whether a switch was pending.
///
/// There is no real outgoing stack pointer to pass on the host, since
/// nothing here is actually executing on a synthesized thread stack; `0`
/// is a placeholder the scheduler only ever writes back into the outgoing
/// TCB's bookkeeping, never dereferences.
pub fn drive_pending_switch() -> bool {
    if take_pending_switch() {
        crate::sched::scheduler::schedule(0);
        true
    } else {
        false
    }
}
