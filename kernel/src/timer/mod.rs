//! Millisecond tick timebase.
//!
//! A single monotonic counter advanced once per timer interrupt. [`on_tick`]
//! is the only writer and is only ever called from that interrupt (or, on
//! the host test backend, called directly to simulate it); [`now`] and
//! [`elapsed_since`] are read by both thread code and the scheduler under
//! the same critical-section discipline as the rest of the kernel's shared
//! state, even though the underlying atomic load never tears.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::sched::scheduler;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Advance the tick counter by one and run the scheduler's per-tick
/// bookkeeping (waking sleepers, checking slice expiry). Called from the
/// timer interrupt; runs with interrupts disabled.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::SeqCst);
    scheduler::on_timer_tick();
}

/// The current tick count.
///
/// A `u32` load is already atomic on every target this kernel runs on, so
/// this is a plain atomic read rather than a critical section; the
/// contract callers rely on is simply "a consistent value", which
/// `Ordering::SeqCst` guarantees without needing to mask interrupts.
pub fn now() -> u32 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `start`, correct across a counter wrap via wrapping
/// (modular) subtraction.
pub fn elapsed_since(start: u32) -> u32 {
    now().wrapping_sub(start)
}
