//! The scheduler: thread table, state-mask bookkeeping, and the
//! round-robin dispatch decision.
//!
//! This module owns every piece of mutable kernel-singleton state —
//! the thread queue, the five state masks, the sleep table, and the
//! first-dispatch/has-started flags — behind the same critical-section
//! discipline the heap allocator uses. [`schedule`] is the one function
//! that is genuinely architecture-coupled: it is called from the
//! deferred-switch exception with the outgoing thread's just-saved stack
//! pointer and returns the incoming thread's, combining the scheduling
//! decision (§4.4 of the originating design) with the context-switch
//! bookkeeping (§4.5) that only needs a stack pointer, never assembly,
//! to implement.

use core::ptr;

use super::state::{State, StateMasks, IDLE_INDEX, THREAD_SLOTS};
use crate::arch::{self, context, Platform};
use crate::config::{IDLE_STACK_WORDS, MAX_THREADS, TIME_SLICE_TICKS};
use crate::error::{KernelError, KernelResult};
use crate::process::thread::{Tcb, ThreadEntry};
use crate::sync::critical::critical_section;
use crate::timer;

/// One slot per thread id, reachable by the context switcher in O(1).
/// Null until a thread is registered at that id; the idle slot is filled
/// by [`kernel_init`].
static mut THREAD_QUEUE: [*mut Tcb; THREAD_SLOTS] = [ptr::null_mut(); THREAD_SLOTS];

/// Remaining tick periods for each SLEEPING thread. Only meaningful while
/// the corresponding bit in `MASKS`'s SLEEPING mask is set.
static mut SLEEP_TICKS: [u32; THREAD_SLOTS] = [0; THREAD_SLOTS];

static mut MASKS: StateMasks = StateMasks::new();

/// Number of user threads registered so far via [`thread_init`]. Never
/// counts the idle thread.
static mut THREAD_COUNT: usize = 0;

/// Id of the thread presently RUNNING (or, between dispatches, the thread
/// that was most recently RUNNING — used as the round-robin starting
/// point and as the index the context switcher writes the outgoing stack
/// pointer to).
static mut RUNNING_ID: usize = IDLE_INDEX;

/// Tick count recorded at the start of the current thread's time slice.
static mut LAST_SLICE_START: u32 = 0;

/// True until the first call to [`schedule`] has run; selects the
/// first-dispatch path instead of the normal round-robin path.
static mut IS_FIRST_TIME: bool = true;

/// Set by [`thread_start`]/[`thread_start_all_new`]; the timer handler
/// does nothing until this is true.
static mut HAS_STARTED: bool = false;

static mut IDLE_TCB: Tcb = Tcb::new();
static mut IDLE_STACK: [u8; IDLE_STACK_WORDS * 4] = [0; IDLE_STACK_WORDS * 4];

fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// The idle thread: the always-runnable fallback chosen whenever no user
/// thread is READY. Never returns.
extern "C" fn idle_entry(_arg: usize) -> ! {
    loop {
        arch::active().wait_for_interrupt();
    }
}

/// Configure the tick source and deferred-switch priority, and bring the
/// idle thread up to READY. Must be called exactly once at startup,
/// before any other entry point in this module.
pub fn kernel_init() {
    critical_section(|| {
        crate::log_service::init();

        // SAFETY: sole writer, interrupts disabled for the whole section.
        unsafe {
            THREAD_QUEUE = [ptr::null_mut(); THREAD_SLOTS];
            SLEEP_TICKS = [0; THREAD_SLOTS];
            MASKS = StateMasks::new();
            THREAD_COUNT = 0;
            RUNNING_ID = IDLE_INDEX;
            LAST_SLICE_START = 0;
            IS_FIRST_TIME = true;
            HAS_STARTED = false;

            let stack_top =
                align_down(IDLE_STACK.as_mut_ptr() as usize + IDLE_STACK.len(), 8) as *mut u32;
            IDLE_TCB.thread_id = IDLE_INDEX;
            // SAFETY: IDLE_STACK is reserved exclusively for the idle
            // thread and stack_top is 8-aligned by construction.
            IDLE_TCB.stack_ptr = unsafe { context::init_stack(stack_top, idle_entry, 0) };
            THREAD_QUEUE[IDLE_INDEX] = &raw mut IDLE_TCB;
            MASKS.set(State::Ready, IDLE_INDEX);
        }

        let platform = arch::active();
        platform.configure_tick(crate::config::TIMER_PERIOD_MS);
        platform.configure_switch_priority();
    });
}

/// Register a NEW thread. `stack` must be large enough to hold a
/// synthesized exception-return frame ([`context::CONTEXT_FRAME_WORDS`]
/// words); `entry` receives `arg` as its sole parameter and must never
/// return.
///
/// Returns `false` (with no side effects) if the thread table is full or
/// `stack` is too small to hold even the initial frame. `tcb`, `entry`,
/// and `stack` being valid, non-null is guaranteed by their Rust types —
/// there is no way to construct a null `&mut Tcb`, function pointer, or
/// slice — so unlike the original C interface, this binding has nothing
/// further to null-check.
pub fn thread_init(
    tcb: &'static mut Tcb,
    entry: ThreadEntry,
    arg: usize,
    stack: &'static mut [u8],
) -> bool {
    try_thread_init(tcb, entry, arg, stack).is_ok()
}

/// [`thread_init`]'s body, with the specific failure reason preserved.
fn try_thread_init(
    tcb: &'static mut Tcb,
    entry: ThreadEntry,
    arg: usize,
    stack: &'static mut [u8],
) -> KernelResult<()> {
    critical_section(|| {
        // SAFETY: THREAD_COUNT, THREAD_QUEUE and MASKS are only touched
        // inside a critical section; reading THREAD_COUNT here is safe.
        let count = unsafe { THREAD_COUNT };
        if count >= MAX_THREADS {
            return Err(KernelError::ThreadTableFull);
        }
        if stack.len() < context::CONTEXT_FRAME_WORDS * 4 {
            return Err(KernelError::InvalidArgument { name: "stack" });
        }

        let stack_top = align_down(stack.as_mut_ptr() as usize + stack.len(), 8) as *mut u32;

        tcb.thread_id = count;
        // SAFETY: stack_top is 8-aligned and stack is reserved exclusively
        // for this thread for its entire lifetime (it is 'static).
        tcb.stack_ptr = unsafe { context::init_stack(stack_top, entry, arg) };

        // SAFETY: still inside the critical section.
        unsafe {
            THREAD_QUEUE[count] = tcb as *mut Tcb;
            MASKS.set(State::New, count);
            THREAD_COUNT = count + 1;
        }
        Ok(())
    })
}

/// Promote a single NEW thread to READY. Returns `true` iff it was NEW.
pub fn thread_start(tcb: &Tcb) -> bool {
    try_thread_start(tcb).is_ok()
}

fn try_thread_start(tcb: &Tcb) -> KernelResult<()> {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            HAS_STARTED = true;
            let id = tcb.thread_id;
            if MASKS.is_set(State::New, id) {
                MASKS.transition(id, State::New, State::Ready);
                Ok(())
            } else {
                Err(KernelError::InvalidState {
                    tid: id,
                    expected: "new",
                    actual: "not new",
                })
            }
        }
    })
}

/// Promote every NEW thread to READY in one pass.
pub fn thread_start_all_new() {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            HAS_STARTED = true;
            for id in 0..MAX_THREADS {
                if MASKS.is_set(State::New, id) {
                    MASKS.transition(id, State::New, State::Ready);
                }
            }
        }
    });
}

/// Self-pause: the calling thread moves from RUNNING to PAUSED and a
/// deferred switch is posted. Only `thread_resume` can bring it back.
///
/// Returns once this thread has been rescheduled in.
pub fn thread_pause() {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            let id = RUNNING_ID;
            MASKS.transition(id, State::Running, State::Paused);
        }
    });
    arch::active().pend_switch();
}

/// Resume a PAUSED thread. Returns `true` iff it was PAUSED.
pub fn thread_resume(tcb: &Tcb) -> bool {
    try_thread_resume(tcb).is_ok()
}

fn try_thread_resume(tcb: &Tcb) -> KernelResult<()> {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            let id = tcb.thread_id;
            if MASKS.is_set(State::Paused, id) {
                MASKS.transition(id, State::Paused, State::Ready);
                Ok(())
            } else {
                Err(KernelError::InvalidState {
                    tid: id,
                    expected: "paused",
                    actual: "not paused",
                })
            }
        }
    })
}

/// Self-sleep for at least `ticks` tick periods. The calling thread moves
/// from RUNNING to SLEEPING and a deferred switch is posted; the timer
/// handler moves it back to READY once its counter reaches zero.
pub fn thread_sleep(ticks: u32) {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            let id = RUNNING_ID;
            MASKS.transition(id, State::Running, State::Sleeping);
            SLEEP_TICKS[id] = ticks;
        }
    });
    arch::active().pend_switch();
}

/// Id of the thread presently RUNNING. Exposed for introspection (tests,
/// a future debug shell) — nothing in the core itself needs to ask.
pub fn current_thread_id() -> usize {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe { RUNNING_ID }
    })
}

/// Which of the five lifecycle states thread `id` currently occupies.
pub fn state_of(id: usize) -> State {
    critical_section(|| {
        // SAFETY: inside the critical section.
        unsafe {
            for state in [
                State::New,
                State::Ready,
                State::Running,
                State::Sleeping,
                State::Paused,
            ] {
                if MASKS.is_set(state, id) {
                    return state;
                }
            }
        }
        unreachable!("thread {id} has no state bit set")
    })
}

/// Called from the timer interrupt on every tick. Wakes sleepers whose
/// counter has reached zero and posts a deferred switch if the current
/// thread's slice has expired (or if the very first dispatch is still
/// pending).
pub(crate) fn on_timer_tick() {
    critical_section(|| {
        // SAFETY: inside the critical section; this runs with interrupts
        // already disabled (hardware ISR entry), so nesting is a no-op.
        unsafe {
            if !HAS_STARTED {
                return;
            }
            if IS_FIRST_TIME {
                arch::active().pend_switch();
                return;
            }

            let sleeping = MASKS.mask(State::Sleeping);
            for id in 0..THREAD_SLOTS {
                if sleeping & (1 << id) == 0 {
                    continue;
                }
                SLEEP_TICKS[id] = SLEEP_TICKS[id].saturating_sub(1);
                if SLEEP_TICKS[id] == 0 {
                    MASKS.transition(id, State::Sleeping, State::Ready);
                }
            }

            if timer::elapsed_since(LAST_SLICE_START) >= TIME_SLICE_TICKS {
                arch::active().pend_switch();
            }
        }
    });
}

/// Highest-id non-idle READY thread, or idle if none is READY. Used only
/// for the very first dispatch.
fn pick_first_dispatch() -> usize {
    // SAFETY: called only from inside `schedule`'s critical section.
    unsafe {
        for id in (0..MAX_THREADS).rev() {
            if MASKS.is_set(State::Ready, id) {
                return id;
            }
        }
    }
    IDLE_INDEX
}

/// Round-robin successor of `outgoing` among READY user threads, or idle
/// if none is READY. Wraps modulo [`MAX_THREADS`]; the idle thread is
/// never part of the cycle, only the fallback.
fn pick_next_round_robin(outgoing: usize) -> usize {
    for offset in 1..=MAX_THREADS {
        let id = (outgoing + offset) % MAX_THREADS;
        // SAFETY: called only from inside `schedule`'s critical section.
        if unsafe { MASKS.is_set(State::Ready, id) } {
            return id;
        }
    }
    IDLE_INDEX
}

/// The scheduling decision and context-switch bookkeeping combined
/// (§4.4 + §4.5): called from the deferred-switch exception with the
/// outgoing thread's just-saved stack pointer, returns the incoming
/// thread's. Runs with interrupts disabled for its whole duration.
pub(crate) fn schedule(current_sp: usize) -> usize {
    critical_section(|| {
        // SAFETY: every access below is guarded by this critical section.
        unsafe {
            if IS_FIRST_TIME {
                let chosen = pick_first_dispatch();
                MASKS.transition(chosen, State::Ready, State::Running);
                RUNNING_ID = chosen;
                LAST_SLICE_START = timer::now();
                IS_FIRST_TIME = false;
                return (*THREAD_QUEUE[chosen]).stack_ptr as usize;
            }

            let outgoing = RUNNING_ID;
            (*THREAD_QUEUE[outgoing]).stack_ptr = current_sp as *mut u32;

            if MASKS.is_set(State::Running, outgoing) {
                MASKS.transition(outgoing, State::Running, State::Ready);
            }

            let chosen = pick_next_round_robin(outgoing);
            MASKS.clear(State::Ready, chosen);
            MASKS.set(State::Running, chosen);
            RUNNING_ID = chosen;
            LAST_SLICE_START = timer::now();

            (*THREAD_QUEUE[chosen]).stack_ptr as usize
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // All scheduler state above is a single global singleton; serialize
    // tests so they don't observe each other's thread tables.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    static mut T1: Tcb = Tcb::new();
    static mut T2: Tcb = Tcb::new();
    static mut T3: Tcb = Tcb::new();
    static mut STACK1: [u8; 256] = [0; 256];
    static mut STACK2: [u8; 256] = [0; 256];
    static mut STACK3: [u8; 256] = [0; 256];

    extern "C" fn noop_entry(_arg: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Drive one pending switch exactly like the host PendSV stand-in.
    fn pump() -> bool {
        crate::arch::host::drive_pending_switch()
    }

    #[test]
    fn first_dispatch_picks_highest_id_ready_thread() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        // SAFETY: exclusive access under TEST_LOCK.
        let (t1, t2) = unsafe { (&mut *&raw mut T1, &mut *&raw mut T2) };
        assert!(thread_init(t1, noop_entry, 0, unsafe { &mut *&raw mut STACK1 }));
        assert!(thread_init(t2, noop_entry, 0, unsafe { &mut *&raw mut STACK2 }));
        thread_start_all_new();

        on_timer_tick(); // IS_FIRST_TIME: pends the switch
        assert!(pump());
        assert_eq!(current_thread_id(), 1);
        assert_eq!(state_of(1), State::Running);
        assert_eq!(state_of(0), State::Ready);
    }

    #[test]
    fn round_robin_wraps_and_prefers_lower_id() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        let (t1, t2, t3) = unsafe { (&mut *&raw mut T1, &mut *&raw mut T2, &mut *&raw mut T3) };
        assert!(thread_init(t1, noop_entry, 0, unsafe { &mut *&raw mut STACK1 }));
        assert!(thread_init(t2, noop_entry, 0, unsafe { &mut *&raw mut STACK2 }));
        assert!(thread_init(t3, noop_entry, 0, unsafe { &mut *&raw mut STACK3 }));
        thread_start_all_new();

        on_timer_tick();
        pump(); // dispatches thread 2 (highest id)
        assert_eq!(current_thread_id(), 2);

        arch::active().pend_switch();
        pump();
        assert_eq!(current_thread_id(), 0); // wraps past 2 -> 0

        arch::active().pend_switch();
        pump();
        assert_eq!(current_thread_id(), 1);
    }

    #[test]
    fn falls_back_to_idle_when_nothing_ready() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        let t1 = unsafe { &mut *&raw mut T1 };
        assert!(thread_init(t1, noop_entry, 0, unsafe { &mut *&raw mut STACK1 }));
        thread_start(t1);

        on_timer_tick();
        pump();
        assert_eq!(current_thread_id(), 0);

        arch::active().pend_switch();
        pump();
        assert_eq!(current_thread_id(), IDLE_INDEX);
    }

    #[test]
    fn sleep_removes_thread_from_rotation_until_woken() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        let (t1, t2) = unsafe { (&mut *&raw mut T1, &mut *&raw mut T2) };
        assert!(thread_init(t1, noop_entry, 0, unsafe { &mut *&raw mut STACK1 }));
        assert!(thread_init(t2, noop_entry, 0, unsafe { &mut *&raw mut STACK2 }));
        thread_start_all_new();

        on_timer_tick();
        pump();
        assert_eq!(current_thread_id(), 1);

        thread_sleep(3);
        assert_eq!(state_of(1), State::Sleeping);
        pump();
        assert_eq!(current_thread_id(), 0);

        for _ in 0..3 {
            on_timer_tick();
        }
        assert_eq!(state_of(1), State::Ready);
    }

    #[test]
    fn pause_and_resume() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        let (t1, t2) = unsafe { (&mut *&raw mut T1, &mut *&raw mut T2) };
        assert!(thread_init(t1, noop_entry, 0, unsafe { &mut *&raw mut STACK1 }));
        assert!(thread_init(t2, noop_entry, 0, unsafe { &mut *&raw mut STACK2 }));
        thread_start_all_new();

        on_timer_tick();
        pump();
        assert_eq!(current_thread_id(), 1);

        thread_pause();
        assert_eq!(state_of(1), State::Paused);
        pump();
        assert_eq!(current_thread_id(), 0);

        assert!(thread_resume(t1));
        assert_eq!(state_of(1), State::Ready);
        assert!(!thread_resume(t1)); // already READY, not PAUSED
    }

    #[test]
    fn thread_init_capacity_is_exhausted_without_side_effects() {
        let _guard = TEST_LOCK.lock().unwrap();
        kernel_init();
        // Leaked deliberately: thread_init requires 'static storage, and
        // this test only needs to outlive itself.
        let mut registered = 0;
        for _ in 0..MAX_THREADS {
            let tcb: &'static mut Tcb = std::boxed::Box::leak(std::boxed::Box::new(Tcb::new()));
            let stack: &'static mut [u8; 256] =
                std::boxed::Box::leak(std::boxed::Box::new([0u8; 256]));
            assert!(thread_init(tcb, noop_entry, 0, stack));
            registered += 1;
        }
        assert_eq!(registered, MAX_THREADS);

        let extra_tcb: &'static mut Tcb = std::boxed::Box::leak(std::boxed::Box::new(Tcb::new()));
        let extra_stack: &'static mut [u8; 256] =
            std::boxed::Box::leak(std::boxed::Box::new([0u8; 256]));
        let count_before = unsafe { THREAD_COUNT };
        assert!(!thread_init(extra_tcb, noop_entry, 0, extra_stack));
        assert_eq!(unsafe { THREAD_COUNT }, count_before);
    }
}
