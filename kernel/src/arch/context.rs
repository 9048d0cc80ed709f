//! Stack-frame synthesis and the architecture-independent half of the
//! context switch.
//!
//! The decision of *which* thread runs next is plain Rust
//! ([`crate::sched::scheduler::schedule`]) and is exercised directly by host
//! tests. Only two things here are Cortex-M specific: the layout of the
//! initial frame a brand-new thread's stack must hold before it is ever
//! switched to, and the EXC_RETURN value used to resume in thread mode on
//! the process stack.

/// EXC_RETURN value for: return to thread mode, use PSP, no floating point
/// state.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Number of 32-bit words a saved context occupies: eight callee-saved
/// registers (r4-r11) pushed by the PendSV handler, followed by the
/// eight-word frame the CPU pushes automatically on exception entry
/// (r0-r3, r12, lr, pc, xpsr).
pub const CONTEXT_FRAME_WORDS: usize = 16;

/// Default value for the synthesized xPSR: the Thumb bit set, no other
/// flags. Cortex-M refuses to execute in ARM mode, so this bit must always
/// be set for a thread to run at all.
const DEFAULT_XPSR: u32 = 1 << 24;

/// Build the initial saved-context frame for a brand-new thread so that the
/// first context switch into it behaves exactly like switching into a
/// thread that had just been PendSV'd out.
///
/// `stack_top` must point one-past-the-end of the thread's stack region
/// (the highest address, exclusive). `entry` is the function the thread
/// starts executing in; it must never return, and receives `arg` as its
/// sole parameter (passed in r0, per AAPCS). Returns the stack pointer to
/// store in the thread's [`crate::process::thread::Tcb::stack_ptr`].
///
/// # Safety
/// `stack_top` minus [`CONTEXT_FRAME_WORDS`] words must lie within a stack
/// region reserved exclusively for this thread and be 4-byte aligned.
pub unsafe fn init_stack(
    stack_top: *mut u32,
    entry: crate::process::thread::ThreadEntry,
    arg: usize,
) -> *mut u32 {
    // SAFETY: caller guarantees stack_top - CONTEXT_FRAME_WORDS is valid and
    // aligned for this thread's exclusive use.
    let frame = unsafe { stack_top.sub(CONTEXT_FRAME_WORDS) };

    // Layout from low address to high address, matching the order PendSV's
    // `stmdb`/`ldmia {r4-r11}` and the hardware's own stacking order expect:
    // r4..r11 (software-saved), then r0..r3, r12, lr, pc, xpsr (hardware frame).
    let words: [u32; CONTEXT_FRAME_WORDS] = [
        0, 0, 0, 0, 0, 0, 0, 0, // r4-r11, zeroed: thread has no prior state
        arg as u32, // r0: the entry function's argument
        0, 0, 0, // r1-r3: unused argument-slot registers
        0, // r12
        0, // lr: a thread entry point never returns via `bx lr`
        entry as usize as u32, // pc
        DEFAULT_XPSR,
    ];

    for (i, word) in words.iter().enumerate() {
        // SAFETY: `frame` has room for CONTEXT_FRAME_WORDS words by construction.
        unsafe {
            frame.add(i).write(*word);
        }
    }

    frame
}

/// Called from the PendSV handler with the outgoing thread's saved stack
/// pointer (after r4-r11 have already been pushed). Asks the scheduler for
/// the next thread to run and returns its saved stack pointer.
///
/// Exposed with C calling convention so the naked PendSV handler can `bl`
/// directly into it and receive the result in r0.
pub(crate) extern "C" fn switch_trampoline(current_sp: u32) -> u32 {
    crate::sched::scheduler::schedule(current_sp as usize) as u32
}
