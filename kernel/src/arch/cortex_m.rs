//! Cortex-M hardware backend.
//!
//! Interrupt masking goes through `cortex-m`'s PRIMASK accessors; the
//! deferred context switch goes through PendSV, pended via the `SCB`
//! peripheral and handled by a naked exception handler that hands off to
//! [`super::context::switch_trampoline`]. The tick source is SysTick,
//! wired to [`crate::timer::on_tick`].

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;
use cortex_m::register::primask;

use super::Platform;
use crate::config::CORE_CLOCK_HZ;

pub struct CortexM;

impl Platform for CortexM {
    fn enter_critical(&self) -> usize {
        let was_active = primask::read().is_active();
        cortex_m::interrupt::disable();
        was_active as usize
    }

    unsafe fn exit_critical(&self, saved: usize) {
        if saved != 0 {
            // SAFETY: re-enabling interrupts is sound once the critical
            // section's shared-state accesses are complete.
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }

    fn pend_switch(&self) {
        SCB::set_pendsv();
    }

    fn wait_for_interrupt(&self) {
        cortex_m::asm::wfi();
    }

    fn configure_tick(&self, period_ms: u32) {
        // SAFETY: kernel_init runs once at startup, before interrupts are
        // enabled and before any other code touches SysTick; the reset
        // handler that would otherwise own these peripherals is hardware
        // bring-up and out of scope here.
        let mut syst = unsafe { cortex_m::Peripherals::steal().SYST };
        let reload = (CORE_CLOCK_HZ / 1000) * period_ms - 1;
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(reload);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
    }

    fn configure_switch_priority(&self) {
        // SAFETY: see configure_tick; same one-time startup window.
        let mut scb = unsafe { cortex_m::Peripherals::steal().SCB };
        // SAFETY: PendSV never runs with a priority that could starve a
        // higher-priority exception of the critical sections it needs;
        // setting it to the lowest priority only ever delays PendSV itself.
        unsafe {
            scb.set_priority(SystemHandler::PendSV, 0xff);
        }
    }
}

/// SysTick exception handler. Drives the tick counter and preemption check.
///
/// Not `#[naked]`: it makes no assumption about the interrupted thread's
/// register state beyond what the AAPCS exception-entry contract already
/// guarantees, so an ordinary `extern "C"` handler is sufficient.
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    crate::timer::on_tick();
}

/// PendSV exception handler: the kernel's context switch.
///
/// Saves the outgoing thread's callee-saved registers below its current PSP,
/// calls [`super::context::switch_trampoline`] with that PSP to obtain the
/// incoming thread's saved PSP, restores its callee-saved registers, and
/// returns to thread mode on the process stack.
///
/// # Safety
/// Must only run as the CPU's PendSV exception handler: it assumes the
/// exception-entry stack frame already pushed by hardware (r0-r3, r12, lr,
/// pc, xpsr) and that PSP points at a valid thread stack.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr lr, =0xFFFFFFFD",
        "bx lr",
        switch = sym super::context::switch_trampoline,
    );
}
