//! Platform abstraction.
//!
//! Everything the scheduler needs from the outside world — a tick source,
//! a way to request a deferred context switch, interrupt masking, and the
//! context-switch mechanism itself — is expressed as the [`Platform`]
//! trait. Two backends implement it: [`cortex_m`] for real ARM Cortex-M
//! hardware, and [`host`] for running the scheduler core under `cargo test`
//! on a development machine with no hardware present.

#[cfg(target_arch = "arm")]
pub mod cortex_m;
#[cfg(not(target_arch = "arm"))]
pub mod host;

pub mod context;

/// Operations the scheduler needs from the platform it runs on.
pub trait Platform {
    /// Disable interrupts, returning an opaque token that records whether
    /// they were already disabled.
    fn enter_critical(&self) -> usize;

    /// Restore the interrupt state recorded by a matching `enter_critical`.
    ///
    /// # Safety
    /// `saved` must be the token returned by the `enter_critical` call this
    /// restores; tokens must not be reused or restored out of order.
    unsafe fn exit_critical(&self, saved: usize);

    /// Request a context switch at the next opportunity (lowest priority,
    /// deferred until no other exception is active).
    fn pend_switch(&self);

    /// Block until the next interrupt, used by the idle thread.
    fn wait_for_interrupt(&self);

    /// Program the periodic tick source to fire every `period_ms`
    /// milliseconds, feeding [`crate::timer::on_tick`]. Called once from
    /// `kernel_init`.
    fn configure_tick(&self, period_ms: u32);

    /// Pin the deferred-switch interrupt to the lowest priority the
    /// hardware supports, so it only runs once every higher-priority
    /// interrupt (in particular the tick) has drained. Called once from
    /// `kernel_init`.
    fn configure_switch_priority(&self);
}

#[cfg(target_arch = "arm")]
pub fn active() -> &'static dyn Platform {
    &cortex_m::CortexM
}

#[cfg(not(target_arch = "arm"))]
pub fn active() -> &'static dyn Platform {
    &host::Host
}
