//! Compile-time kernel configuration.
//!
//! Every tunable named in the external-interface table lives here as a
//! single `pub const`, mirroring how the parent codebase centralizes
//! workspace-wide tunables instead of scattering `#define`s across
//! translation units.

/// Maximum number of user threads the thread table can hold, not counting
/// the reserved idle thread at index [`MAX_THREADS`].
///
/// Round-robin advance uses explicit modulo arithmetic, so this value does
/// not need to be a power of two.
pub const MAX_THREADS: usize = 8;

/// Ticks a thread may run before the scheduler preempts it.
pub const TIME_SLICE_TICKS: u32 = 10;

/// Nominal period, in milliseconds, of the timer interrupt that drives
/// [`crate::timer::on_tick`].
pub const TIMER_PERIOD_MS: u32 = 1;

/// Total size in bytes of the heap region managed by [`crate::mm::heap`].
pub const HEAP_SIZE: usize = 1024;

/// Size in bytes of a heap chunk header.
pub const HEAP_HEADER_SIZE: usize = 4;

/// Minimum leftover payload size, in bytes, below which a satisfied
/// allocation consumes the whole chunk instead of splitting it.
pub const SPLIT_CUTOFF: usize = 16;

/// Number of `free` calls between automatic coalescing passes.
pub const DEFRAG_CUTOFF: u32 = 10;

/// Byte alignment guaranteed for every pointer returned by `alloc`.
pub const ALIGN: usize = 4;

/// Stack size, in words, reserved for the idle thread.
pub const IDLE_STACK_WORDS: usize = 64;

/// Nominal core clock frequency, in Hz, used only by the `cortex_m` platform
/// backend to compute the SysTick reload value for [`TIMER_PERIOD_MS`].
/// Clock tree bring-up is hardware glue and out of scope for this kernel;
/// a real board support package would derive this from its own PLL config
/// instead of a constant.
pub const CORE_CLOCK_HZ: u32 = 16_000_000;
