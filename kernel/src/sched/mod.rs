//! Scheduler: thread lifecycle states and the round-robin dispatch
//! decision.
//!
//! [`state`] defines the five-bitmask state representation in isolation;
//! [`scheduler`] is the kernel singleton built on top of it plus the
//! public entry points re-exported here and, ultimately, from the crate
//! root.

pub mod scheduler;
pub mod state;

pub use scheduler::{
    current_thread_id, kernel_init, state_of, thread_init, thread_pause, thread_resume,
    thread_sleep, thread_start, thread_start_all_new,
};
pub use state::State;
