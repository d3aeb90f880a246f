//! A callback-oriented task executor: spawns user task bodies on new
//! workers, funnels their completion callbacks into a single bounded
//! channel for the owner to drain, and provides a FIFO-ordered variant
//! (`LinearContext`) over the same pending-task accounting.
//!
//! Shares its panic/error taxonomy with `rpc-bus` (`CoreError`) rather than
//! inventing a second one — both crates express the same "single
//! process-wide `stack_buffer_size`" configuration knob from `rpc-bus`.

mod executor;
mod linear;

pub use executor::{BoxedCallback, Executor};
pub use linear::LinearContext;

pub use rpc_bus::{set_stack_buffer_size, stack_buffer_size, CoreError};
