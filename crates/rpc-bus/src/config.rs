//! Process-wide tuning knob shared by every `Server`/`Client` in the process.

use std::sync::atomic::{AtomicUsize, Ordering};

static STACK_BUFFER_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Set the number of bytes of backtrace to capture (and log) when a
/// procedure panics. `0` disables backtrace capture — only the panic
/// message is logged.
pub fn set_stack_buffer_size(bytes: usize) {
    STACK_BUFFER_SIZE.store(bytes, Ordering::Relaxed);
}

/// Current stack buffer size, see [`set_stack_buffer_size`].
pub fn stack_buffer_size() -> usize {
    STACK_BUFFER_SIZE.load(Ordering::Relaxed)
}
