//! Call-time error taxonomy.
//!
//! These are always delivered through a `RetInfo`, never by unwinding up the
//! caller's stack — see `SPEC_FULL.md` §7.

/// Errors a caller can observe from a call, async callback, or close.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("no procedure registered for this key")]
    NotFound,

    #[error("procedure arity does not match the caller's expectation")]
    ArityMismatch,

    #[error("server closed")]
    ServerClosed,

    #[error("async call channel at capacity")]
    Busy,

    #[error("procedure panicked: {message}")]
    Panicked {
        message: String,
        stack: Option<String>,
    },
}

impl CoreError {
    pub fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = panic_message(&payload);
        let stack = capture_stack();
        CoreError::Panicked { message, stack }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn capture_stack() -> Option<String> {
    let budget = crate::config::stack_buffer_size();
    if budget == 0 {
        return None;
    }
    let bt = std::backtrace::Backtrace::force_capture();
    let mut rendered = format!("{bt}");
    if rendered.len() > budget {
        let mut end = budget;
        while !rendered.is_char_boundary(end) {
            end -= 1;
        }
        rendered.truncate(end);
    }
    Some(rendered)
}
