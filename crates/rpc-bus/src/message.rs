//! `CallInfo`/`RetInfo` — the in-flight request and completion records that
//! flow through the Server's call channel and back out through a reply sink.

use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::value::{Arity, Value};

/// Where a `RetInfo` should be delivered once a procedure has run.
pub enum ReplySink {
    /// A Client's single-slot synchronous reply channel.
    Sync(mpsc::Sender<RetInfo>),
    /// A Client's bounded asynchronous reply channel.
    Async(mpsc::Sender<RetInfo>),
    /// Fire-and-forget: the result is dropped.
    Discard,
}

/// The result shape actually carried by a `RetInfo`. On error this is
/// always the empty variant matching the call site's expected shape, never
/// a stray payload.
pub enum RetPayload {
    Void,
    One(Value),
    Multi(Vec<Value>),
}

/// The three callback shapes an async caller can provide, keyed to the
/// arity of the procedure it targets (spec §4.2 "Callback selection").
pub enum Callback {
    Void(Box<dyn FnOnce(Result<(), CoreError>) + Send>),
    One(Box<dyn FnOnce(Result<Value, CoreError>) + Send>),
    Multi(Box<dyn FnOnce(Result<Vec<Value>, CoreError>) + Send>),
}

impl Callback {
    pub fn arity(&self) -> Arity {
        match self {
            Callback::Void(_) => Arity::Void,
            Callback::One(_) => Arity::One,
            Callback::Multi(_) => Arity::Multi,
        }
    }

    /// A placeholder payload matching this callback's shape, for
    /// synthesizing an error `RetInfo` (Busy, NotFound, ...) before a
    /// procedure has actually run — the payload is ignored whenever the
    /// error slot is set, it only needs to satisfy `invoke_callback`'s
    /// shape check.
    pub fn empty_payload(&self) -> RetPayload {
        match self {
            Callback::Void(_) => RetPayload::Void,
            Callback::One(_) => RetPayload::One(Value::Null),
            Callback::Multi(_) => RetPayload::Multi(Vec::new()),
        }
    }
}

/// An in-flight request: which procedure, what arguments, where the result
/// goes, and an optional callback to forward verbatim into the `RetInfo`.
pub struct CallInfo<K> {
    pub key: K,
    pub args: Vec<Value>,
    pub sink: ReplySink,
    pub callback: Option<Callback>,
}

/// A completed call: the result (or an empty payload on error), the error
/// slot, and the callback carried through from the originating `CallInfo`.
///
/// Every `RetInfo` that reaches a Client through its async channel
/// corresponds to a submission that incremented the pending-async counter —
/// synthetic replies (Busy, or a resolution failure caught before
/// submission) never touch that channel at all, see
/// `Client::deliver_synthetic`.
pub struct RetInfo {
    pub payload: RetPayload,
    pub error: Option<CoreError>,
    pub callback: Option<Callback>,
}

impl RetInfo {
    pub fn ok_void() -> Self {
        RetInfo {
            payload: RetPayload::Void,
            error: None,
            callback: None,
        }
    }

    pub fn ok_one(value: Value) -> Self {
        RetInfo {
            payload: RetPayload::One(value),
            error: None,
            callback: None,
        }
    }

    pub fn ok_multi(values: Vec<Value>) -> Self {
        RetInfo {
            payload: RetPayload::Multi(values),
            error: None,
            callback: None,
        }
    }

    pub fn err_void(error: CoreError) -> Self {
        RetInfo {
            payload: RetPayload::Void,
            error: Some(error),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Option<Callback>) -> Self {
        self.callback = callback;
        self
    }

    /// Run the carried callback (if any) against this `RetInfo`'s payload,
    /// delivering an error to whichever variant the caller provided if the
    /// callback's expected shape doesn't match the payload's actual shape
    /// (spec §4.2: "reported as an error through the callback itself, not
    /// by panicking").
    pub(crate) fn invoke_callback(self) {
        let Some(callback) = self.callback else {
            return;
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dispatch_callback(callback, self.payload, self.error);
        }));
        if let Err(payload) = result {
            let message = crate::error::CoreError::panicked(payload);
            tracing::error!(error = %message, "async callback panicked");
        }
    }
}

fn dispatch_callback(callback: Callback, payload: RetPayload, error: Option<CoreError>) {
    match (callback, payload) {
        (Callback::Void(f), RetPayload::Void) => f(error.map_or(Ok(()), Err)),
        (Callback::One(f), RetPayload::One(v)) => f(error.map_or(Ok(v), Err)),
        (Callback::Multi(f), RetPayload::Multi(v)) => f(error.map_or(Ok(v), Err)),
        // Shape mismatch between the callback the caller registered and the
        // payload actually carried back: report ArityMismatch through
        // whichever callback variant is present rather than panicking.
        (Callback::Void(f), _) => f(Err(CoreError::ArityMismatch)),
        (Callback::One(f), _) => f(Err(CoreError::ArityMismatch)),
        (Callback::Multi(f), _) => f(Err(CoreError::ArityMismatch)),
    }
}
