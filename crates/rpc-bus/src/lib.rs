//! In-process request/reply RPC core: a single-owner `Server` holding a
//! procedure registry, and per-caller `Client` handles bound to it.
//!
//! No network transport, no serialization beyond the opaque [`Value`]
//! payload, no persistence — everything here lives inside one process, as
//! plain channels and closures. See `SPEC_FULL.md` §4.1-4.3.

mod client;
mod config;
mod error;
mod message;
mod procedure;
mod server;
mod value;

pub use client::Client;
pub use config::{set_stack_buffer_size, stack_buffer_size};
pub use error::CoreError;
pub use message::{CallInfo, Callback, ReplySink, RetInfo, RetPayload};
pub use procedure::Procedure;
pub use server::Server;
pub use value::{Arity, Value};
