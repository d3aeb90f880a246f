//! `Server` — owns the procedure registry and the call-request channel a
//! single owner worker drains. Grounded on the teacher's `bus::rpc` module
//! (in-process request/reply registry over `tokio::sync::mpsc`) and on
//! `rodengine`'s `Runtime::run_procedure_with_refs` for `exec`'s
//! panic-recovery shape.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::Client;
use crate::error::CoreError;
use crate::message::{CallInfo, Callback, RetInfo, RetPayload, ReplySink};
use crate::procedure::{Procedure, Registry};
use crate::value::Value;

pub struct Server<K> {
    registry: Arc<Registry<K>>,
    call_tx: mpsc::Sender<CallInfo<K>>,
    call_rx: mpsc::Receiver<CallInfo<K>>,
}

impl<K> Server<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create a Server with an empty registry and a call-request channel of
    /// the given capacity (spec §4.1 "Construction").
    pub fn new(capacity: usize) -> Self {
        let (call_tx, call_rx) = mpsc::channel(capacity);
        Self {
            registry: Arc::new(Registry::new()),
            call_tx,
            call_rx,
        }
    }

    /// Register a procedure under `key`. Panics if `key` is already taken
    /// (spec §4.1 "Registration" — a fatal, setup-time error).
    pub fn register(&self, key: K, procedure: Procedure) {
        self.registry.register(key, procedure);
    }

    /// Drain one `CallInfo` from the call channel. `None` once the channel
    /// is closed and drained — the owner's dispatch loop is typically
    /// `while let Some(ci) = server.recv().await { server.exec(ci); }`.
    pub async fn recv(&mut self) -> Option<CallInfo<K>> {
        self.call_rx.recv().await
    }

    /// Run a single call to completion and route its result to the
    /// recorded reply sink. Synchronous on the calling task — this is the
    /// sole place procedures actually execute (spec §4.1 "Execution").
    pub fn exec(&self, ci: CallInfo<K>) {
        let CallInfo {
            key,
            args,
            sink,
            callback,
        } = ci;

        let procedure = self.registry.get(&key);
        let ri = match procedure {
            None => RetInfo {
                payload: callback
                    .as_ref()
                    .map(Callback::empty_payload)
                    .unwrap_or(RetPayload::Void),
                error: Some(CoreError::NotFound),
                callback,
            },
            Some(procedure) => run_procedure(&procedure, &args, callback),
        };

        Self::ret(sink, ri);
    }

    /// Route `ri` to `sink` (spec §4.3). Reply-channel failures (closed or
    /// unexpectedly full) are logged and swallowed — they never cascade.
    fn ret(sink: ReplySink, ri: RetInfo) {
        match sink {
            ReplySink::Sync(tx) => {
                if tx.try_send(ri).is_err() {
                    tracing::error!("rpc-bus: failed to deliver sync reply, receiver gone");
                }
            }
            ReplySink::Async(tx) => {
                if tx.try_send(ri).is_err() {
                    tracing::warn!("rpc-bus: failed to deliver async reply, receiver gone");
                }
            }
            ReplySink::Discard => {}
        }
    }

    /// Fire-and-forget submission: no reply sink, result is dropped.
    pub async fn go_(&self, key: K, args: Vec<Value>) {
        let ci = CallInfo {
            key,
            args,
            sink: ReplySink::Discard,
            callback: None,
        };
        if self.call_tx.send(ci).await.is_err() {
            tracing::warn!("rpc-bus: go_ submitted after server close");
        }
    }

    /// Open a new Client bound to this Server (spec §4.2 "Open").
    pub fn open(&self, async_capacity: usize) -> Client<K> {
        Client::new(self.registry.clone(), self.call_tx.clone(), async_capacity)
    }

    /// Synchronous void call via a transient Client (spec §4.1 "Convenience
    /// call methods"). Reentrancy-hostile: never call this from the task
    /// driving this Server's own `recv`/`exec` loop.
    pub async fn call_void(&self, key: K, args: Vec<Value>) -> Result<(), CoreError> {
        self.open(1).call_void(key, args).await
    }

    pub async fn call_one(&self, key: K, args: Vec<Value>) -> Result<Value, CoreError> {
        self.open(1).call_one(key, args).await
    }

    pub async fn call_multi(&self, key: K, args: Vec<Value>) -> Result<Vec<Value>, CoreError> {
        self.open(1).call_multi(key, args).await
    }

    /// Close the call channel and fail every CallInfo still queued with
    /// `ServerClosed` (spec §4.1 "Close").
    pub async fn close(&mut self) {
        self.call_rx.close();
        while let Ok(ci) = self.call_rx.try_recv() {
            let ri = RetInfo {
                payload: ci
                    .callback
                    .as_ref()
                    .map(Callback::empty_payload)
                    .unwrap_or(RetPayload::Void),
                error: Some(CoreError::ServerClosed),
                callback: ci.callback,
            };
            Self::ret(ci.sink, ri);
        }
    }
}

fn run_procedure(procedure: &Procedure, args: &[Value], callback: Option<Callback>) -> RetInfo {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| call(procedure, args)));
    match result {
        Ok(Outcome::Void(Ok(()))) => RetInfo::ok_void().with_callback(callback),
        Ok(Outcome::Void(Err(e))) => RetInfo::err_void(e).with_callback(callback),
        Ok(Outcome::One(Ok(v))) => RetInfo::ok_one(v).with_callback(callback),
        Ok(Outcome::One(Err(e))) => RetInfo {
            payload: RetPayload::One(Value::Null),
            error: Some(e),
            callback,
        },
        Ok(Outcome::Multi(Ok(v))) => RetInfo::ok_multi(v).with_callback(callback),
        Ok(Outcome::Multi(Err(e))) => RetInfo {
            payload: RetPayload::Multi(Vec::new()),
            error: Some(e),
            callback,
        },
        Err(panic) => {
            let error = CoreError::panicked(panic);
            tracing::error!(error = %error, "rpc-bus: procedure panicked");
            RetInfo {
                payload: callback
                    .as_ref()
                    .map(Callback::empty_payload)
                    .unwrap_or(RetPayload::Void),
                error: Some(error),
                callback,
            }
        }
    }
}

enum Outcome {
    Void(Result<(), CoreError>),
    One(Result<Value, CoreError>),
    Multi(Result<Vec<Value>, CoreError>),
}

/// Invoke the procedure. Kept separate from `run_procedure` so the
/// `catch_unwind` boundary covers exactly the user procedure call, matching
/// `rodengine::run_procedure_with_refs`'s shape. Arity is already guaranteed
/// to match by the time a CallInfo reaches here — `Client::resolve` checks
/// it at call time, and `go_`/`Server::call_*` only ever build a CallInfo
/// from a `Procedure` they just looked up themselves.
fn call(procedure: &Procedure, args: &[Value]) -> Outcome {
    match procedure {
        Procedure::Void(f) => Outcome::Void(f(args)),
        Procedure::One(f) => Outcome::One(f(args)),
        Procedure::Multi(f) => Outcome::Multi(f(args)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_dispatch_loop(mut server: Server<&'static str>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(ci) = server.recv().await {
                server.exec(ci);
            }
        })
    }

    #[tokio::test]
    async fn synchronous_single_value_call() {
        let server: Server<&'static str> = Server::new(8);
        server.register(
            "add",
            Procedure::one(|args| {
                let a = args[0].as_i64().unwrap_or(0);
                let b = args[1].as_i64().unwrap_or(0);
                Ok(Value::from(a + b))
            }),
        );
        let mut client = server.open(4);
        let dispatch = spawn_dispatch_loop(server);

        let result = client.call_one("add", vec![Value::from(1), Value::from(2)]).await;
        assert_eq!(result.unwrap(), Value::from(3));

        dispatch.abort();
    }

    #[tokio::test]
    async fn arity_mismatch_is_reported() {
        let server: Server<&'static str> = Server::new(8);
        server.register(
            "add",
            Procedure::one(|args| Ok(Value::from(args[0].as_i64().unwrap_or(0)))),
        );
        let mut client = server.open(4);
        let dispatch = spawn_dispatch_loop(server);

        let err = client
            .call_multi("add", vec![Value::from(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ArityMismatch));

        dispatch.abort();
    }

    #[tokio::test]
    async fn unknown_procedure_is_not_found() {
        let server: Server<&'static str> = Server::new(8);
        let mut client = server.open(4);
        let dispatch = spawn_dispatch_loop(server);

        let err = client.call_void("nope", vec![]).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));

        dispatch.abort();
    }

    #[tokio::test]
    async fn panic_in_procedure_is_contained() {
        let server: Server<&'static str> = Server::new(8);
        server.register(
            "boom",
            Procedure::one(|_args| panic!("kaboom")),
        );
        let mut client = server.open(4);
        let dispatch = spawn_dispatch_loop(server);

        let err = client.call_one("boom", vec![]).await.unwrap_err();
        match err {
            CoreError::Panicked { message, .. } => assert_eq!(message, "kaboom"),
            other => panic!("expected Panicked, got {other:?}"),
        }

        dispatch.abort();
    }

    #[tokio::test]
    async fn close_fails_queued_calls_with_server_closed() {
        let mut server: Server<&'static str> = Server::new(8);
        server.register("slow", Procedure::void(|_| Ok(())));
        let mut client = server.open(4);

        // Don't spawn a dispatch loop: the call sits in the channel until close().
        let call = tokio::spawn(async move { client.call_void("slow", vec![]).await });

        // Give the call a moment to land in the channel before closing.
        tokio::task::yield_now().await;
        server.close().await;

        let result = call.await.unwrap();
        assert!(matches!(result, Err(CoreError::ServerClosed)));
    }
}
