//! `Client` — a per-caller handle bound to exactly one `Server`. See
//! `SPEC_FULL.md` §4.2.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::message::{CallInfo, Callback, RetInfo, RetPayload, ReplySink};
use crate::procedure::Registry;
use crate::value::{Arity, Value};

pub struct Client<K> {
    registry: Arc<Registry<K>>,
    call_tx: mpsc::Sender<CallInfo<K>>,
    sync_tx: mpsc::Sender<RetInfo>,
    sync_rx: mpsc::Receiver<RetInfo>,
    async_tx: mpsc::Sender<RetInfo>,
    async_rx: mpsc::Receiver<RetInfo>,
    async_capacity: usize,
    pending_async: usize,
}

impl<K> Client<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub(crate) fn new(
        registry: Arc<Registry<K>>,
        call_tx: mpsc::Sender<CallInfo<K>>,
        async_capacity: usize,
    ) -> Self {
        let (sync_tx, sync_rx) = mpsc::channel(1);
        let (async_tx, async_rx) = mpsc::channel(async_capacity.max(1));
        Self {
            registry,
            call_tx,
            sync_tx,
            sync_rx,
            async_tx,
            async_rx,
            async_capacity,
            pending_async: 0,
        }
    }

    // --- synchronous calls (spec §4.2 "Synchronous call") -----------------

    pub async fn call_void(&mut self, key: K, args: Vec<Value>) -> Result<(), CoreError> {
        self.registry.resolve(&key, Arity::Void)?;
        match self.call_sync(key, args).await?.payload {
            RetPayload::Void => Ok(()),
            _ => Err(CoreError::ArityMismatch),
        }
    }

    pub async fn call_one(&mut self, key: K, args: Vec<Value>) -> Result<Value, CoreError> {
        self.registry.resolve(&key, Arity::One)?;
        match self.call_sync(key, args).await?.payload {
            RetPayload::One(v) => Ok(v),
            _ => Err(CoreError::ArityMismatch),
        }
    }

    pub async fn call_multi(&mut self, key: K, args: Vec<Value>) -> Result<Vec<Value>, CoreError> {
        self.registry.resolve(&key, Arity::Multi)?;
        match self.call_sync(key, args).await?.payload {
            RetPayload::Multi(v) => Ok(v),
            _ => Err(CoreError::ArityMismatch),
        }
    }

    /// Submit over the sync reply sink and await exactly one `RetInfo`.
    /// Reentrancy-hostile: never call this from the task driving the bound
    /// Server's own dispatch loop (it would deadlock waiting on itself).
    async fn call_sync(&mut self, key: K, args: Vec<Value>) -> Result<RetInfo, CoreError> {
        let ci = CallInfo {
            key,
            args,
            sink: ReplySink::Sync(self.sync_tx.clone()),
            callback: None,
        };
        self.call_tx
            .send(ci)
            .await
            .map_err(|_| CoreError::ServerClosed)?;
        let ri = self
            .sync_rx
            .recv()
            .await
            .ok_or(CoreError::ServerClosed)?;
        match ri.error {
            Some(e) => Err(e),
            None => Ok(ri),
        }
    }

    // --- asynchronous calls (spec §4.2 "Asynchronous call") ---------------

    pub async fn async_call_void(
        &mut self,
        key: K,
        args: Vec<Value>,
        callback: impl FnOnce(Result<(), CoreError>) + Send + 'static,
    ) {
        self.async_call(key, args, Callback::Void(Box::new(callback)))
            .await;
    }

    pub async fn async_call_one(
        &mut self,
        key: K,
        args: Vec<Value>,
        callback: impl FnOnce(Result<Value, CoreError>) + Send + 'static,
    ) {
        self.async_call(key, args, Callback::One(Box::new(callback)))
            .await;
    }

    pub async fn async_call_multi(
        &mut self,
        key: K,
        args: Vec<Value>,
        callback: impl FnOnce(Result<Vec<Value>, CoreError>) + Send + 'static,
    ) {
        self.async_call(key, args, Callback::Multi(Box::new(callback)))
            .await;
    }

    async fn async_call(&mut self, key: K, args: Vec<Value>, callback: Callback) {
        if self.pending_async >= self.async_capacity {
            self.deliver_synthetic(callback, CoreError::Busy);
            return;
        }

        let expected = callback.arity();
        if let Err(e) = self.registry.resolve(&key, expected) {
            self.deliver_synthetic(callback, e);
            return;
        }

        let ci = CallInfo {
            key,
            args,
            sink: ReplySink::Async(self.async_tx.clone()),
            callback: Some(callback),
        };
        match self.call_tx.try_send(ci) {
            Ok(()) => self.pending_async += 1,
            Err(err) => {
                if let Some(callback) = recover_callback(err) {
                    self.deliver_synthetic(callback, CoreError::Busy);
                }
            }
        }
    }

    /// Invoke the callback inline with a synthetic error, bypassing the
    /// Server and the async channel entirely — spec §4.2 steps 1 and 3
    /// ("never block the caller"). This never incremented the pending
    /// counter, so it must never consume a slot on the async channel either:
    /// that channel is sized to exactly the pending cap, and a real
    /// in-flight reply landing there must never find it full because a
    /// Busy (or repeated Busy) fast-fail parked in it instead.
    fn deliver_synthetic(&self, callback: Callback, error: CoreError) {
        let ri = RetInfo {
            payload: callback.empty_payload(),
            error: Some(error),
            callback: Some(callback),
        };
        ri.invoke_callback();
    }

    // --- draining the async channel (spec §4.2 "Execute async reply") -----

    /// The receiving half of the async reply channel, for the owner's event
    /// loop to `select!` on directly.
    pub fn async_return_channel(&mut self) -> &mut mpsc::Receiver<RetInfo> {
        &mut self.async_rx
    }

    /// Invoked by the owner on a `RetInfo` drained from
    /// [`Client::async_return_channel`]. Every reply reaching this channel
    /// corresponds to a submission that incremented the pending counter —
    /// synthetic replies are delivered inline by `deliver_synthetic` and
    /// never pass through here — so the decrement is unconditional.
    pub fn cb(&mut self, ri: RetInfo) {
        self.pending_async = self.pending_async.saturating_sub(1);
        ri.invoke_callback();
    }

    pub fn is_idle(&self) -> bool {
        self.pending_async == 0
    }

    /// Drain and invoke every reply currently buffered on the async
    /// channel. Does not wait for in-flight calls that haven't replied yet
    /// and does not close the bound Server (spec §4.2 "Close").
    pub async fn close(&mut self) {
        while let Ok(ri) = self.async_rx.try_recv() {
            self.cb(ri);
        }
    }
}

fn recover_callback(err: mpsc::error::TrySendError<CallInfo<impl Eq + Hash + Clone + Debug>>) -> Option<Callback> {
    match err {
        mpsc::error::TrySendError::Full(ci) => ci.callback,
        mpsc::error::TrySendError::Closed(ci) => ci.callback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::Procedure;
    use crate::server::Server;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc as StdArc, Barrier};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_fast_fail_when_over_capacity() {
        let server: Server<&'static str> = Server::new(8);
        let barrier = StdArc::new(Barrier::new(2));
        let barrier_proc = barrier.clone();
        server.register(
            "wait",
            Procedure::void(move |_args| {
                // Block the dispatch loop's worker thread until the test
                // releases us — exec() is synchronous, so this genuinely
                // blocks, as a real blocking procedure would.
                barrier_proc.wait();
                Ok(())
            }),
        );

        let mut client = server.open(1);
        let mut dispatch_server = server;
        let dispatch = tokio::spawn(async move {
            while let Some(ci) = dispatch_server.recv().await {
                dispatch_server.exec(ci);
            }
        });

        let successes = StdArc::new(AtomicUsize::new(0));
        let busies = StdArc::new(AtomicUsize::new(0));

        let s1 = successes.clone();
        client
            .async_call_void("wait", vec![], move |r| {
                if r.is_ok() {
                    s1.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        let b2 = busies.clone();
        client
            .async_call_void("wait", vec![], move |r| {
                if matches!(r, Err(CoreError::Busy)) {
                    b2.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        barrier.wait();
        // Drain both replies. Bounded so a dropped callback fails fast
        // instead of hanging the test suite.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !client.is_idle() {
                if let Some(ri) = client.async_return_channel().recv().await {
                    client.cb(ri);
                }
            }
        })
        .await
        .expect("draining the async channel timed out, a reply was likely dropped");

        // Call #2 fast-failed without touching the procedure; its callback
        // only actually runs once drained above.
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(busies.load(Ordering::SeqCst), 1);

        dispatch.abort();
    }
}
