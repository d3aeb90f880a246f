//! `LinearContext` — strict FIFO execution layered over an Executor.
//!
//! Every submission is dispatched on its own worker, but a shared
//! *execution gate* ensures only one worker runs its body at a time, and a
//! separate *queue-mutation gate* lets new submissions enqueue while an
//! older job is still running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use rpc_bus::CoreError;

use crate::executor::BoxedCallback;

/// A queued job: running it executes the body under panic recovery and
/// returns the callback already bound to the outcome, ready to post to the
/// parent Executor's channel.
type Job = Box<dyn FnOnce() -> BoxedCallback + Send>;

pub struct LinearContext {
    queue: Arc<SyncMutex<VecDeque<Job>>>,
    gate: Arc<AsyncMutex<()>>,
    pending: Arc<AtomicUsize>,
    callback_tx: mpsc::Sender<BoxedCallback>,
}

impl LinearContext {
    pub(crate) fn new(pending: Arc<AtomicUsize>, callback_tx: mpsc::Sender<BoxedCallback>) -> Self {
        Self {
            queue: Arc::new(SyncMutex::new(VecDeque::new())),
            gate: Arc::new(AsyncMutex::new(())),
            pending,
            callback_tx,
        }
    }

    /// Enqueue `body`/`callback` and spawn a worker for it. Bodies submitted
    /// from the same caller run in the order they were pushed; see
    /// `SPEC_FULL.md` §4.5 for the ordering argument.
    pub fn go_<T, B, C>(&self, body: B, callback: C)
    where
        B: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T, CoreError>) + Send + 'static,
        T: Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);

        let job: Job = Box::new(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
            match outcome {
                Ok(value) => Box::new(move || callback(Ok(value))),
                Err(panic) => {
                    let error = CoreError::panicked(panic);
                    tracing::error!(error = %error, "task-executor: LinearContext body panicked");
                    Box::new(move || callback(Err(error))) as BoxedCallback
                }
            }
        });
        self.queue.lock().push_back(job);

        let queue = self.queue.clone();
        let gate = self.gate.clone();
        let callback_tx = self.callback_tx.clone();
        tokio::spawn(async move {
            let delivery = {
                let _permit = gate.lock().await;
                // Never empty: our own push above happened before this
                // worker was spawned, so there is always at least one job
                // for us to pop by the time we acquire the gate.
                let job = queue.lock().pop_front().expect("linear context queue underflow");
                job()
            };
            if callback_tx.send(delivery).await.is_err() {
                tracing::warn!("task-executor: callback channel closed, dropping result");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use std::sync::Mutex;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn strict_fifo_order_across_many_jobs() {
        let mut executor = Executor::new(256);
        let ctx = executor.new_linear_context();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let order_body = order.clone();
            ctx.go_(
                move || {
                    order_body.lock().unwrap().push(i);
                },
                |_: Result<(), CoreError>| {},
            );
        }

        for _ in 0..100 {
            let callback = executor.recv().await.unwrap();
            executor.cb(callback);
        }

        assert!(executor.is_idle());
        let final_order = order.lock().unwrap().clone();
        let expected: Vec<usize> = (0..100).collect();
        assert_eq!(final_order, expected);
    }
}
