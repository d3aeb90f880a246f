//! `Executor` — spawns one worker per submission and funnels completion
//! callbacks into a single bounded channel for the owner to drain.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use rpc_bus::CoreError;

/// A type-erased, already-bound completion notification: calling it invokes
/// the user's callback with its result. Stored this way so the channel
/// doesn't need to be generic over every task's result type.
pub type BoxedCallback = Box<dyn FnOnce() + Send>;

pub struct Executor {
    callback_tx: mpsc::Sender<BoxedCallback>,
    callback_rx: mpsc::Receiver<BoxedCallback>,
    pending: Arc<AtomicUsize>,
    closing: Arc<AtomicBool>,
}

impl Executor {
    /// Create an Executor with a callback channel of the given capacity and
    /// zero pending tasks.
    pub fn new(capacity: usize) -> Self {
        let (callback_tx, callback_rx) = mpsc::channel(capacity);
        Self {
            callback_tx,
            callback_rx,
            pending: Arc::new(AtomicUsize::new(0)),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn `body` on a new worker; once it finishes (or panics), post
    /// `callback` bound to its outcome to the callback channel for the
    /// owner to drain via [`Executor::cb`]. Never suspends the caller.
    ///
    /// If called after [`Executor::close`] has started, rejects immediately
    /// with `ServerClosed` instead of spawning — the source has no interlock
    /// here (spec §9 Open Questions); this flag exists only to give late
    /// submitters a clean error instead of undefined behavior.
    pub fn go_<T, B, C>(&self, body: B, callback: C)
    where
        B: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T, CoreError>) + Send + 'static,
        T: Send + 'static,
    {
        if self.closing.load(Ordering::SeqCst) {
            tracing::warn!("task-executor: go_ submitted after close, rejecting");
            callback(Err(CoreError::ServerClosed));
            return;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        let callback_tx = self.callback_tx.clone();
        tokio::spawn(async move {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
            let delivery: BoxedCallback = match outcome {
                Ok(value) => Box::new(move || callback(Ok(value))),
                Err(panic) => {
                    let error = CoreError::panicked(panic);
                    tracing::error!(error = %error, "task-executor: task body panicked");
                    Box::new(move || callback(Err(error)))
                }
            };
            if callback_tx.send(delivery).await.is_err() {
                tracing::warn!("task-executor: callback channel closed, dropping result");
            }
        });
    }

    /// Run a callback drained from the channel inside a panic-recovery
    /// scope, decrementing the pending counter whether or not it panics.
    pub fn cb(&mut self, callback: BoxedCallback) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback));
        self.pending.fetch_sub(1, Ordering::SeqCst);
        if let Err(panic) = outcome {
            let error = CoreError::panicked(panic);
            tracing::error!(error = %error, "task-executor: callback panicked");
        }
    }

    /// Receive the next callback for the owner to pass to [`Executor::cb`].
    pub async fn recv(&mut self) -> Option<BoxedCallback> {
        self.callback_rx.recv().await
    }

    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Block until the pending counter reaches zero, draining and running
    /// one callback at a time. Requires the caller to have stopped
    /// submitting new work; the channel itself is never explicitly closed.
    pub async fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        while self.pending.load(Ordering::SeqCst) != 0 {
            match self.callback_rx.recv().await {
                Some(callback) => self.cb(callback),
                None => break,
            }
        }
    }

    /// Create a new strictly FIFO-ordered context sharing this Executor's
    /// pending counter and callback channel.
    pub fn new_linear_context(&self) -> crate::linear::LinearContext {
        crate::linear::LinearContext::new(self.pending.clone(), self.callback_tx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn go_delivers_value_through_callback() {
        let mut executor = Executor::new(8);
        let result = Arc::new(Mutex::new(None));
        let result_cb = result.clone();
        executor.go_(
            || 40 + 2,
            move |r| *result_cb.lock().unwrap() = Some(r),
        );

        let callback = executor.recv().await.unwrap();
        executor.cb(callback);

        assert!(executor.is_idle());
        assert_eq!(*result.lock().unwrap(), Some(Ok(42)));
    }

    #[tokio::test]
    async fn panic_in_body_is_contained_and_callback_still_fires() {
        let mut executor = Executor::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        executor.go_::<(), _, _>(
            || panic!("boom"),
            move |r| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
                assert!(matches!(r, Err(CoreError::Panicked { .. })));
            },
        );

        let callback = executor.recv().await.unwrap();
        executor.cb(callback);

        assert!(executor.is_idle());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_drains_until_idle() {
        let mut executor = Executor::new(8);
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let fired_cb = fired.clone();
            executor.go_(|| (), move |_| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            });
        }

        executor.close().await;

        assert!(executor.is_idle());
        assert_eq!(fired.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn go_after_close_is_rejected_without_panicking() {
        let mut executor = Executor::new(8);
        executor.close().await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        executor.go_(|| (), move |r| {
            if matches!(r, Err(CoreError::ServerClosed)) {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(executor.is_idle());
    }
}
