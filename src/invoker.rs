//! Pooled invocation of object client calls
//!
//! Calls are not run when submitted. Each one becomes a pending call owned by
//! the queue, and the drain scheduler polls the pending set (and flushes the
//! client) until every call has settled. Calls that wait on the tokio reactor
//! wake the drain task directly instead of waiting for its next tick.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::task::noop_waker_ref;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::trace;

use crate::client::{ClientOperation, ObjectClient};
use crate::drain::{DrainScheduler, QueuePump};
use crate::error::{BackendError, BackendResult};

/// A submitted call; resolves to its operation once settled
type PendingCall = BoxFuture<'static, ClientOperation>;

struct QueueInner {
    client: Arc<dyn ObjectClient>,
    pending: Mutex<FuturesUnordered<PendingCall>>,
    outstanding: AtomicUsize,
}

impl QueueInner {
    /// Poll every woken pending call once, retiring the ones that settle
    ///
    /// Returns the number of calls retired. Wakeups from calls still pending
    /// are delivered to `cx`.
    fn poll_pending(&self, cx: &mut Context<'_>) -> usize {
        let mut pending = self.pending.lock();
        let mut settled = 0;

        while let Poll::Ready(Some(operation)) = pending.poll_next_unpin(cx) {
            let left = self.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
            trace!("{} settled ({} outstanding)", operation, left);
            settled += 1;
        }
        settled
    }
}

impl QueuePump for QueueInner {
    fn pump(&self) -> BackendResult<()> {
        // Newly submitted calls get their first poll before the flush so that
        // anything they queue inside the client runs in this same tick.
        let mut cx = Context::from_waker(noop_waker_ref());
        self.poll_pending(&mut cx);
        let flushed = self.client.flush();
        self.poll_pending(&mut cx);
        flushed
    }

    fn poll_progress(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.poll_pending(cx) > 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn is_idle(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }
}

/// Queue of outstanding client calls
#[derive(Clone)]
pub struct InvocationQueue {
    inner: Arc<QueueInner>,
    drain: Arc<DrainScheduler>,
}

impl InvocationQueue {
    pub fn new(client: Arc<dyn ObjectClient>, runtime: Handle, drain_interval: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                client,
                pending: Mutex::new(FuturesUnordered::new()),
                outstanding: AtomicUsize::new(0),
            }),
            drain: DrainScheduler::new(runtime, drain_interval),
        }
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.inner.client
    }

    /// Submit one client call
    ///
    /// `call` receives the client and returns the call's future; that future
    /// is only polled by the drain task. A client error is handed to the
    /// caller unchanged.
    pub fn invoke<T, F, Fut>(&self, operation: ClientOperation, call: F) -> Invocation<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ObjectClient>) -> Fut,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let future = call(Arc::clone(&self.inner.client));

        let pending: PendingCall = async move {
            let result = future.await;
            if let Err(e) = &result {
                trace!("{} rejected: {}", operation, e);
            }
            let _ = tx.send(result);
            operation
        }
        .boxed();

        // Counted before it becomes visible to the drain task
        let outstanding = self.inner.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.pending.lock().push(pending);
        trace!("{} queued ({} outstanding)", operation, outstanding);

        self.drain.ensure_running(self.inner.clone());

        Invocation { operation, rx }
    }

    /// True when no call is waiting to settle
    pub fn is_empty(&self) -> bool {
        self.inner.is_idle()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.drain.is_running()
    }

    pub fn drain_starts(&self) -> u64 {
        self.drain.starts()
    }

    /// Stop draining and drop every pending call
    ///
    /// Callers still waiting on an invocation receive `BackendError::Cancelled`.
    pub fn shutdown(&self) {
        self.drain.shutdown();
        let mut pending = self.inner.pending.lock();
        let dropped = pending.len();
        pending.clear();
        self.inner.outstanding.fetch_sub(dropped, Ordering::SeqCst);
    }
}

/// Result of a submitted call
#[must_use = "invocations settle in the background but their result is only seen when awaited"]
pub struct Invocation<T> {
    operation: ClientOperation,
    rx: oneshot::Receiver<BackendResult<T>>,
}

impl<T> Invocation<T> {
    pub fn operation(&self) -> ClientOperation {
        self.operation
    }
}

impl<T> Future for Invocation<T> {
    type Output = BackendResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BackendError::Cancelled { operation })),
            Poll::Pending => Poll::Pending,
        }
    }
}
