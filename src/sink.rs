//! Buffering write sink
//!
//! Object stores only take whole objects, so everything written to the sink
//! is held in memory. Shutting the sink down hands the complete payload to a
//! commit function (the adapter's put) and completes only once that commit
//! has settled.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::future::{poll_fn, BoxFuture};
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::error::{BucketFsError, Result};
use crate::handle::{HandleGuard, StreamHandle};

/// Consumes the buffered payload once the sink is closed
pub type CommitFn = Box<dyn FnOnce(Bytes) -> BoxFuture<'static, Result<()>> + Send>;

enum SinkState {
    Open(CommitFn),
    Committing(BoxFuture<'static, Result<()>>),
    Closed,
    Failed,
}

/// Write target that accumulates bytes until it is closed
pub struct BufferedSink {
    key: String,
    guard: HandleGuard,
    buffer: BytesMut,
    state: SinkState,
}

impl BufferedSink {
    pub fn new<F>(key: impl Into<String>, guard: HandleGuard, commit: F) -> Self
    where
        F: FnOnce(Bytes) -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        Self {
            key: key.into(),
            guard,
            buffer: BytesMut::new(),
            state: SinkState::Open(Box::new(commit)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> StreamHandle {
        self.guard.handle()
    }

    /// Bytes buffered so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SinkState::Open(_))
    }

    /// Close the sink and wait for the payload to be stored
    pub async fn finish(mut self) -> Result<()> {
        poll_fn(|cx| self.poll_commit(cx)).await
    }

    /// Append `data`, then close the sink and wait for the payload to be stored
    pub async fn end(mut self, data: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(write_after_close(&self.key).into());
        }
        self.buffer.extend_from_slice(data);
        self.finish().await
    }

    fn poll_commit(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        loop {
            match std::mem::replace(&mut self.state, SinkState::Closed) {
                SinkState::Open(commit) => {
                    let payload = self.buffer.split().freeze();
                    debug!(
                        "Sink {} for {} closing with {} bytes",
                        self.guard.handle(),
                        self.key,
                        payload.len()
                    );
                    self.state = SinkState::Committing(commit(payload));
                }
                SinkState::Committing(mut commit) => {
                    return match commit.as_mut().poll(cx) {
                        Poll::Pending => {
                            self.state = SinkState::Committing(commit);
                            Poll::Pending
                        }
                        Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
                        Poll::Ready(Err(e)) => {
                            self.state = SinkState::Failed;
                            Poll::Ready(Err(e))
                        }
                    };
                }
                SinkState::Closed => return Poll::Ready(Ok(())),
                SinkState::Failed => {
                    self.state = SinkState::Failed;
                    return Poll::Ready(Err(BucketFsError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        format!("earlier commit of {} failed", self.key),
                    ))));
                }
            }
        }
    }
}

fn write_after_close(key: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("sink for {} is already closed", key),
    )
}

impl AsyncWrite for BufferedSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.is_open() {
            return Poll::Ready(Err(write_after_close(&this.key)));
        }
        this.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Nothing leaves the buffer before shutdown
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().poll_commit(cx).map_err(io::Error::from)
    }
}

impl fmt::Debug for BufferedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedSink")
            .field("key", &self.key)
            .field("handle", &self.guard.handle())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        if self.is_open() && !self.buffer.is_empty() {
            warn!(
                "Sink {} for {} dropped without being closed, {} bytes discarded",
                self.guard.handle(),
                self.key,
                self.buffer.len()
            );
        }
    }
}
