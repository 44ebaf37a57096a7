//! Read stream over an object body

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::client::ObjectBody;
use crate::error::{BucketFsError, Result};
use crate::handle::{HandleGuard, StreamHandle};

/// Upper bound on the buffer reserved up front from a reported length
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Lazily consumed contents of one object
pub struct ObjectReader {
    key: String,
    guard: HandleGuard,
    content_length: Option<u64>,
    body: ObjectBody,
}

impl ObjectReader {
    pub fn new(
        key: impl Into<String>,
        guard: HandleGuard,
        content_length: Option<u64>,
        body: ObjectBody,
    ) -> Self {
        Self {
            key: key.into(),
            guard,
            content_length,
            body,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> StreamHandle {
        self.guard.handle()
    }

    /// Length reported by the backend, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the remaining body into memory
    pub async fn read_all(mut self) -> Result<Bytes> {
        let mut data = Vec::with_capacity(initial_capacity(self.content_length));
        self.body
            .read_to_end(&mut data)
            .await
            .map_err(BucketFsError::Io)?;
        Ok(Bytes::from(data))
    }
}

/// The reported length is not trusted beyond `MAX_PREALLOCATION`
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.unwrap_or(0).min(MAX_PREALLOCATION) as usize
}

impl AsyncRead for ObjectReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().body.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("key", &self.key)
            .field("handle", &self.guard.handle())
            .field("content_length", &self.content_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use crate::handle::{HandleRegistry, StreamMode};

    #[tokio::test]
    async fn test_read_all() {
        let registry = Arc::new(HandleRegistry::new());
        let guard = registry.mint("a.txt", StreamMode::Read);
        let reader = ObjectReader::new("a.txt", guard, Some(5), Box::pin(Cursor::new(b"hello".to_vec())));

        assert_eq!(reader.content_length(), Some(5));
        assert_eq!(registry.len(), 1);
        assert_eq!(reader.read_all().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_partial_reads() {
        let registry = Arc::new(HandleRegistry::new());
        let guard = registry.mint("a.txt", StreamMode::Read);
        let mut reader = ObjectReader::new("a.txt", guard, None, Box::pin(Cursor::new(b"abcdef".to_vec())));

        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"ab");
        assert_eq!(reader.read_all().await.unwrap(), Bytes::from_static(b"cdef"));
    }

    #[tokio::test]
    async fn test_reported_length_is_not_trusted() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(12)), 12);
        assert_eq!(initial_capacity(Some(u64::MAX)), MAX_PREALLOCATION as usize);

        let registry = Arc::new(HandleRegistry::new());
        let guard = registry.mint("huge", StreamMode::Read);
        let reader = ObjectReader::new("huge", guard, Some(u64::MAX), Box::pin(Cursor::new(b"tiny".to_vec())));

        assert_eq!(reader.read_all().await.unwrap(), Bytes::from_static(b"tiny"));
    }
}
