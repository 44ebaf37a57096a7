//! Bucket adapter
//!
//! Exposes one bucket through [`FilesystemAdapter`]. Every client call is
//! submitted through the invocation queue, which keeps the drain task alive
//! while calls are outstanding.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, FutureExt};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::adapter::listing::translate_page;
use crate::adapter::{FilesystemAdapter, ListFlags, NodeStream, OpenStream, Stat};
use crate::client::s3::S3Client;
use crate::client::{
    copy_source, is_directory_key, ClientOperation, ListRequest, ObjectClient, DELIMITER,
};
use crate::config::Config;
use crate::error::{BackendResult, BucketFsError, Result};
use crate::handle::{HandleRegistry, OpenStreamInfo, StreamHandle, StreamMode};
use crate::invoker::InvocationQueue;
use crate::reader::ObjectReader;
use crate::sink::BufferedSink;

/// Filesystem adapter over a single bucket
pub struct BucketAdapter {
    /// Handed to listed nodes as their adapter
    me: Weak<BucketAdapter>,
    bucket: String,
    invoker: InvocationQueue,
    handles: Arc<HandleRegistry>,
    listing: ListFlags,
}

impl BucketAdapter {
    /// Create an adapter driving `client` on `runtime`
    pub fn new(client: Arc<dyn ObjectClient>, runtime: Handle, drain_interval: Duration) -> Arc<Self> {
        Self::with_listing(client, runtime, drain_interval, ListFlags::default())
    }

    /// Like `new`, with listing defaults used when a caller leaves flags unset
    pub fn with_listing(
        client: Arc<dyn ObjectClient>,
        runtime: Handle,
        drain_interval: Duration,
        listing: ListFlags,
    ) -> Arc<Self> {
        let bucket = client.bucket().to_string();
        debug!(
            "Creating adapter for bucket {} (drain interval {:?})",
            bucket, drain_interval
        );

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            bucket,
            invoker: InvocationQueue::new(client, runtime, drain_interval),
            handles: Arc::new(HandleRegistry::new()),
            listing,
        })
    }

    /// Create an S3-backed adapter from configuration
    ///
    /// Must be called from within a tokio runtime.
    pub async fn from_config(config: &Config) -> Result<Arc<Self>> {
        config.validate()?;
        let client = S3Client::new(&config.bucket).await;
        Ok(Self::with_listing(
            Arc::new(client),
            Handle::current(),
            config.drain.interval,
            config.listing.flags(),
        ))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        self.invoker.client()
    }

    /// Open `path` for writing without waiting on anything
    ///
    /// The returned sink buffers every write; closing it submits one put
    /// call and completes once that put settles.
    pub fn open_write(&self, path: &str) -> BufferedSink {
        let guard = self.handles.mint(path, StreamMode::Write);
        trace!("open_write: {} as {}", path, guard.handle());

        let invoker = self.invoker.clone();
        let key = path.to_string();

        BufferedSink::new(path, guard, move |payload: Bytes| {
            let content_length = payload.len() as u64;
            debug!("put {} ({} bytes)", key, content_length);

            let put_key = key.clone();
            let invocation = invoker.invoke(ClientOperation::PutObject, move |client| async move {
                client.put_object(&put_key, payload, content_length).await
            });

            async move {
                invocation
                    .await
                    .map_err(|e| BucketFsError::backend(ClientOperation::PutObject, key, e))
            }
            .boxed()
        })
    }

    async fn open_read(&self, path: &str) -> Result<ObjectReader> {
        let key = path.to_string();
        let object = self
            .call(ClientOperation::GetObject, path, move |client| async move {
                client.get_object(&key).await
            })
            .await?;

        let guard = self.handles.mint(path, StreamMode::Read);
        trace!("open_read: {} as {}", path, guard.handle());
        Ok(ObjectReader::new(path, guard, object.content_length, object.body))
    }

    /// Submit one client call and attach `path` to any failure
    async fn call<T, F, Fut>(&self, operation: ClientOperation, path: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ObjectClient>) -> Fut + Send,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        self.invoker
            .invoke(operation, call)
            .await
            .map_err(|e| BucketFsError::backend(operation, path, e))
    }

    /// Key and mode a live stream handle was opened with
    pub fn stream_info(&self, handle: StreamHandle) -> Option<OpenStreamInfo> {
        self.handles.get(handle)
    }

    /// Number of read streams and write sinks currently open
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Client calls submitted but not yet settled
    pub fn outstanding_calls(&self) -> usize {
        self.invoker.outstanding()
    }

    pub fn is_draining(&self) -> bool {
        self.invoker.is_draining()
    }

    /// Number of drain tasks started over the adapter's lifetime
    pub fn drain_starts(&self) -> u64 {
        self.invoker.drain_starts()
    }

    /// Stop the drain task and cancel every outstanding call
    pub fn shutdown(&self) {
        debug!("Shutting down adapter for bucket {}", self.bucket);
        self.invoker.shutdown();
    }
}

#[async_trait]
impl FilesystemAdapter for BucketAdapter {
    async fn stat(&self, path: &str) -> Result<Stat> {
        trace!("stat: {}", path);

        if is_directory_key(path) {
            return Ok(Stat::empty());
        }

        let key = path.to_string();
        let head = self
            .call(ClientOperation::HeadObject, path, move |client| async move {
                client.head_object(&key).await
            })
            .await?;

        if head.status != 200 {
            return Err(BucketFsError::UnexpectedStatus {
                path: path.to_string(),
                status: head.status,
            });
        }

        Ok(Stat::object(head.content_length, head.last_modified))
    }

    fn list(&self, path: &str, flags: ListFlags) -> NodeStream {
        trace!("list: {} {:?}", path, flags);

        let adapter: Arc<dyn FilesystemAdapter> = match self.me.upgrade() {
            Some(adapter) => adapter as Arc<dyn FilesystemAdapter>,
            None => {
                let err = BucketFsError::InvalidArgument(format!(
                    "adapter for bucket {} is being dropped",
                    self.bucket
                ));
                return Box::pin(stream::once(async move { Err(err) }));
            }
        };

        let invoker = self.invoker.clone();
        let prefix = path.to_string();
        let max_keys = flags.max_keys.or(self.listing.max_keys);
        let first_page_only = flags
            .first_page_only
            .or(self.listing.first_page_only)
            .unwrap_or(false);

        Box::pin(try_stream! {
            let mut continuation_token: Option<String> = None;
            let mut pages = 0usize;

            loop {
                let request = ListRequest {
                    prefix: prefix.clone(),
                    delimiter: Some(DELIMITER),
                    continuation_token: continuation_token.take(),
                    max_keys,
                };

                let page = invoker
                    .invoke(ClientOperation::ListObjects, move |client| async move {
                        client.list_objects(&request).await
                    })
                    .await
                    .map_err(|e| BucketFsError::backend(ClientOperation::ListObjects, prefix.as_str(), e))?;
                pages += 1;

                let next_token = page.next_continuation_token.clone();
                for node in translate_page(page, &prefix, DELIMITER, &adapter) {
                    yield node;
                }

                match next_token {
                    Some(token) if !first_page_only => continuation_token = Some(token),
                    _ => break,
                }
            }

            trace!("list: {} done after {} page(s)", prefix, pages);
        })
    }

    async fn open(&self, path: &str, mode: &str) -> Result<OpenStream> {
        trace!("open: {} mode {:?}", path, mode);

        if mode.contains('r') {
            return self.open_read(path).await.map(OpenStream::Read);
        }

        if mode.contains('w') {
            return Ok(OpenStream::Write(self.open_write(path)));
        }

        Err(BucketFsError::InvalidArgument(format!(
            "open of {} must be used with a read or write flag, got {:?}",
            path, mode
        )))
    }

    async fn touch(&self, path: &str, _mode: u32) -> Result<()> {
        debug!("touch: {}", path);
        self.open_write(path).end(b"").await
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        debug!("unlink: {}", path);

        let key = path.to_string();
        self.call(ClientOperation::DeleteObject, path, move |client| async move {
            client.delete_object(&key).await
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("rename: {} -> {}", from, to);

        let source = copy_source(&self.bucket, from);
        let destination = to.to_string();
        self.call(ClientOperation::CopyObject, from, move |client| async move {
            client.copy_object(&source, &destination).await
        })
        .await?;

        // Not atomic: once the copy landed, a failed delete leaves both keys
        self.unlink(from)
            .await
            .map_err(|e| BucketFsError::PartialRename {
                from: from.to_string(),
                to: to.to_string(),
                source: Box::new(e),
            })
    }

    async fn mkdir(&self, path: &str, _mode: u32) -> Result<()> {
        trace!("mkdir: {} (nothing to create)", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    use crate::client::memory::MemoryClient;

    fn adapter(client: &Arc<MemoryClient>) -> Arc<BucketAdapter> {
        BucketAdapter::new(client.clone(), Handle::current(), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_stat_object() {
        let client = Arc::new(MemoryClient::new("media"));
        client.insert("a.txt", "hello");
        let adapter = adapter(&client);

        let stat = adapter.stat("a.txt").await.unwrap();
        assert_eq!(stat.size, Some(5));
        assert_eq!(stat.mtime, client.last_modified("a.txt"));
        assert_eq!(stat.atime, stat.mtime);
        assert_eq!(stat.ctime, stat.mtime);
    }

    #[tokio::test]
    async fn test_stat_missing_object_keeps_cause() {
        let client = Arc::new(MemoryClient::new("media"));
        let adapter = adapter(&client);

        let err = adapter.stat("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            BucketFsError::Backend {
                operation: ClientOperation::HeadObject,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_write_registers_handle() {
        let client = Arc::new(MemoryClient::new("media"));
        let adapter = adapter(&client);

        let mut sink = adapter.open_write("notes.txt");
        let info = adapter.stream_info(sink.handle()).unwrap();
        assert_eq!(info.key, "notes.txt");
        assert_eq!(info.mode, StreamMode::Write);

        sink.write_all(b"abc").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        assert_eq!(adapter.open_handles(), 0);
        assert_eq!(client.object("notes.txt").unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_list_stream_is_lazy() {
        let client = Arc::new(MemoryClient::new("media"));
        client.insert("a", "");
        let adapter = adapter(&client);

        let mut nodes = adapter.list("", ListFlags::default());
        assert!(client.calls().is_empty());

        assert_eq!(nodes.next().await.unwrap().unwrap().path(), "a");
        assert!(nodes.next().await.is_none());
        assert_eq!(client.calls_of(ClientOperation::ListObjects).len(), 1);
    }

    #[tokio::test]
    async fn test_configured_listing_defaults_apply() {
        let client = Arc::new(MemoryClient::new("media"));
        for key in ["a", "b", "c"] {
            client.insert(key, "");
        }
        let adapter = BucketAdapter::with_listing(
            client.clone(),
            Handle::current(),
            Duration::from_millis(1),
            ListFlags {
                max_keys: Some(2),
                first_page_only: Some(true),
            },
        );

        let nodes: Vec<_> = adapter.list("", ListFlags::default()).collect().await;
        assert_eq!(nodes.len(), 2);
        assert_eq!(client.calls_of(ClientOperation::ListObjects).len(), 1);
    }

    #[tokio::test]
    async fn test_caller_flags_override_configured_defaults() {
        let client = Arc::new(MemoryClient::new("media"));
        for key in ["a", "b", "c"] {
            client.insert(key, "");
        }
        let adapter = BucketAdapter::with_listing(
            client.clone(),
            Handle::current(),
            Duration::from_millis(1),
            ListFlags {
                max_keys: Some(2),
                first_page_only: Some(true),
            },
        );

        let flags = ListFlags {
            max_keys: None,
            first_page_only: Some(false),
        };
        let nodes: Vec<_> = adapter.list("", flags).collect().await;
        assert_eq!(nodes.len(), 3);
        assert_eq!(client.calls_of(ClientOperation::ListObjects).len(), 2);
    }
}
