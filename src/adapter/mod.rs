pub mod bucket;
pub mod listing;

use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::{BucketFsError, Result};
use crate::handle::StreamHandle;
use crate::node::Node;
use crate::reader::ObjectReader;
use crate::sink::BufferedSink;

/// Default file mode (rw-r--r--)
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default directory mode (rwxr-xr-x)
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Metadata reported by `stat`
///
/// Directory-like paths have no backing object, so their stat is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

impl Stat {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stat of an object: one modification time stands in for all three timestamps
    pub fn object(size: u64, modified: SystemTime) -> Self {
        Self {
            size: Some(size),
            atime: Some(modified),
            ctime: Some(modified),
            mtime: Some(modified),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::empty()
    }
}

/// Options for a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFlags {
    /// Page size requested from the backend
    pub max_keys: Option<u32>,
    /// Stop after the first page even if the backend reports more
    pub first_page_only: Option<bool>,
}

/// Stream of nodes produced by a listing
pub type NodeStream = Pin<Box<dyn Stream<Item = Result<Node>> + Send>>;

/// An opened object
#[derive(Debug)]
pub enum OpenStream {
    Read(ObjectReader),
    Write(BufferedSink),
}

impl OpenStream {
    pub fn handle(&self) -> StreamHandle {
        match self {
            OpenStream::Read(reader) => reader.handle(),
            OpenStream::Write(sink) => sink.handle(),
        }
    }

    pub fn into_reader(self) -> Result<ObjectReader> {
        match self {
            OpenStream::Read(reader) => Ok(reader),
            OpenStream::Write(sink) => Err(BucketFsError::InvalidArgument(format!(
                "{} was opened for writing",
                sink.key()
            ))),
        }
    }

    pub fn into_sink(self) -> Result<BufferedSink> {
        match self {
            OpenStream::Write(sink) => Ok(sink),
            OpenStream::Read(reader) => Err(BucketFsError::InvalidArgument(format!(
                "{} was opened for reading",
                reader.key()
            ))),
        }
    }
}

/// Generic asynchronous filesystem contract
///
/// Paths are object keys. A path ending with `/` (or the empty root path)
/// names a directory. Operations that have no meaning for a given backend
/// reject with `BucketFsError::NotSupported` without doing any work.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    /// Get metadata for a path
    async fn stat(&self, path: &str) -> Result<Stat>;

    /// List the direct children of a directory path
    ///
    /// The stream is single-pass; every call returns a fresh one.
    fn list(&self, path: &str, flags: ListFlags) -> NodeStream;

    /// Open a path for reading (`mode` contains `r`) or writing (`mode` contains `w`)
    async fn open(&self, path: &str, mode: &str) -> Result<OpenStream>;

    /// Create an empty file, replacing any existing content
    async fn touch(&self, path: &str, mode: u32) -> Result<()>;

    async fn unlink(&self, path: &str) -> Result<()>;

    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    async fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    async fn rmdir(&self, _path: &str) -> Result<()> {
        Err(BucketFsError::not_intended("rmdir"))
    }

    async fn chmod(&self, _path: &str, _mode: u32) -> Result<()> {
        Err(BucketFsError::not_intended("chmod"))
    }

    async fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> Result<()> {
        Err(BucketFsError::not_intended("chown"))
    }

    /// Close a stream by handle. Streams are closed by dropping or shutting them down.
    async fn close(&self, _handle: StreamHandle) -> Result<()> {
        Err(BucketFsError::not_intended("close"))
    }

    /// Positional read by handle
    async fn read(&self, _handle: StreamHandle, _length: usize, _offset: u64) -> Result<Bytes> {
        Err(BucketFsError::not_intended("read"))
    }

    /// Positional write by handle
    async fn write(&self, _handle: StreamHandle, _data: &[u8], _offset: u64) -> Result<usize> {
        Err(BucketFsError::not_intended("write"))
    }
}
