//! Filesystem nodes
//!
//! Nodes are values naming a key on some adapter. A directory key always ends
//! with the delimiter, except the root directory whose key is empty. A file
//! key never does.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use tracing::debug;

use crate::adapter::{
    FilesystemAdapter, ListFlags, NodeStream, OpenStream, Stat, DEFAULT_DIR_MODE,
    DEFAULT_FILE_MODE,
};
use crate::client::{is_directory_key, DELIMITER};
use crate::error::{BucketFsError, Result};

/// A listing entry
#[derive(Clone)]
pub enum Node {
    File(File),
    Directory(Directory),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::File(file) => file.path(),
            Node::Directory(dir) => dir.path(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn as_dir(&self) -> Option<&Directory> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::File(file) => f.debug_tuple("File").field(&file.path).finish(),
            Node::Directory(dir) => f.debug_tuple("Directory").field(&dir.path).finish(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Last non-empty segment of a key
fn base_name(path: &str) -> &str {
    path.trim_end_matches(DELIMITER)
        .rsplit(DELIMITER)
        .next()
        .unwrap_or_default()
}

/// A file on an adapter
#[derive(Clone)]
pub struct File {
    path: String,
    adapter: Arc<dyn FilesystemAdapter>,
}

impl File {
    /// Callers are responsible for passing a non-directory key
    pub(crate) fn new(path: impl Into<String>, adapter: Arc<dyn FilesystemAdapter>) -> Self {
        Self {
            path: path.into(),
            adapter,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn adapter(&self) -> &Arc<dyn FilesystemAdapter> {
        &self.adapter
    }

    pub async fn stat(&self) -> Result<Stat> {
        self.adapter.stat(&self.path).await
    }

    pub async fn open(&self, mode: &str) -> Result<OpenStream> {
        self.adapter.open(&self.path, mode).await
    }

    /// Read the whole file into memory
    pub async fn read_all(&self) -> Result<Bytes> {
        self.open("r").await?.into_reader()?.read_all().await
    }

    /// Replace the file's contents with `data`
    pub async fn put(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.open("w").await?.into_sink()?.end(&data).await
    }

    pub async fn touch(&self) -> Result<()> {
        self.adapter.touch(&self.path, DEFAULT_FILE_MODE).await
    }

    pub async fn remove(&self) -> Result<()> {
        self.adapter.unlink(&self.path).await
    }

    /// Move the file to `to` on the same adapter
    pub async fn rename(&self, to: &str) -> Result<File> {
        if is_directory_key(to) {
            return Err(BucketFsError::InvalidArgument(format!(
                "cannot rename {} to directory key {:?}",
                self.path, to
            )));
        }
        self.adapter.rename(&self.path, to).await?;
        Ok(File::new(to, self.adapter.clone()))
    }

    /// Stream this file's contents into `destination`, which may live on
    /// another adapter. Returns the number of bytes copied.
    pub async fn copy_to(&self, destination: &File) -> Result<u64> {
        let mut reader = self.open("r").await?.into_reader()?;
        let mut sink = destination.open("w").await?.into_sink()?;

        let copied = tokio::io::copy(&mut reader, &mut sink).await?;
        sink.finish().await?;

        debug!(
            "Copied {} bytes from {} to {}",
            copied, self.path, destination.path
        );
        Ok(copied)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File").field("path", &self.path).finish()
    }
}

/// A directory on an adapter
#[derive(Clone)]
pub struct Directory {
    path: String,
    adapter: Arc<dyn FilesystemAdapter>,
}

impl Directory {
    /// `path` gets a trailing delimiter unless it is the root
    pub(crate) fn new(path: impl Into<String>, adapter: Arc<dyn FilesystemAdapter>) -> Self {
        let mut path = path.into();
        if !is_directory_key(&path) {
            path.push(DELIMITER);
        }
        Self { path, adapter }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn adapter(&self) -> &Arc<dyn FilesystemAdapter> {
        &self.adapter
    }

    pub async fn stat(&self) -> Result<Stat> {
        self.adapter.stat(&self.path).await
    }

    /// Collect every direct child
    pub async fn ls(&self) -> Result<Vec<Node>> {
        self.ls_streaming().try_collect().await
    }

    pub fn ls_streaming(&self) -> NodeStream {
        self.ls_with(ListFlags::default())
    }

    pub fn ls_with(&self, flags: ListFlags) -> NodeStream {
        self.adapter.list(&self.path, flags)
    }

    pub async fn create(&self) -> Result<()> {
        self.adapter.mkdir(&self.path, DEFAULT_DIR_MODE).await
    }

    pub async fn remove(&self) -> Result<()> {
        self.adapter.rmdir(&self.path).await
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("photos/2024/cat.jpg"), "cat.jpg");
        assert_eq!(base_name("photos/2024/"), "2024");
        assert_eq!(base_name("top"), "top");
        assert_eq!(base_name(""), "");
    }
}
