//! Filesystem facade over an adapter

use std::fmt;
use std::sync::Arc;

use crate::adapter::FilesystemAdapter;
use crate::client::{is_directory_key, DELIMITER};
use crate::error::{BucketFsError, Result};
use crate::node::{Directory, File};

/// Entry point handing out file and directory nodes bound to one adapter
#[derive(Clone)]
pub struct Filesystem {
    adapter: Arc<dyn FilesystemAdapter>,
}

impl Filesystem {
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: FilesystemAdapter + 'static,
    {
        Self { adapter }
    }

    pub fn from_dyn(adapter: Arc<dyn FilesystemAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn FilesystemAdapter> {
        &self.adapter
    }

    /// File node for `path`
    ///
    /// A leading delimiter is ignored. Directory keys are rejected.
    pub fn file(&self, path: &str) -> Result<File> {
        let key = path.trim_start_matches(DELIMITER);
        if is_directory_key(key) {
            return Err(BucketFsError::InvalidArgument(format!(
                "{:?} names a directory, not a file",
                path
            )));
        }
        Ok(File::new(key, self.adapter.clone()))
    }

    /// Directory node for `path`; `""` is the root
    pub fn dir(&self, path: &str) -> Directory {
        Directory::new(path.trim_start_matches(DELIMITER), self.adapter.clone())
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::runtime::Handle;

    use crate::adapter::bucket::BucketAdapter;
    use crate::client::memory::MemoryClient;

    fn filesystem() -> Filesystem {
        let client = Arc::new(MemoryClient::new("media"));
        Filesystem::from_adapter(BucketAdapter::new(
            client,
            Handle::current(),
            Duration::from_millis(1),
        ))
    }

    #[tokio::test]
    async fn test_node_paths_are_normalized() {
        let fs = filesystem();

        assert_eq!(fs.file("/photos/cat.jpg").unwrap().path(), "photos/cat.jpg");
        assert_eq!(fs.dir("photos").path(), "photos/");
        assert_eq!(fs.dir("photos/").path(), "photos/");
        assert!(fs.dir("").is_root());
        assert!(fs.dir("/").is_root());
    }

    #[tokio::test]
    async fn test_file_rejects_directory_keys() {
        let fs = filesystem();

        assert!(fs.file("photos/").is_err());
        assert!(fs.file("").is_err());
    }
}
