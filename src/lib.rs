//! bucket-fs: an S3 bucket exposed through a generic async filesystem adapter
//!
//! Object keys are treated as paths; `/` groups them into directories.
//!
//! # Architecture
//!
//! - **Object clients**: the storage backend (`client::s3::S3Client`, or the
//!   in-memory `client::memory::MemoryClient`) implementing `ObjectClient`.
//! - **Invocation queue**: every client call is submitted here and polled in
//!   the background rather than at the call site.
//! - **Drain scheduler**: a recurring task that pumps the invocation queue
//!   and flushes the client while calls are outstanding, then stops itself.
//! - **Bucket adapter**: implements `FilesystemAdapter` (stat, list, open,
//!   touch, unlink, rename, mkdir) on top of the queue.
//! - **Filesystem**: hands out `File` and `Directory` nodes bound to an adapter.
//!
//! # Example
//!
//! ```no_run
//! use bucket_fs::adapter::bucket::BucketAdapter;
//! use bucket_fs::config::Config;
//! use bucket_fs::filesystem::Filesystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//! let adapter = BucketAdapter::from_config(&config).await?;
//! let fs = Filesystem::from_adapter(adapter);
//!
//! for node in fs.dir("").ls().await? {
//!     println!("{}", node.path());
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod drain;
pub mod env;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod invoker;
pub mod node;
pub mod reader;
pub mod sink;

pub use adapter::bucket::BucketAdapter;
pub use adapter::{FilesystemAdapter, ListFlags, OpenStream, Stat};
pub use error::{BucketFsError, Result};
pub use filesystem::Filesystem;
pub use node::{Directory, File, Node};
