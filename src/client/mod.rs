//! Object client contract
//!
//! An object client is the storage backend the adapter drives: whole-object
//! head/get/put/delete/copy plus delimiter-aware listing. Clients may run
//! their work on an internal dispatch queue that only advances when
//! [`ObjectClient::flush`] is called; the drain scheduler takes care of that.

pub mod memory;
pub mod s3;

use std::fmt;
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::BackendResult;

/// Delimiter used to group keys into directories
pub const DELIMITER: char = '/';

/// Operations an object client offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientOperation {
    HeadObject,
    ListObjects,
    GetObject,
    PutObject,
    DeleteObject,
    CopyObject,
}

impl ClientOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientOperation::HeadObject => "HeadObject",
            ClientOperation::ListObjects => "ListObjects",
            ClientOperation::GetObject => "GetObject",
            ClientOperation::PutObject => "PutObject",
            ClientOperation::DeleteObject => "DeleteObject",
            ClientOperation::CopyObject => "CopyObject",
        }
    }
}

impl fmt::Display for ClientOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a head call
#[derive(Debug, Clone)]
pub struct HeadObject {
    /// HTTP status reported for the call
    pub status: u16,
    pub content_length: u64,
    pub last_modified: SystemTime,
}

/// Parameters of one list call
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<char>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<u32>,
}

/// An object entry of a listing page
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
}

/// One page of a listing
///
/// Both collections are `None` when the backend returned nothing for them.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub contents: Option<Vec<ObjectEntry>>,
    pub common_prefixes: Option<Vec<String>>,
    /// Present when more results follow this page
    pub next_continuation_token: Option<String>,
}

/// Lazily consumed object body
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Response to a get call
pub struct GetObject {
    pub content_length: Option<u64>,
    pub body: ObjectBody,
}

impl fmt::Debug for GetObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObject")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Storage backend bound to a single bucket
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Name of the bucket this client is bound to
    fn bucket(&self) -> &str;

    async fn head_object(&self, key: &str) -> BackendResult<HeadObject>;

    async fn list_objects(&self, request: &ListRequest) -> BackendResult<ListPage>;

    async fn get_object(&self, key: &str) -> BackendResult<GetObject>;

    /// Store `body` under `key`, replacing any existing object
    async fn put_object(&self, key: &str, body: Bytes, content_length: u64) -> BackendResult<()>;

    async fn delete_object(&self, key: &str) -> BackendResult<()>;

    /// Server-side copy of `source` (a `bucket/key` reference) to `destination`
    async fn copy_object(&self, source: &str, destination: &str) -> BackendResult<()>;

    /// Run whatever work the client has queued internally
    ///
    /// Called synchronously by the drain scheduler on every tick. Clients
    /// whose futures are driven by the tokio reactor keep the default.
    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }
}

/// `bucket/key` reference used as the source of a copy
///
/// Each key segment is percent-encoded; the delimiter stays literal.
pub fn copy_source(bucket: &str, key: &str) -> String {
    let encoded = key
        .split(DELIMITER)
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", bucket, encoded)
}

/// Split a copy source back into its bucket and decoded key
pub fn parse_copy_source(source: &str) -> Option<(&str, String)> {
    let (bucket, encoded) = source.split_once(DELIMITER)?;
    let key = encoded
        .split(DELIMITER)
        .map(|segment| urlencoding::decode(segment).ok())
        .collect::<Option<Vec<_>>>()?
        .join("/");
    Some((bucket, key))
}

/// Whether a key names a directory
pub fn is_directory_key(key: &str) -> bool {
    key.is_empty() || key.ends_with(DELIMITER)
}
