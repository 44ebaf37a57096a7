//! In-memory object client with a deferred dispatch queue
//!
//! Every call is recorded and queued; nothing runs until [`MemoryClient::flush`]
//! drains the queue. This mirrors clients whose futures only make progress
//! when their own work queue is serviced, and makes the drain scheduler's job
//! observable in tests.

use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::client::{
    parse_copy_source, ClientOperation, GetObject, HeadObject, ListPage, ListRequest,
    ObjectClient, ObjectEntry,
};
use crate::error::{BackendError, BackendResult};

/// Page size used when a list request does not set one
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Marker appended to a common prefix to build a continuation token that
/// sorts after every key under that prefix
const PREFIX_TOKEN_SUFFIX: char = '\u{10FFFF}';

type Job = Box<dyn FnOnce() + Send>;
type Objects = BTreeMap<String, StoredObject>;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: SystemTime,
}

/// A call as it was submitted to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: ClientOperation,
    pub key: String,
    /// Content length of put calls
    pub content_length: Option<u64>,
}

/// In-memory object client
pub struct MemoryClient {
    bucket: String,
    objects: Arc<RwLock<Objects>>,
    dispatch: Mutex<VecDeque<Job>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// (operation, key) -> status the call fails with
    faults: DashMap<(ClientOperation, String), u16>,
    /// key -> status reported by head calls
    head_status: DashMap<String, u16>,
    failing_flushes: AtomicUsize,
    flushes: AtomicUsize,
    page_size: usize,
}

impl MemoryClient {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            dispatch: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            faults: DashMap::new(),
            head_status: DashMap::new(),
            failing_flushes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit listing pages to `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store an object directly, bypassing the dispatch queue
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(
            key.into(),
            StoredObject {
                data: data.into(),
                last_modified: SystemTime::now(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    pub fn last_modified(&self, key: &str) -> Option<SystemTime> {
        self.objects.read().get(key).map(|o| o.last_modified)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Make every `operation` call on `key` fail with `status`
    pub fn fail(&self, operation: ClientOperation, key: impl Into<String>, status: u16) {
        self.faults.insert((operation, key.into()), status);
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Report `status` from head calls on `key`
    pub fn set_head_status(&self, key: impl Into<String>, status: u16) {
        self.head_status.insert(key.into(), status);
    }

    /// Make the next `count` flushes fail before running any work
    pub fn fail_flushes(&self, count: usize) {
        self.failing_flushes.store(count, Ordering::SeqCst);
    }

    /// Every call submitted so far, in submission order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, operation: ClientOperation) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Number of jobs waiting for a flush
    pub fn queued(&self) -> usize {
        self.dispatch.lock().len()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Record the call and queue `job`, returning its eventual result
    async fn submit<T, F>(
        &self,
        operation: ClientOperation,
        key: &str,
        content_length: Option<u64>,
        job: F,
    ) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RwLock<Objects>) -> BackendResult<T> + Send + 'static,
    {
        self.calls.lock().push(RecordedCall {
            operation,
            key: key.to_string(),
            content_length,
        });

        let fault = self
            .faults
            .get(&(operation, key.to_string()))
            .map(|status| *status);
        let objects = Arc::clone(&self.objects);
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            let result = match fault {
                Some(status) => Err(BackendError::Service {
                    operation,
                    status,
                    message: "injected failure".to_string(),
                }),
                None => job(&objects),
            };
            let _ = tx.send(result);
        });
        self.dispatch.lock().push_back(job);
        trace!("memory client queued {} for {}", operation, key);

        rx.await.map_err(|_| BackendError::Cancelled { operation })?
    }
}

fn list_page(objects: &Objects, request: &ListRequest, page_size: usize) -> ListPage {
    let max_keys = request
        .max_keys
        .map(|n| n as usize)
        .unwrap_or(page_size)
        .max(1);
    let prefix = request.prefix.as_str();

    let lower = match &request.continuation_token {
        Some(token) => Bound::Excluded(token.as_str()),
        None => Bound::Included(prefix),
    };

    let mut contents = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();
    let mut marker: Option<String> = None;
    let mut truncated = false;

    for (key, object) in objects
        .range::<str, _>((lower, Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(prefix))
    {
        let rest = &key[prefix.len()..];
        let grouped = request.delimiter.and_then(|d| {
            rest.find(d)
                .map(|i| key[..prefix.len() + i + d.len_utf8()].to_string())
        });

        if let Some(common) = &grouped {
            if common_prefixes.last() == Some(common) {
                continue;
            }
        }

        if contents.len() + common_prefixes.len() == max_keys {
            truncated = true;
            break;
        }

        match grouped {
            Some(common) => {
                marker = Some(format!("{}{}", common, PREFIX_TOKEN_SUFFIX));
                common_prefixes.push(common);
            }
            None => {
                marker = Some(key.clone());
                contents.push(ObjectEntry {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.last_modified),
                });
            }
        }
    }

    ListPage {
        contents: (!contents.is_empty()).then_some(contents),
        common_prefixes: (!common_prefixes.is_empty()).then_some(common_prefixes),
        next_continuation_token: if truncated { marker } else { None },
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_object(&self, key: &str) -> BackendResult<HeadObject> {
        let owned = key.to_string();
        let status = self.head_status.get(key).map(|s| *s).unwrap_or(200);
        self.submit(ClientOperation::HeadObject, key, None, move |objects| {
            let objects = objects.read();
            let object = objects
                .get(&owned)
                .ok_or_else(|| BackendError::NotFound { key: owned.clone() })?;
            Ok(HeadObject {
                status,
                content_length: object.data.len() as u64,
                last_modified: object.last_modified,
            })
        })
        .await
    }

    async fn list_objects(&self, request: &ListRequest) -> BackendResult<ListPage> {
        let request = request.clone();
        let page_size = self.page_size;
        let prefix = request.prefix.clone();
        self.submit(ClientOperation::ListObjects, &prefix, None, move |objects| {
            Ok(list_page(&objects.read(), &request, page_size))
        })
        .await
    }

    async fn get_object(&self, key: &str) -> BackendResult<GetObject> {
        let owned = key.to_string();
        self.submit(ClientOperation::GetObject, key, None, move |objects| {
            let data = objects
                .read()
                .get(&owned)
                .map(|o| o.data.clone())
                .ok_or_else(|| BackendError::NotFound { key: owned.clone() })?;
            Ok(GetObject {
                content_length: Some(data.len() as u64),
                body: Box::pin(Cursor::new(data)),
            })
        })
        .await
    }

    async fn put_object(&self, key: &str, body: Bytes, content_length: u64) -> BackendResult<()> {
        let owned = key.to_string();
        self.submit(
            ClientOperation::PutObject,
            key,
            Some(content_length),
            move |objects| {
                objects.write().insert(
                    owned,
                    StoredObject {
                        data: body,
                        last_modified: SystemTime::now(),
                    },
                );
                Ok(())
            },
        )
        .await
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        let owned = key.to_string();
        self.submit(ClientOperation::DeleteObject, key, None, move |objects| {
            objects.write().remove(&owned);
            Ok(())
        })
        .await
    }

    async fn copy_object(&self, source: &str, destination: &str) -> BackendResult<()> {
        let source_key = parse_copy_source(source)
            .filter(|(bucket, _)| *bucket == self.bucket)
            .map(|(_, key)| key);
        let source = source.to_string();
        let destination_key = destination.to_string();

        self.submit(
            ClientOperation::CopyObject,
            destination,
            None,
            move |objects| {
                let source_key = source_key.ok_or_else(|| BackendError::Service {
                    operation: ClientOperation::CopyObject,
                    status: 400,
                    message: format!("copy source {} is outside the bucket", source),
                })?;
                let mut objects = objects.write();
                let data = objects
                    .get(&source_key)
                    .map(|o| o.data.clone())
                    .ok_or(BackendError::NotFound { key: source_key })?;
                objects.insert(
                    destination_key,
                    StoredObject {
                        data,
                        last_modified: SystemTime::now(),
                    },
                );
                Ok(())
            },
        )
        .await
    }

    fn flush(&self) -> BackendResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_flushes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_flushes.store(failing - 1, Ordering::SeqCst);
            warn!("memory client flush failing on request");
            return Err(BackendError::Dispatch("injected flush failure".to_string()));
        }

        let jobs = std::mem::take(&mut *self.dispatch.lock());
        for job in jobs {
            job();
        }
        Ok(())
    }
}
