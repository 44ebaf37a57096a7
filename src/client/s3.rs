//! S3 object client
//!
//! Talks to Amazon S3 or an S3-compatible store (MinIO, LocalStack, etc.)
//! through `aws-sdk-s3`. SDK futures are driven by the tokio reactor, so this
//! client has no internal queue of its own to flush.

use std::error::Error as StdError;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::client::{
    ClientOperation, GetObject, HeadObject, ListPage, ListRequest, ObjectClient, ObjectEntry,
};
use crate::config::BucketConfig;
use crate::error::{BackendError, BackendResult};

/// S3 client bound to one bucket
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &BucketConfig) -> Self {
        let mut sdk_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(Region::new(region.clone()));
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            sdk_config_builder = sdk_config_builder.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                config.session_token.clone(),
                None,
                "bucket-fs-config",
            ));
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        debug!(
            "S3 client ready for bucket {} (endpoint {:?})",
            config.name, config.endpoint
        );

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.name.clone(),
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

fn sdk_failure<E>(operation: ClientOperation, err: E) -> BackendError
where
    E: StdError + Send + Sync + 'static,
{
    BackendError::Sdk {
        operation,
        source: Box::new(err),
    }
}

fn to_system_time(dt: &aws_sdk_s3::primitives::DateTime) -> Option<SystemTime> {
    SystemTime::UNIX_EPOCH.checked_add(Duration::new(
        dt.secs().max(0) as u64,
        dt.subsec_nanos(),
    ))
}

#[async_trait]
impl ObjectClient for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_object(&self, key: &str) -> BackendResult<HeadObject> {
        trace!("head_object: bucket={} key={}", self.bucket, key);

        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    BackendError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    sdk_failure(ClientOperation::HeadObject, service_error)
                }
            })?;

        // The SDK only hands back successful responses
        Ok(HeadObject {
            status: 200,
            content_length: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: output
                .last_modified()
                .and_then(to_system_time)
                .unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    async fn list_objects(&self, request: &ListRequest) -> BackendResult<ListPage> {
        trace!(
            "list_objects: bucket={} prefix={} token={:?}",
            self.bucket,
            request.prefix,
            request.continuation_token
        );

        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_continuation_token(request.continuation_token.clone())
            .set_max_keys(request.max_keys.map(|n| n as i32));

        if let Some(delimiter) = request.delimiter {
            call = call.delimiter(delimiter.to_string());
        }

        let result = call.send().await.map_err(|e| {
            sdk_failure(ClientOperation::ListObjects, e.into_service_error())
        })?;

        let contents: Vec<ObjectEntry> = result
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectEntry {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_system_time),
                })
            })
            .collect();

        let common_prefixes: Vec<String> = result
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(|s| s.to_string()))
            .collect();

        let next_continuation_token = if result.is_truncated().unwrap_or(false) {
            result.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            contents: (!contents.is_empty()).then_some(contents),
            common_prefixes: (!common_prefixes.is_empty()).then_some(common_prefixes),
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> BackendResult<GetObject> {
        trace!("get_object: bucket={} key={}", self.bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    BackendError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    sdk_failure(ClientOperation::GetObject, service_error)
                }
            })?;

        Ok(GetObject {
            content_length: output.content_length().map(|n| n.max(0) as u64),
            body: Box::pin(output.body.into_async_read()),
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, content_length: u64) -> BackendResult<()> {
        debug!(
            "put_object: bucket={} key={} size={}",
            self.bucket, key, content_length
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(content_length as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_failure(ClientOperation::PutObject, e.into_service_error()))?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        debug!("delete_object: bucket={} key={}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_failure(ClientOperation::DeleteObject, e.into_service_error()))?;

        Ok(())
    }

    async fn copy_object(&self, source: &str, destination: &str) -> BackendResult<()> {
        debug!(
            "copy_object: bucket={} source={} destination={}",
            self.bucket, source, destination
        );

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(destination)
            .copy_source(source)
            .send()
            .await
            .map_err(|e| sdk_failure(ClientOperation::CopyObject, e.into_service_error()))?;

        Ok(())
    }
}
