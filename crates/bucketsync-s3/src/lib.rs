//! S3-compatible object store backend
//!
//! [`S3Store`] implements the bucketsync storage capabilities on top of the
//! AWS SDK. Any S3-compatible service works: custom endpoints, path-style
//! addressing and plain-HTTP connections are all configurable.
//!
//! Uploads larger than the configured chunk size go through multipart upload
//! with parts of exactly that size, so the resulting ETag is the one the sync
//! planner computes locally.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectCannedAcl, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bucketsync_config::StorageConfig;
use bucketsync_types::{
    ChunkSize, DeleteOutcome, Error, ListPage, ListRequest, ObjectBody, ObjectLister, ObjectStore,
    ObjectTransfer, PutObject, RemoteObject, Result,
};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CREDENTIALS_PROVIDER: &str = "bucketsync";

/// Most parts S3 accepts in one multipart upload
const MAX_PARTS: u64 = 10_000;

/// Object store for one bucket of an S3-compatible service
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    chunk_size: ChunkSize,
}

impl S3Store {
    /// Connect using the storage section of the configuration.
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the SDK's default provider chain applies.
    pub async fn connect(config: &StorageConfig, chunk_size: ChunkSize) -> Result<Self> {
        let bucket = config.require_bucket()?.to_string();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(url) = endpoint_url(config.endpoint.as_deref(), &config.region, config.disable_ssl)
        {
            debug!(endpoint = %url, "Using custom endpoint");
            builder = builder.endpoint_url(url);
        }

        info!(bucket = %bucket, region = %config.region, "Connected to object store");
        Ok(Self::from_client(Client::from_conf(builder.build()), bucket, chunk_size))
    }

    /// Wrap an existing client
    pub fn from_client(client: Client, bucket: impl Into<String>, chunk_size: ChunkSize) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            chunk_size,
        }
    }

    /// Part size used for multipart uploads
    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    async fn put_single(&self, object: PutObject) -> Result<()> {
        let PutObject {
            key,
            mut body,
            content_length,
            content_type,
            acl,
        } = object;

        let data = read_chunk(&mut body, content_length as usize).await?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .content_length(data.len() as i64)
            .body(ByteStream::from(data));
        if let Some(acl) = acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        request
            .send()
            .await
            .map_err(|e| Error::storage(format!("put {}: {}", key, DisplayErrorContext(&e))))?;
        debug!(key = %key, bytes = content_length, "Put object");
        Ok(())
    }

    async fn put_multipart(&self, object: PutObject, cancel: &CancellationToken) -> Result<()> {
        let PutObject {
            key,
            mut body,
            content_length,
            content_type,
            acl,
        } = object;
        let chunk_size = self.chunk_size.get();
        let parts = checked_part_count(&key, content_length, chunk_size)?;

        let mut create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type);
        if let Some(acl) = acl {
            create = create.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        let upload_id = create
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!("start upload {}: {}", key, DisplayErrorContext(&e)))
            })?
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::storage(format!("start upload {}: no upload id", key)))?;

        info!(key = %key, bytes = content_length, parts, "Starting multipart upload");

        let session = S3Multipart {
            client: &self.client,
            bucket: &self.bucket,
            key: &key,
            upload_id,
        };
        send_parts(&session, &key, &mut body, content_length, chunk_size, cancel).await
    }
}

/// An open multipart upload
#[async_trait]
trait MultipartSession: Send + Sync {
    async fn upload_part(&self, part_number: i32, data: Vec<u8>) -> Result<CompletedPart>;

    async fn complete(&self, parts: Vec<CompletedPart>) -> Result<()>;

    async fn abort(&self) -> Result<()>;
}

struct S3Multipart<'a> {
    client: &'a Client,
    bucket: &'a str,
    key: &'a str,
    upload_id: String,
}

#[async_trait]
impl MultipartSession for S3Multipart<'_> {
    async fn upload_part(&self, part_number: i32, data: Vec<u8>) -> Result<CompletedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(self.bucket)
            .key(self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .content_length(data.len() as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!(
                    "upload part {} of {}: {}",
                    part_number,
                    self.key,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    async fn complete(&self, parts: Vec<CompletedPart>) -> Result<()> {
        self.client
            .complete_multipart_upload()
            .bucket(self.bucket)
            .key(self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!("complete upload {}: {}", self.key, DisplayErrorContext(&e)))
            })?;
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(self.bucket)
            .key(self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(|e| {
                Error::storage(format!("abort upload {}: {}", self.key, DisplayErrorContext(&e)))
            })?;
        Ok(())
    }
}

/// Send every part and complete the upload, aborting it on any failure
/// or cancellation
async fn send_parts<S>(
    session: &S,
    key: &str,
    body: &mut ObjectBody,
    content_length: u64,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: MultipartSession + ?Sized,
{
    let result = upload_parts(session, key, body, content_length, chunk_size, cancel).await;
    if let Err(e) = &result {
        match session.abort().await {
            Ok(()) => info!(key = %key, reason = %e, "Aborted multipart upload"),
            Err(abort) => warn!(key = %key, "Can't abort multipart upload: {}", abort),
        }
    }
    result
}

async fn upload_parts<S>(
    session: &S,
    key: &str,
    body: &mut ObjectBody,
    content_length: u64,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: MultipartSession + ?Sized,
{
    let mut parts = Vec::new();
    let mut sent = 0u64;

    while sent < content_length {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let want = (content_length - sent).min(chunk_size as u64) as usize;
        let data = read_chunk(body, want).await?;
        if data.len() != want {
            return Err(Error::storage(format!(
                "{}: body ended after {} of {} bytes",
                key,
                sent + data.len() as u64,
                content_length
            )));
        }

        let part_number = parts.len() as i32 + 1;
        let part = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            part = session.upload_part(part_number, data) => part?,
        };
        parts.push(part);
        sent += want as u64;
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    session.complete(parts).await
}

#[async_trait]
impl ObjectLister for S3Store {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(request.max_keys as i32);
        if !request.prefix.is_empty() {
            call = call.prefix(&request.prefix);
        }
        if let Some(delimiter) = &request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(token) = &request.continuation {
            call = call.continuation_token(token);
        }

        let output = call
            .send()
            .await
            .map_err(|e| Error::listing(&request.prefix, DisplayErrorContext(&e)))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(RemoteObject {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    identity_tag: object.e_tag().unwrap_or_default().to_string(),
                })
            })
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|prefix| prefix.prefix().map(str::to_string))
            .collect();
        let continuation = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            continuation,
        })
    }
}

#[async_trait]
impl ObjectTransfer for S3Store {
    async fn put_object(&self, object: PutObject, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if object.content_length > self.chunk_size.get() as u64 {
            self.put_multipart(object, cancel).await
        } else {
            // a single put that never finished leaves nothing behind
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                result = self.put_single(object) => result,
            }
        }
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::storage(format!("get {}: {}", key, DisplayErrorContext(&e))))?;

        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::storage(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| Error::storage(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Error::storage(format!("delete: {}", DisplayErrorContext(&e))))?;

        // quiet mode only reports the keys that failed
        let failed: HashMap<&str, String> = output
            .errors()
            .iter()
            .filter_map(|error| {
                let reason = match (error.code(), error.message()) {
                    (Some(code), Some(message)) => format!("{}: {}", code, message),
                    (Some(code), None) => code.to_string(),
                    (None, Some(message)) => message.to_string(),
                    (None, None) => "unknown error".to_string(),
                };
                error.key().map(|key| (key, reason))
            })
            .collect();

        Ok(keys
            .iter()
            .map(|key| match failed.get(key.as_str()) {
                Some(reason) => DeleteOutcome::failed(key, reason.clone()),
                None => DeleteOutcome::deleted(key),
            })
            .collect())
    }
}

impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Endpoint to send requests to, `None` for the SDK default
fn endpoint_url(endpoint: Option<&str>, region: &str, disable_ssl: bool) -> Option<String> {
    let scheme = if disable_ssl { "http" } else { "https" };
    match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
        Some(endpoint) if endpoint.contains("://") => Some(endpoint.to_string()),
        Some(endpoint) => Some(format!("{}://{}", scheme, endpoint)),
        None if disable_ssl => Some(format!("http://s3.{}.amazonaws.com", region)),
        None => None,
    }
}

fn part_count(content_length: u64, chunk_size: usize) -> u64 {
    content_length.div_ceil(chunk_size.max(1) as u64).max(1)
}

/// Part count for an upload, rejecting uploads S3 would refuse to complete
fn checked_part_count(key: &str, content_length: u64, chunk_size: usize) -> Result<u64> {
    let parts = part_count(content_length, chunk_size);
    if parts > MAX_PARTS {
        return Err(Error::storage(format!(
            "{}: {} bytes need {} parts of {} bytes, more than the {} a multipart upload allows; \
             raise sync.chunk_size",
            key, content_length, parts, chunk_size, MAX_PARTS
        )));
    }
    Ok(parts)
}

/// Read up to `len` bytes, stopping early only at end of stream
async fn read_chunk<R>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut data = Vec::with_capacity(len);
    (&mut *reader).take(len as u64).read_to_end(&mut data).await?;
    Ok(data)
}
