//! In-process object store
//!
//! Behaves like an S3-compatible bucket for the parts the sync engine relies
//! on: chunked ETags, paged listings with continuation tokens, delimiter
//! grouping, and per-key delete outcomes. Failures can be injected per key.

use crate::fingerprint::ContentFingerprint;
use async_trait::async_trait;
use bucketsync_types::{
    ChunkSize, DeleteOutcome, Error, ListPage, ListRequest, ObjectBody, ObjectLister, ObjectStore,
    ObjectTransfer, PutObject, RemoteObject, Result,
};
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An object held by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object payload
    pub data: Bytes,
    /// ETag computed with the store's chunk size
    pub etag: String,
    /// Content type sent with the upload
    pub content_type: String,
    /// Canned ACL sent with the upload
    pub acl: Option<String>,
}

#[derive(Debug, Default)]
struct FailureInjection {
    puts: HashSet<String>,
    gets: HashSet<String>,
    deletes: HashSet<String>,
    listing: bool,
}

/// Object store backed by an in-memory ordered map
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fingerprint: ContentFingerprint,
    page_size: usize,
    failures: RwLock<FailureInjection>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store for `bucket`
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            fingerprint: ContentFingerprint::default(),
            page_size: ListRequest::DEFAULT_MAX_KEYS as usize,
            failures: RwLock::new(FailureInjection::default()),
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }

    /// Limit listing pages to `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Compute ETags with `chunk_size` parts
    pub fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.fingerprint = ContentFingerprint::new(chunk_size);
        self
    }

    /// Store an object directly, bypassing failure injection
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        let data = data.into();
        let object = StoredObject {
            etag: self.fingerprint.fingerprint(&data),
            data,
            content_type: "binary/octet-stream".to_string(),
            acl: None,
        };
        self.objects.write().await.insert(key.into(), object);
    }

    /// Look up an object
    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Payload of an object
    pub async fn data(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }

    /// All keys, in order
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Make uploads of `key` fail
    pub async fn fail_puts_for(&self, key: impl Into<String>) {
        self.failures.write().await.puts.insert(key.into());
    }

    /// Make downloads of `key` fail
    pub async fn fail_gets_for(&self, key: impl Into<String>) {
        self.failures.write().await.gets.insert(key.into());
    }

    /// Make deletion of `key` fail
    pub async fn fail_deletes_for(&self, key: impl Into<String>) {
        self.failures.write().await.deletes.insert(key.into());
    }

    /// Make every listing page fail
    pub async fn fail_listing(&self, fail: bool) {
        self.failures.write().await.listing = fail;
    }

    /// Number of listing pages served
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of upload attempts
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectLister for MemoryObjectStore {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.read().await.listing {
            return Err(Error::listing(&request.prefix, "injected listing failure"));
        }

        let limit = self.page_size.min(request.max_keys.max(1) as usize);
        let lower = match &request.continuation {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };

        let objects = self.objects.read().await;
        let mut page = ListPage::default();
        let mut entries = 0usize;
        let mut last_key = None;
        let mut more = false;

        for (key, object) in objects.range((lower, Bound::Unbounded)) {
            if !key.starts_with(&request.prefix) {
                // keys sharing the prefix are contiguous and sort at or after it
                if key.as_str() > request.prefix.as_str() {
                    break;
                }
                continue;
            }

            let rest = &key[request.prefix.len()..];
            let common_prefix = request
                .delimiter
                .as_deref()
                .and_then(|delimiter| rest.find(delimiter).map(|at| at + delimiter.len()))
                .map(|end| format!("{}{}", request.prefix, &rest[..end]));

            if let Some(common_prefix) = &common_prefix {
                if page.common_prefixes.last() == Some(common_prefix) {
                    last_key = Some(key.clone());
                    continue;
                }
            }

            if entries == limit {
                more = true;
                break;
            }

            match common_prefix {
                Some(common_prefix) => page.common_prefixes.push(common_prefix),
                None => page.objects.push(RemoteObject {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    identity_tag: object.etag.clone(),
                }),
            }
            entries += 1;
            last_key = Some(key.clone());
        }

        if more {
            page.continuation = last_key;
        }

        debug!(
            prefix = %request.prefix,
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            more,
            "Served listing page"
        );
        Ok(page)
    }
}

#[async_trait]
impl ObjectTransfer for MemoryObjectStore {
    async fn put_object(&self, mut object: PutObject, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.read().await.puts.contains(&object.key) {
            return Err(Error::storage(format!("injected upload failure for {}", object.key)));
        }

        let mut data = Vec::new();
        object.body.read_to_end(&mut data).await?;
        if data.len() as u64 != object.content_length {
            return Err(Error::storage(format!(
                "{}: declared {} bytes but body had {}",
                object.key,
                object.content_length,
                data.len()
            )));
        }

        let stored = StoredObject {
            etag: self.fingerprint.fingerprint(&data),
            data: Bytes::from(data),
            content_type: object.content_type,
            acl: object.acl,
        };
        self.objects.write().await.insert(object.key, stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        if self.failures.read().await.gets.contains(key) {
            return Err(Error::storage(format!("injected download failure for {}", key)));
        }

        let data = self
            .data(key)
            .await
            .ok_or_else(|| Error::storage(format!("NoSuchKey: {}", key)))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        if keys.len() > self.max_delete_batch() {
            return Err(Error::storage(format!(
                "delete batch of {} exceeds {}",
                keys.len(),
                self.max_delete_batch()
            )));
        }

        let failures = self.failures.read().await;
        let mut objects = self.objects.write().await;
        Ok(keys
            .iter()
            .map(|key| {
                if failures.deletes.contains(key) {
                    DeleteOutcome::failed(key, "AccessDenied")
                } else {
                    objects.remove(key);
                    DeleteOutcome::deleted(key)
                }
            })
            .collect())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }
}
