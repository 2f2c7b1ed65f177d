//! Storage capability traits
//!
//! The sync engine never talks to a storage backend directly. It drives these
//! traits, which an S3 client, an in-memory store, or any other object store
//! can implement.

use crate::{DeleteOutcome, ListPage, ListRequest, ObjectBody, PutObject, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Paginated listing of a bucket
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Fetch one page. Callers keep requesting pages until the returned
    /// page carries no continuation token.
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;
}

/// Object transfer operations against a bucket
#[async_trait]
pub trait ObjectTransfer: Send + Sync {
    /// Store an object, replacing any existing object with the same key.
    ///
    /// Once `cancel` fires the upload stops at the next safe point, anything
    /// partially stored is cleaned up, and [`crate::Error::Cancelled`] is
    /// returned.
    async fn put_object(&self, object: PutObject, cancel: &CancellationToken) -> Result<()>;

    /// Open an object for streaming reads
    async fn get_object(&self, key: &str) -> Result<ObjectBody>;

    /// Delete a batch of keys, reporting an outcome for every key
    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteOutcome>>;

    /// Largest batch `delete_objects` accepts in one call
    fn max_delete_batch(&self) -> usize {
        1000
    }
}

/// Combined listing and transfer capability for one bucket
pub trait ObjectStore: ObjectLister + ObjectTransfer {
    /// Name of the bucket this store operates on
    fn bucket(&self) -> &str;
}
