//! Paginated remote listing

use crate::keys;
use bucketsync_types::{Error, FileMap, FileRecord, ListRequest, ObjectLister, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads every object under a prefix into a [`FileMap`]
#[derive(Debug, Clone, Default)]
pub struct RemoteListingReader {
    delimited: bool,
    cancel: CancellationToken,
}

impl RemoteListingReader {
    /// Create a reader for recursive listings
    pub fn new() -> Self {
        Self::default()
    }

    /// List only the objects directly under the prefix
    pub fn delimited(mut self, delimited: bool) -> Self {
        self.delimited = delimited;
        self
    }

    /// Stop between pages once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// List `prefix`, following continuation tokens until the listing is
    /// complete.
    ///
    /// Keys are returned relative to the prefix. Folder markers (keys ending
    /// in `/`) are dropped. A failed page is fatal.
    pub async fn list<L>(&self, lister: &L, prefix: &str) -> Result<FileMap>
    where
        L: ObjectLister + ?Sized,
    {
        let list_prefix = keys::listing_prefix(prefix);
        let mut files = FileMap::new();
        let mut continuation = None;
        let mut pages = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut request = ListRequest::new(list_prefix.clone()).with_continuation(continuation);
            if self.delimited {
                request = request.with_delimiter("/");
            }

            let page = lister
                .list_page(&request)
                .await
                .map_err(|e| match e {
                    Error::Cancelled | Error::Listing { .. } => e,
                    other => Error::listing(list_prefix.clone(), other),
                })?;
            pages += 1;

            if !page.common_prefixes.is_empty() {
                debug!(count = page.common_prefixes.len(), "Ignoring common prefixes");
            }

            for object in page.objects {
                let Some(relative) = object.key.strip_prefix(&list_prefix) else {
                    debug!(key = %object.key, "Ignoring key outside listing prefix");
                    continue;
                };
                if relative.is_empty() || relative.ends_with('/') {
                    continue;
                }

                files.insert(
                    relative.to_string(),
                    FileRecord::remote(relative, object.size, object.identity_tag),
                );
            }

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        info!(prefix = %list_prefix, objects = files.len(), pages, "Listed remote prefix");
        Ok(files)
    }
}
