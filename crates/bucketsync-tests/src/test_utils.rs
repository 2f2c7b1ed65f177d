//! Unified test utilities for bucketsync tests

use async_trait::async_trait;
use bucketsync_sync::{MemoryObjectStore, SyncEngine};
use bucketsync_types::{
    DeleteOutcome, ListPage, ListRequest, ObjectBody, ObjectLister, ObjectStore, ObjectTransfer,
    PutObject, Result,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Realistic file pattern similar to actual files
    Realistic,
}

/// Generate test data with specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Realistic => (0..size).map(|i| ((i * 7 + 13) % 256) as u8).collect(),
    }
}

/// A local directory tree living in a temporary directory
pub struct TestTree {
    temp_dir: TempDir,
}

impl TestTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Create a tree holding `files`
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let tree = Self::new();
        for (key, data) in files {
            tree.write(key, data);
        }
        tree
    }

    /// Root directory of the tree
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of `key` inside the tree
    pub fn file(&self, key: &str) -> PathBuf {
        self.path().join(key)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, key: &str, data: &[u8]) {
        let path = self.file(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(path, data).expect("Failed to write test file");
    }

    /// Read a file
    pub fn read(&self, key: &str) -> Vec<u8> {
        fs::read(self.file(key)).expect("Failed to read test file")
    }

    /// Remove a file
    pub fn remove(&self, key: &str) {
        fs::remove_file(self.file(key)).expect("Failed to remove test file");
    }

    /// All file keys in the tree, sorted and `/`-separated
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(self.path(), "", &mut keys);
        keys.sort();
        keys
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) {
    for entry in fs::read_dir(dir).expect("Failed to read dir") {
        let entry = entry.expect("Failed to read dir entry");
        let name = entry.file_name().to_string_lossy().to_string();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if entry.path().is_dir() {
            collect_keys(&entry.path(), &key, keys);
        } else {
            keys.push(key);
        }
    }
}

/// An in-memory bucket holding `objects`
pub async fn bucket_with(objects: &[(&str, &[u8])]) -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new("test-bucket"));
    for (key, data) in objects {
        store.insert(*key, data.to_vec()).await;
    }
    store
}

/// A sync engine over a shared in-memory bucket
pub fn engine_for(store: &Arc<MemoryObjectStore>) -> SyncEngine {
    SyncEngine::new(Arc::clone(store) as Arc<dyn ObjectStore>)
}

/// Store wrapper that cancels a token once a number of uploads went through
pub struct CancelAfterPuts {
    inner: Arc<MemoryObjectStore>,
    token: CancellationToken,
    remaining: AtomicUsize,
}

impl CancelAfterPuts {
    /// Cancel `token` after `puts` successful uploads
    pub fn new(inner: Arc<MemoryObjectStore>, token: CancellationToken, puts: usize) -> Self {
        Self {
            inner,
            token,
            remaining: AtomicUsize::new(puts),
        }
    }
}

#[async_trait]
impl ObjectLister for CancelAfterPuts {
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage> {
        self.inner.list_page(request).await
    }
}

#[async_trait]
impl ObjectTransfer for CancelAfterPuts {
    async fn put_object(&self, object: PutObject, cancel: &CancellationToken) -> Result<()> {
        self.inner.put_object(object, cancel).await?;
        if self.remaining.fetch_sub(1, Ordering::SeqCst) <= 1 {
            self.token.cancel();
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        self.inner.get_object(key).await
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        self.inner.delete_objects(keys).await
    }
}

impl ObjectStore for CancelAfterPuts {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_data() {
        assert_eq!(generate_test_data(4, TestDataPattern::Zeros), vec![0; 4]);
        assert_eq!(generate_test_data(2, TestDataPattern::Realistic), vec![13, 20]);
    }

    #[test]
    fn test_tree_keys_are_relative() {
        let tree = TestTree::with_files(&[("b.txt", b"b"), ("a/c.txt", b"c")]);

        assert_eq!(tree.keys(), vec!["a/c.txt", "b.txt"]);
        assert_eq!(tree.read("a/c.txt"), b"c");
    }
}
