//! Local directory traversal

use crate::keys;
use bucketsync_types::{Error, FileMap, FileRecord, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Walks a local directory into a [`FileMap`] keyed by relative key
#[derive(Debug, Clone)]
pub struct LocalTreeScanner {
    follow_links: bool,
    cancel: CancellationToken,
}

impl LocalTreeScanner {
    /// Create a scanner that follows symbolic links
    pub fn new() -> Self {
        Self {
            follow_links: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop walking with [`Error::Cancelled`] once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set whether symbolic links are followed
    pub fn follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Scan `root` recursively.
    ///
    /// Directories are descended into but never produce records. Any traversal
    /// failure is fatal, since a partial scan would produce a wrong plan.
    pub fn scan(&self, root: &Path) -> Result<FileMap> {
        let mut files = FileMap::new();

        for entry in WalkDir::new(root).follow_links(self.follow_links) {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                Error::filesystem(path, e)
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let key = keys::relative_key(root, path).ok_or_else(|| {
                Error::filesystem(path, "path cannot be expressed as a UTF-8 relative key")
            })?;
            let size = entry
                .metadata()
                .map_err(|e| Error::filesystem(path, e))?
                .len();

            debug!(key = %key, size, "Found local file");
            files.insert(key.clone(), FileRecord::local(key, size, path));
        }

        info!(root = %root.display(), files = files.len(), "Scanned local tree");
        Ok(files)
    }

    /// Scan on the blocking thread pool
    pub async fn scan_async(&self, root: PathBuf) -> Result<FileMap> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| Error::other(format!("Local scan task failed: {}", e)))?
    }
}

impl Default for LocalTreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_types::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_nested_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("assets/css")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("index.html"), b"<html></html>").unwrap();
        fs::write(root.join("assets/css/main.css"), b"body{}").unwrap();

        let files = LocalTreeScanner::new().scan(root).unwrap();

        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["assets/css/main.css", "index.html"]);

        let record = &files["assets/css/main.css"];
        assert_eq!(record.size, 6);
        assert_eq!(record.identity_tag, None);
        assert_eq!(
            record.absolute_location.as_deref(),
            Some(root.join("assets/css/main.css").as_path())
        );
    }

    #[test]
    fn test_scan_empty_tree() {
        let temp_dir = TempDir::new().unwrap();
        let files = LocalTreeScanner::new().scan(temp_dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_missing_root_is_filesystem_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let error = LocalTreeScanner::new().scan(&missing).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Filesystem);
        assert!(error.is_fatal());
    }

    #[test]
    fn test_cancelled_scan_stops() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("x.txt"), b"x").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = LocalTreeScanner::new()
            .with_cancellation(cancel)
            .scan(temp_dir.path())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_scan_async() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("x.txt"), b"0123456789").unwrap();

        let files = LocalTreeScanner::new()
            .scan_async(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(files["x.txt"].size, 10);
    }
}
