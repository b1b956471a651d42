//! Local filesystem storage implementation.
//!
//! Used for development runs and tests. Production deployments keep the offer
//! state in the GitHub repository or S3.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── last-offer.json       # Offer state record
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{ContentStore, StoredContent};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Content hash used as the version token.
    fn version_of(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

#[async_trait]
impl ContentStore for LocalStorage {
    async fn get(&self, path: &str) -> Result<Option<StoredContent>> {
        Ok(self.read_bytes(path).await?.map(|body| StoredContent {
            version: Self::version_of(&body),
            body,
        }))
    }

    async fn put(
        &self,
        path: &str,
        body: &[u8],
        message: &str,
        version: Option<&str>,
    ) -> Result<()> {
        if let Some(expected) = version {
            let current = self.read_bytes(path).await?;
            let matches = current
                .as_deref()
                .is_some_and(|bytes| Self::version_of(bytes) == expected);
            if !matches {
                return Err(AppError::Conflict(self.location(path)));
            }
        }

        self.write_bytes(path, body).await?;
        log::debug!("{}: {}", self.location(path), message);
        Ok(())
    }

    fn location(&self, path: &str) -> String {
        self.path(path).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put("state/test.json", b"hello", "init", None).await.unwrap();
        let stored = storage.get("state/test.json").await.unwrap().unwrap();
        assert_eq!(stored.body, b"hello".to_vec());
        assert_eq!(stored.version.len(), 64);
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.get("nope.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guarded_write_accepts_current_version() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put("a.json", b"one", "first", None).await.unwrap();
        let version = storage.get("a.json").await.unwrap().unwrap().version;
        storage
            .put("a.json", b"two", "second", Some(&version))
            .await
            .unwrap();

        let stored = storage.get("a.json").await.unwrap().unwrap();
        assert_eq!(stored.body, b"two".to_vec());
        assert_ne!(stored.version, version);
    }

    #[tokio::test]
    async fn test_guarded_write_rejects_stale_version() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put("a.json", b"one", "first", None).await.unwrap();
        let stale = storage.get("a.json").await.unwrap().unwrap().version;
        storage.put("a.json", b"two", "other writer", None).await.unwrap();

        let err = storage
            .put("a.json", b"three", "late", Some(&stale))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = storage.get("a.json").await.unwrap().unwrap();
        assert_eq!(stored.body, b"two".to_vec());
    }

    #[tokio::test]
    async fn test_guarded_write_on_missing_record_conflicts() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let err = storage
            .put("gone.json", b"x", "late", Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
