//! Storage abstractions for offer state persistence.
//!
//! A content store is a small path-keyed key-value interface with optimistic
//! concurrency: every read returns an opaque version token, and a write may be
//! guarded by the token it expects to replace.
//!
//! ## Backends
//!
//! ```text
//! github  → repository contents API (version = blob sha)
//! local   → files under a root directory (version = SHA-256 of the bytes)
//! s3      → bucket objects (version = ETag), behind the `s3` feature
//! ```

pub mod github;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use github::GitHubStorage;
pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// A stored record with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    /// Raw record bytes
    pub body: Vec<u8>,
    /// Opaque token identifying this revision
    pub version: String,
}

/// Trait for content store backends.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the record at `path`, or `None` if it does not exist.
    async fn get(&self, path: &str) -> Result<Option<StoredContent>>;

    /// Create or replace the record at `path`.
    ///
    /// With `version = Some(token)` the write only succeeds if the stored
    /// revision still matches. `None` carries no expected revision; backends
    /// with conditional creates (S3) then refuse to replace an existing record.
    async fn put(
        &self,
        path: &str,
        body: &[u8],
        message: &str,
        version: Option<&str>,
    ) -> Result<()>;

    /// Human-readable location of `path`, for logs.
    fn location(&self, path: &str) -> String;
}
