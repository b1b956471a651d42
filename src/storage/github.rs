//! GitHub repository contents as a content store.
//!
//! Each record is a file in the repository; writes become commits. The blob
//! `sha` returned by the contents API is the version token.

use async_trait::async_trait;

use crate::clients::GitHubClient;
use crate::error::Result;
use crate::storage::{ContentStore, StoredContent};

/// Content store backed by a GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubStorage {
    client: GitHubClient,
    branch: Option<String>,
}

impl GitHubStorage {
    pub fn new(client: GitHubClient, branch: Option<String>) -> Self {
        Self { client, branch }
    }
}

#[async_trait]
impl ContentStore for GitHubStorage {
    async fn get(&self, path: &str) -> Result<Option<StoredContent>> {
        let Some(file) = self.client.get_content(path, self.branch.as_deref()).await? else {
            return Ok(None);
        };
        Ok(Some(StoredContent {
            body: file.decode()?,
            version: file.sha,
        }))
    }

    async fn put(
        &self,
        path: &str,
        body: &[u8],
        message: &str,
        version: Option<&str>,
    ) -> Result<()> {
        self.client
            .put_content(path, body, message, version, self.branch.as_deref())
            .await
    }

    fn location(&self, path: &str) -> String {
        match &self.branch {
            Some(branch) => format!("github:{}@{}/{}", self.client.full_name(), branch, path),
            None => format!("github:{}/{}", self.client.full_name(), path),
        }
    }
}
