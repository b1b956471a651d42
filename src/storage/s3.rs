//! AWS S3 storage implementation.
//!
//! Records are objects under `{prefix}/{path}`. The object ETag is the
//! version token; guarded writes use S3 conditional requests.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use log::info;

use crate::error::{AppError, Result};
use crate::models::StoreConfig;
use crate::storage::{ContentStore, StoredContent};

/// S3-based content store.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage from the store configuration and AWS environment.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.s3_bucket.trim().is_empty() {
            return Err(AppError::config("store.s3_bucket is empty"));
        }
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&sdk_config);
        Ok(Self::new(client, &config.s3_bucket, &config.s3_prefix))
    }

    fn key(&self, path: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            path.trim_start_matches('/').to_string()
        } else {
            format!("{}/{}", prefix, path.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl ContentStore for S3Storage {
    async fn get(&self, path: &str) -> Result<Option<StoredContent>> {
        let key = self.key(path);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let version = output.e_tag().unwrap_or_default().to_string();
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(StoredContent {
                    body: bytes.into_bytes().to_vec(),
                    version,
                }))
            }
            Err(err) => {
                // Check if it's a "not found" error
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    info!("No existing data at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    async fn put(
        &self,
        path: &str,
        body: &[u8],
        message: &str,
        version: Option<&str>,
    ) -> Result<()> {
        let key = self.key(path);
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body.to_vec()))
            .content_type("application/json");

        let request = match version {
            Some(etag) => request.if_match(etag),
            None => request.if_none_match("*"),
        };

        match request.send().await {
            Ok(_) => {
                info!("{} (s3://{}/{})", message, self.bucket, key);
                Ok(())
            }
            Err(err) => {
                let status = err.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(409) | Some(412)) {
                    Err(AppError::Conflict(self.location(path)))
                } else {
                    Err(AppError::S3(err.to_string()))
                }
            }
        }
    }

    fn location(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(path))
    }
}
