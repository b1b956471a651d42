// src/services/registry.rs

//! Subscriber registry reader.
//!
//! Subscribers are labeled records whose body is a device token. Reading is
//! the only operation; registration and cleanup happen elsewhere.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::GitHubClient;
use crate::error::Result;
use crate::models::{RegistryConfig, Target};

/// Source of labeled records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Bodies of the records carrying `label` in `state`. A record may have no body.
    async fn list_records(&self, label: &str, state: &str) -> Result<Vec<Option<String>>>;

    fn describe(&self) -> String;
}

#[async_trait]
impl RecordSource for GitHubClient {
    async fn list_records(&self, label: &str, state: &str) -> Result<Vec<Option<String>>> {
        let issues = self.list_issues(label, state).await?;
        Ok(issues.into_iter().map(|issue| issue.body).collect())
    }

    fn describe(&self) -> String {
        format!("GitHub issues of {}", self.full_name())
    }
}

/// One record per line of a local text file. Label and state do not apply.
#[derive(Debug, Clone)]
pub struct LineFileSource {
    path: PathBuf,
}

impl LineFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for LineFileSource {
    async fn list_records(&self, _label: &str, _state: &str) -> Result<Vec<Option<String>>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content.lines().map(|line| Some(line.to_string())).collect())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Loads the current subscriber targets.
pub struct SubscriberRegistry {
    source: Arc<dyn RecordSource>,
    label: String,
    state: String,
}

impl SubscriberRegistry {
    pub fn new(source: Arc<dyn RecordSource>, config: &RegistryConfig) -> Self {
        Self {
            source,
            label: config.label.clone(),
            state: config.state.clone(),
        }
    }

    /// Trimmed, non-empty record bodies in source order. Duplicates are kept.
    ///
    /// A failing source is logged and yields no targets.
    pub async fn list_targets(&self) -> Vec<Target> {
        log::info!("Fetching device tokens from {}...", self.source.describe());

        match self.source.list_records(&self.label, &self.state).await {
            Ok(records) => {
                let targets: Vec<Target> = records
                    .into_iter()
                    .flatten()
                    .map(|body| body.trim().to_string())
                    .filter(|body| !body.is_empty())
                    .collect();
                log::info!("Found {} registered devices", targets.len());
                targets
            }
            Err(e) => {
                log::error!("Error fetching tokens: {}", e);
                Vec::new()
            }
        }
    }
}
