// src/bootstrap.rs

//! Wiring of concrete components from the configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::clients::{FcmClient, GitHubClient, WebDriverLauncher};
use crate::error::{AppError, Result};
use crate::models::{Config, ExtractorMode, RegistryBackend, StoreBackend};
use crate::pipeline::ChangeDetectionPipeline;
use crate::services::{
    ClientProfile, LineFileSource, NotificationDispatcher, OfferExtractor, OfferSource,
    OfferStateStore, RecordSource, StaticOfferExtractor, SubscriberRegistry,
};
use crate::storage::{ContentStore, GitHubStorage, LocalStorage};

/// Build the full pipeline.
pub async fn build(config: &Config) -> Result<ChangeDetectionPipeline> {
    let github = github_client(config)?;

    let source: Arc<dyn RecordSource> = match config.registry.backend {
        RegistryBackend::Github => Arc::new(require_github(&github)?.clone()),
        RegistryBackend::File => Arc::new(LineFileSource::new(&config.registry.file)),
    };
    let registry = SubscriberRegistry::new(source, &config.registry);

    let extractor = build_extractor(config)?;
    let state = build_state_store_with(config, github.as_ref()).await?;

    let push = Arc::new(FcmClient::from_config(&config.push)?);
    log::info!("Push delivery via FCM project {}", push.project_id());
    let dispatcher = NotificationDispatcher::from_config(push, &config.push);

    Ok(ChangeDetectionPipeline::new(
        registry, extractor, state, dispatcher,
    ))
}

/// Build the offer extractor for the configured mode.
pub fn build_extractor(config: &Config) -> Result<Arc<dyn OfferSource>> {
    let browser = &config.browser;
    match browser.mode {
        ExtractorMode::Webdriver => {
            let launcher = Arc::new(WebDriverLauncher::new(&browser.webdriver_url));
            let extractor = OfferExtractor::new(
                launcher,
                ClientProfile::from_config(browser),
                &config.target,
            )?
            .with_timeouts(
                Duration::from_secs(browser.page_load_timeout_secs),
                Duration::from_secs(browser.selector_timeout_secs),
            );
            Ok(Arc::new(extractor))
        }
        ExtractorMode::Static => Ok(Arc::new(StaticOfferExtractor::from_config(
            &config.target,
            browser,
        )?)),
    }
}

/// Build the offer state store on its own. Only a GitHub store needs the repository.
pub async fn build_state_store(config: &Config) -> Result<OfferStateStore> {
    let github = match config.store.backend {
        StoreBackend::Github => Some(GitHubClient::from_config(&config.github)?),
        StoreBackend::Local | StoreBackend::S3 => None,
    };
    build_state_store_with(config, github.as_ref()).await
}

async fn build_state_store_with(
    config: &Config,
    github: Option<&GitHubClient>,
) -> Result<OfferStateStore> {
    let store: Arc<dyn ContentStore> = match config.store.backend {
        StoreBackend::Github => {
            let client = github.ok_or_else(|| AppError::config("GitHub client not configured"))?;
            Arc::new(GitHubStorage::new(client.clone(), config.github.branch.clone()))
        }
        StoreBackend::Local => Arc::new(LocalStorage::new(&config.store.local_dir)),
        StoreBackend::S3 => s3_store(config).await?,
    };
    Ok(OfferStateStore::new(store, &config.store.path))
}

#[cfg(feature = "s3")]
async fn s3_store(config: &Config) -> Result<Arc<dyn ContentStore>> {
    Ok(Arc::new(crate::storage::S3Storage::from_config(&config.store).await?))
}

#[cfg(not(feature = "s3"))]
async fn s3_store(_config: &Config) -> Result<Arc<dyn ContentStore>> {
    Err(AppError::config(
        "store.backend = \"s3\" requires building with the `s3` feature",
    ))
}

fn github_client(config: &Config) -> Result<Option<GitHubClient>> {
    if config.uses_github() {
        Ok(Some(GitHubClient::from_config(&config.github)?))
    } else {
        Ok(None)
    }
}

fn require_github(github: &Option<GitHubClient>) -> Result<&GitHubClient> {
    github
        .as_ref()
        .ok_or_else(|| AppError::config("GitHub client not configured"))
}
