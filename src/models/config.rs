//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// The tracked page and its selectors
    #[serde(default)]
    pub target: TargetConfig,

    /// Rendering session settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Subscriber registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Offer state persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// GitHub API access
    #[serde(default)]
    pub github: GitHubConfig,

    /// Push delivery settings
    #[serde(default)]
    pub push: PushConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply secrets and deployment identity from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Some(repo) = lookup("GITHUB_REPO") {
            self.github.repository = repo.trim().to_string();
        }
        if let Some(account) = lookup("FIREBASE_CONFIG") {
            self.push.service_account_json = Some(account);
        }
        if let Some(url) = lookup("WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
    }

    /// Whether any configured component talks to GitHub.
    pub fn uses_github(&self) -> bool {
        self.registry.backend == RegistryBackend::Github
            || self.store.backend == StoreBackend::Github
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.target.url)
            .map_err(|e| AppError::validation(format!("target.url is invalid: {e}")))?;
        for (name, value) in [
            ("target.container_selector", &self.target.container_selector),
            ("target.title_selector", &self.target.title_selector),
            ("target.link_selector", &self.target.link_selector),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::validation(format!("{name} is empty")));
            }
        }

        if self.browser.user_agent.trim().is_empty() {
            return Err(AppError::validation("browser.user_agent is empty"));
        }
        if self.browser.page_load_timeout_secs == 0 {
            return Err(AppError::validation(
                "browser.page_load_timeout_secs must be > 0",
            ));
        }
        if self.browser.selector_timeout_secs == 0 {
            return Err(AppError::validation(
                "browser.selector_timeout_secs must be > 0",
            ));
        }
        if self.browser.mode == ExtractorMode::Webdriver
            && self.browser.webdriver_url.trim().is_empty()
        {
            return Err(AppError::validation("browser.webdriver_url is empty"));
        }

        if self.registry.label.trim().is_empty() {
            return Err(AppError::validation("registry.label is empty"));
        }
        if self.registry.backend == RegistryBackend::File && self.registry.file.trim().is_empty() {
            return Err(AppError::validation("registry.file is empty"));
        }

        if self.store.path.trim().is_empty() {
            return Err(AppError::validation("store.path is empty"));
        }
        if self.store.backend == StoreBackend::S3 && self.store.s3_bucket.trim().is_empty() {
            return Err(AppError::validation("store.s3_bucket is empty"));
        }

        if self.uses_github() {
            self.github.owner_repo()?;
        }

        if !(1..=500).contains(&self.push.batch_size) {
            return Err(AppError::validation(
                "push.batch_size must be between 1 and 500",
            ));
        }
        if self.push.notification_title.trim().is_empty() {
            return Err(AppError::validation("push.notification_title is empty"));
        }
        Ok(())
    }
}

/// The page being watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Page URL
    #[serde(default = "defaults::target_url")]
    pub url: String,

    /// CSS selector for the offer container
    #[serde(default = "defaults::container_selector")]
    pub container_selector: String,

    /// Title selector, scoped to the container
    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    /// Link selector, scoped to the container
    #[serde(default = "defaults::link_selector")]
    pub link_selector: String,
}

impl TargetConfig {
    /// Scheme, host and port of the target page.
    pub fn origin(&self) -> Result<String> {
        let url = url::Url::parse(&self.url)?;
        Ok(url.origin().ascii_serialization())
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: defaults::target_url(),
            container_selector: defaults::container_selector(),
            title_selector: defaults::title_selector(),
            link_selector: defaults::link_selector(),
        }
    }
}

/// How the current offer is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorMode {
    /// Headless browser over WebDriver
    #[default]
    Webdriver,
    /// Plain HTTP fetch and HTML parsing
    Static,
}

/// Rendering session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub mode: ExtractorMode,

    /// WebDriver server endpoint
    #[serde(default = "defaults::webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "defaults::headless")]
    pub headless: bool,

    /// Browser process flags
    #[serde(default = "defaults::browser_args")]
    pub args: Vec<String>,

    /// User-Agent presented to the site
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept-Language header value
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Accept header value
    #[serde(default = "defaults::accept")]
    pub accept: String,

    /// Navigation and network settlement deadline
    #[serde(default = "defaults::page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Deadline for the offer container to appear
    #[serde(default = "defaults::selector_timeout")]
    pub selector_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::default(),
            webdriver_url: defaults::webdriver_url(),
            headless: defaults::headless(),
            args: defaults::browser_args(),
            user_agent: defaults::user_agent(),
            accept_language: defaults::accept_language(),
            accept: defaults::accept(),
            page_load_timeout_secs: defaults::page_load_timeout(),
            selector_timeout_secs: defaults::selector_timeout(),
        }
    }
}

/// Where subscriber records come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Labeled GitHub issues
    #[default]
    Github,
    /// One token per line in a local file
    File,
}

/// Subscriber registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,

    /// Classification label marking registration records
    #[serde(default = "defaults::registry_label")]
    pub label: String,

    /// Record status filter
    #[serde(default = "defaults::registry_state")]
    pub state: String,

    /// Token file for the `file` backend
    #[serde(default = "defaults::registry_file")]
    pub file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::default(),
            label: defaults::registry_label(),
            state: defaults::registry_state(),
            file: defaults::registry_file(),
        }
    }
}

/// Content store backend for the offer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// GitHub repository contents
    #[default]
    Github,
    /// Local filesystem
    Local,
    /// AWS S3 bucket
    S3,
}

/// Offer state persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Record path inside the store
    #[serde(default = "defaults::store_path")]
    pub path: String,

    /// Root directory for the `local` backend
    #[serde(default = "defaults::local_dir")]
    pub local_dir: String,

    /// Bucket for the `s3` backend
    #[serde(default)]
    pub s3_bucket: String,

    /// Key prefix for the `s3` backend
    #[serde(default)]
    pub s3_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: defaults::store_path(),
            local_dir: defaults::local_dir(),
            s3_bucket: String::new(),
            s3_prefix: String::new(),
        }
    }
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "defaults::github_api_base")]
    pub api_base: String,

    /// Repository in `owner/repo` form
    #[serde(default)]
    pub repository: String,

    /// Branch for content writes (repository default when unset)
    #[serde(default)]
    pub branch: Option<String>,

    /// API token, normally supplied through `GITHUB_TOKEN`
    #[serde(default, skip_serializing)]
    pub token: String,

    #[serde(default = "defaults::http_timeout")]
    pub timeout_secs: u64,
}

impl GitHubConfig {
    /// Split `repository` into owner and name.
    pub fn owner_repo(&self) -> Result<(&str, &str)> {
        match self.repository.split_once('/') {
            Some((owner, repo))
                if !owner.trim().is_empty() && !repo.trim().is_empty() && !repo.contains('/') =>
            {
                Ok((owner.trim(), repo.trim()))
            }
            _ => Err(AppError::validation(format!(
                "github.repository must be 'owner/repo', got '{}'",
                self.repository
            ))),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::github_api_base(),
            repository: String::new(),
            branch: None,
            token: String::new(),
            timeout_secs: defaults::http_timeout(),
        }
    }
}

/// Push delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Targets per send request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Fixed notification title
    #[serde(default = "defaults::notification_title")]
    pub notification_title: String,

    #[serde(default = "defaults::fcm_api_base")]
    pub fcm_api_base: String,

    /// Service-account key file
    #[serde(default)]
    pub service_account_path: Option<String>,

    /// Service-account key JSON, normally supplied through `FIREBASE_CONFIG`
    #[serde(skip)]
    pub service_account_json: Option<String>,

    #[serde(default = "defaults::http_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            notification_title: defaults::notification_title(),
            fcm_api_base: defaults::fcm_api_base(),
            service_account_path: None,
            service_account_json: None,
            timeout_secs: defaults::http_timeout(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Target defaults
    pub fn target_url() -> String {
        "https://www.lagonika.gr/".into()
    }
    pub fn container_selector() -> String {
        "#tour-offerContainer".into()
    }
    pub fn title_selector() -> String {
        "h3".into()
    }
    pub fn link_selector() -> String {
        "a.linkTag".into()
    }

    // Browser defaults
    pub fn webdriver_url() -> String {
        "http://localhost:9515".into()
    }
    pub fn headless() -> bool {
        true
    }
    pub fn browser_args() -> Vec<String> {
        vec![
            "--no-sandbox".into(),
            "--disable-setuid-sandbox".into(),
            "--disable-dev-shm-usage".into(),
            "--disable-gpu".into(),
            "--disable-background-timer-throttling".into(),
            "--disable-backgrounding-occluded-windows".into(),
            "--disable-renderer-backgrounding".into(),
        ]
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn accept_language() -> String {
        "en-US,en;q=0.9,el;q=0.8".into()
    }
    pub fn accept() -> String {
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".into()
    }
    pub fn page_load_timeout() -> u64 {
        60
    }
    pub fn selector_timeout() -> u64 {
        30
    }

    // Registry defaults
    pub fn registry_label() -> String {
        "device-token".into()
    }
    pub fn registry_state() -> String {
        "open".into()
    }
    pub fn registry_file() -> String {
        "subscribers.txt".into()
    }

    // Store defaults
    pub fn store_path() -> String {
        "last-offer.json".into()
    }
    pub fn local_dir() -> String {
        "storage".into()
    }

    // Remote API defaults
    pub fn github_api_base() -> String {
        "https://api.github.com".into()
    }
    pub fn fcm_api_base() -> String {
        "https://fcm.googleapis.com".into()
    }
    pub fn http_timeout() -> u64 {
        30
    }

    // Push defaults
    pub fn batch_size() -> usize {
        5
    }
    pub fn notification_title() -> String {
        "🚀 Νέα Προσφορά!".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.github.repository = "octo/offers".to_string();
        config
    }

    #[test]
    fn validate_default_config_with_repository_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_requires_repository_for_github_backends() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registry.backend = RegistryBackend::File;
        config.store.backend = StoreBackend::Local;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_batch_size_out_of_range() {
        let mut config = valid_config();
        config.push.batch_size = 0;
        assert!(config.validate().is_err());
        config.push.batch_size = 501;
        assert!(config.validate().is_err());
        config.push.batch_size = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = valid_config();
        config.browser.selector_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn owner_repo_parsing() {
        let mut github = GitHubConfig::default();
        github.repository = "octo/offers".into();
        assert_eq!(github.owner_repo().unwrap(), ("octo", "offers"));

        for bad in ["", "octo", "octo/", "/offers", "a/b/c"] {
            github.repository = bad.into();
            assert!(github.owner_repo().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn env_overrides_secrets() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GITHUB_TOKEN", "ghp_test"),
            ("GITHUB_REPO", " octo/offers "),
            ("FIREBASE_CONFIG", "{}"),
            ("WEBDRIVER_URL", ""),
        ]);
        let mut config = Config::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.github.token, "ghp_test");
        assert_eq!(config.github.repository, "octo/offers");
        assert_eq!(config.push.service_account_json.as_deref(), Some("{}"));
        assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [push]
            batch_size = 50

            [store]
            backend = "local"
            "#,
        )
        .unwrap();
        assert_eq!(config.push.batch_size, 50);
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.store.path, "last-offer.json");
        assert_eq!(config.browser.page_load_timeout_secs, 60);
        assert_eq!(config.target.container_selector, "#tour-offerContainer");
    }

    #[test]
    fn target_origin() {
        let target = TargetConfig::default();
        assert_eq!(target.origin().unwrap(), "https://www.lagonika.gr");
    }

    #[test]
    fn token_is_never_serialized() {
        let mut config = valid_config();
        config.github.token = "secret".into();
        let out = toml::to_string(&config).unwrap();
        assert!(!out.contains("secret"));
    }
}
