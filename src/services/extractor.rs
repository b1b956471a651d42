// src/services/extractor.rs

//! Offer extraction from the tracked page.
//!
//! The browser extractor renders the page in a headless session and reads the
//! offer from the live DOM. The static extractor parses the raw HTML and is
//! only useful while the page serves its offer without scripting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{BrowserConfig, Offer, TargetConfig};
use crate::utils::http::{api_error, create_page_client};

const CONTAINER_POLL: Duration = Duration::from_millis(250);

/// Anything that can produce the currently published offer.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn fetch_current_offer(&self) -> Result<Offer>;
}

/// Identity presented by the rendering session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub accept: String,
    pub headless: bool,
    /// Browser process flags
    pub args: Vec<String>,
}

impl ClientProfile {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            accept: config.accept.clone(),
            headless: config.headless,
            args: config.args.clone(),
        }
    }
}

/// CSS selectors locating the offer on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSelectors {
    pub container: String,
    pub title: String,
    pub link: String,
}

impl OfferSelectors {
    pub fn from_config(config: &TargetConfig) -> Self {
        Self {
            container: config.container_selector.clone(),
            title: config.title_selector.clone(),
            link: config.link_selector.clone(),
        }
    }

    /// In-page script returning `{title, link}` from inside the container.
    pub fn extraction_script(&self) -> String {
        // Selectors are embedded as JSON string literals.
        let quote = |s: &str| serde_json::Value::from(s).to_string();
        format!(
            r#"
            const container = document.querySelector({container});
            if (!container) {{
                return {{ title: null, link: null }};
            }}
            const titleEl = container.querySelector({title});
            const linkEl = container.querySelector({link});
            return {{
                title: titleEl ? (titleEl.innerText || titleEl.textContent || '').trim() || null : null,
                link: linkEl ? linkEl.href || linkEl.getAttribute('href') || null : null
            }};
            "#,
            container = quote(&self.container),
            title = quote(&self.title),
            link = quote(&self.link),
        )
    }
}

/// Starts rendering sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile: &ClientProfile) -> Result<Box<dyn BrowserSession>>;
}

/// One open rendering session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Resolve once the page has stopped loading resources.
    async fn wait_for_network_idle(&self) -> Result<()>;

    async fn has_element(&self, selector: &str) -> Result<bool>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
struct RawOffer {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

/// Browser-driven offer extractor.
pub struct OfferExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    profile: ClientProfile,
    url: String,
    origin: String,
    selectors: OfferSelectors,
    page_load_timeout: Duration,
    selector_timeout: Duration,
}

impl OfferExtractor {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        profile: ClientProfile,
        target: &TargetConfig,
    ) -> Result<Self> {
        Ok(Self {
            launcher,
            profile,
            url: target.url.clone(),
            origin: target.origin()?,
            selectors: OfferSelectors::from_config(target),
            page_load_timeout: Duration::from_secs(60),
            selector_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_timeouts(mut self, page_load: Duration, selector: Duration) -> Self {
        self.page_load_timeout = page_load;
        self.selector_timeout = selector;
        self
    }

    async fn extract(&self, session: &dyn BrowserSession) -> Result<Offer> {
        log::info!("Navigating to {}", self.url);
        let load = async {
            session.goto(&self.url).await?;
            session.wait_for_network_idle().await
        };
        tokio::time::timeout(self.page_load_timeout, load)
            .await
            .map_err(|_| AppError::ExtractionTimeout {
                stage: "page load",
                secs: self.page_load_timeout.as_secs(),
            })??;

        tokio::time::timeout(self.selector_timeout, self.wait_for_container(session))
            .await
            .map_err(|_| AppError::ExtractionTimeout {
                stage: "offer container",
                secs: self.selector_timeout.as_secs(),
            })??;

        let value = session
            .evaluate(&self.selectors.extraction_script())
            .await?;
        let raw: RawOffer = serde_json::from_value(value)?;
        let offer = Offer::from_raw(raw.title, raw.link).with_absolute_link(&self.origin);
        log::info!("Extracted offer: {:?}", offer);
        Ok(offer)
    }

    async fn wait_for_container(&self, session: &dyn BrowserSession) -> Result<()> {
        loop {
            if session.has_element(&self.selectors.container).await? {
                return Ok(());
            }
            tokio::time::sleep(CONTAINER_POLL).await;
        }
    }
}

#[async_trait]
impl OfferSource for OfferExtractor {
    async fn fetch_current_offer(&self) -> Result<Offer> {
        log::info!("Launching browser session...");
        let session = self.launcher.launch(&self.profile).await?;

        let result = self.extract(session.as_ref()).await;

        if let Err(e) = session.close().await {
            log::warn!("Failed to close browser session: {}", e);
        }
        result
    }
}

/// Plain HTTP offer extractor.
pub struct StaticOfferExtractor {
    client: Client,
    url: String,
    origin: String,
    selectors: OfferSelectors,
    timeout_secs: u64,
}

impl StaticOfferExtractor {
    pub fn new(client: Client, target: &TargetConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client,
            url: target.url.clone(),
            origin: target.origin()?,
            selectors: OfferSelectors::from_config(target),
            timeout_secs,
        })
    }

    pub fn from_config(target: &TargetConfig, browser: &BrowserConfig) -> Result<Self> {
        let client = create_page_client(browser)?;
        Self::new(client, target, browser.page_load_timeout_secs)
    }
}

#[async_trait]
impl OfferSource for StaticOfferExtractor {
    async fn fetch_current_offer(&self) -> Result<Offer> {
        log::info!("Fetching {}", self.url);
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::ExtractionTimeout {
                    stage: "page load",
                    secs: self.timeout_secs,
                }
            } else {
                AppError::Http(e)
            }
        })?;
        if !response.status().is_success() {
            return Err(api_error("Offer page", response).await);
        }
        let html = response.text().await?;

        let offer = parse_offer(&html, &self.selectors)?.with_absolute_link(&self.origin);
        log::info!("Extracted offer: {:?}", offer);
        Ok(offer)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the offer out of a page's HTML. A page without the container yields an empty offer.
pub fn parse_offer(html: &str, selectors: &OfferSelectors) -> Result<Offer> {
    let container_sel = parse_selector(&selectors.container)?;
    let title_sel = parse_selector(&selectors.title)?;
    let link_sel = parse_selector(&selectors.link)?;

    let document = Html::parse_document(html);
    let Some(container) = document.select(&container_sel).next() else {
        log::warn!("Offer container '{}' not found", selectors.container);
        return Ok(Offer::default());
    };

    let title = container.select(&title_sel).next().map(element_text);
    let link = container
        .select(&link_sel)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string);

    Ok(Offer::from_raw(title, link))
}
