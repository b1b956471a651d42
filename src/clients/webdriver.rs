// src/clients/webdriver.rs

//! Chromium sessions over a WebDriver server (chromedriver).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::{
    By, DesiredCapabilities, WebDriver, common::capabilities::chromium::ChromiumLikeCapabilities,
};

use crate::error::{AppError, Result};
use crate::services::extractor::{BrowserLauncher, BrowserSession, ClientProfile};

const IDLE_POLL: Duration = Duration::from_millis(100);
const IDLE_WINDOW: Duration = Duration::from_millis(500);

const NETWORK_STATE_SCRIPT: &str = r#"
    return {
        ready: document.readyState,
        resources: performance.getEntriesByType('resource').length
    };
"#;

/// Opens sessions against a WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    server_url: String,
}

impl WebDriverLauncher {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, profile: &ClientProfile) -> Result<Box<dyn BrowserSession>> {
        let mut caps = DesiredCapabilities::chrome();
        if profile.headless {
            caps.set_headless()
                .map_err(|e| AppError::browser("capabilities", e))?;
        }
        for arg in &profile.args {
            caps.add_arg(arg)
                .map_err(|e| AppError::browser("capabilities", e))?;
        }
        if !profile.user_agent.is_empty() {
            caps.add_arg(&format!("--user-agent={}", profile.user_agent))
                .map_err(|e| AppError::browser("capabilities", e))?;
        }
        if let Some(lang) = primary_language(&profile.accept_language) {
            caps.add_arg(&format!("--lang={lang}"))
                .map_err(|e| AppError::browser("capabilities", e))?;
        }

        let driver = WebDriver::new(&self.server_url, caps).await.map_err(|e| {
            AppError::browser(format!("connecting to WebDriver at {}", self.server_url), e)
        })?;

        let session = WebDriverSession { driver };
        session.apply_headers(profile).await;
        Ok(Box::new(session))
    }
}

/// First tag of an `Accept-Language` value, without its quality.
fn primary_language(accept_language: &str) -> Option<&str> {
    accept_language
        .split(',')
        .next()
        .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
        .filter(|tag| !tag.is_empty())
}

/// A live WebDriver session.
pub struct WebDriverSession {
    driver: WebDriver,
}

impl WebDriverSession {
    /// Send the profile's request headers through the DevTools bridge.
    async fn apply_headers(&self, profile: &ClientProfile) {
        let dev_tools = ChromeDevTools::new(self.driver.handle.clone());
        let headers = json!({
            "headers": {
                "Accept-Language": profile.accept_language,
                "Accept": profile.accept,
            }
        });

        let applied = async {
            dev_tools.execute_cdp("Network.enable").await?;
            dev_tools
                .execute_cdp_with_params("Network.setExtraHTTPHeaders", headers)
                .await
        }
        .await;

        if let Err(e) = applied {
            log::warn!("Could not set extra HTTP headers: {}", e);
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| AppError::browser(format!("navigating to {url}"), e))
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut last_count = -1i64;
        let mut idle_since: Option<Instant> = None;

        loop {
            let state = self.evaluate(NETWORK_STATE_SCRIPT).await?;
            let complete = state.get("ready").and_then(|v| v.as_str()) == Some("complete");
            let count = state
                .get("resources")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);

            if complete && count == last_count {
                match idle_since {
                    Some(since) if since.elapsed() >= IDLE_WINDOW => return Ok(()),
                    Some(_) => {}
                    None => idle_since = Some(Instant::now()),
                }
            } else {
                idle_since = None;
                last_count = count;
            }

            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn has_element(&self, selector: &str) -> Result<bool> {
        let elements = self
            .driver
            .find_all(By::Css(selector))
            .await
            .map_err(|e| AppError::browser(format!("locating '{selector}'"), e))?;
        Ok(!elements.is_empty())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .driver
            .execute(script, Vec::new())
            .await
            .map_err(|e| AppError::browser("evaluating script", e))?;
        Ok(result.json().clone())
    }

    async fn close(&self) -> Result<()> {
        self.driver
            .clone()
            .quit()
            .await
            .map_err(|e| AppError::browser("closing session", e))
    }
}
