// src/clients/fcm.rs

//! Firebase Cloud Messaging HTTP v1 client.
//!
//! Authenticates with a service-account key: a signed RS256 assertion is
//! exchanged for an OAuth access token, which is cached until shortly before
//! it expires.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::PushConfig;
use crate::services::dispatcher::{BatchResponse, PushMessage, PushService, SendResponse};
use crate::utils::http::{api_error, create_api_client};

const SERVICE: &str = "FCM";
const SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

/// Fields of a Google service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> Result<Self> {
        let account: Self = serde_json::from_str(json)?;
        if account.project_id.trim().is_empty() || account.client_email.trim().is_empty() {
            return Err(AppError::config(
                "service account is missing project_id or client_email",
            ));
        }
        Ok(account)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Sign the token-exchange assertion.
    fn assertion(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a PushMessage,
}

#[derive(Deserialize)]
struct SendReply {
    name: String,
}

/// FCM client for one Firebase project.
pub struct FcmClient {
    http: Client,
    send_url: Url,
    account: ServiceAccount,
    token: Mutex<Option<AccessToken>>,
}

impl FcmClient {
    pub fn new(http: Client, api_base: &str, account: ServiceAccount) -> Result<Self> {
        let mut send_url = Url::parse(api_base)?;
        send_url
            .path_segments_mut()
            .map_err(|_| AppError::config("push.fcm_api_base cannot be a base URL"))?
            .pop_if_empty()
            .extend(["v1", "projects", account.project_id.as_str(), "messages:send"]);

        Ok(Self {
            http,
            send_url,
            account,
            token: Mutex::new(None),
        })
    }

    /// Build from the push settings; the key comes from `FIREBASE_CONFIG` or the key file.
    pub fn from_config(config: &PushConfig) -> Result<Self> {
        let account = match (&config.service_account_json, &config.service_account_path) {
            (Some(json), _) => ServiceAccount::from_json(json)?,
            (None, Some(path)) => ServiceAccount::from_file(path)?,
            (None, None) => {
                return Err(AppError::config(
                    "no FCM service account: set FIREBASE_CONFIG or push.service_account_path",
                ));
            }
        };
        log::debug!("Using service account {:?}", account);
        let http = create_api_client(config.timeout_secs)?;
        Self::new(http, &config.fcm_api_base, account)
    }

    pub fn project_id(&self) -> &str {
        &self.account.project_id
    }

    /// Cached access token, minting a new one when it is close to expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let assertion = self.account.assertion()?;
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error("OAuth", response).await);
        }

        let minted: TokenResponse = response.json().await?;
        log::debug!("Minted FCM access token valid for {}s", minted.expires_in);
        let token = AccessToken {
            value: minted.access_token,
            expires_at: Instant::now() + Duration::from_secs(minted.expires_in),
        };
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn authorize(&self) -> Result<String> {
        self.access_token()
            .await
            .map_err(|e| AppError::Push(format!("could not authorize with FCM: {e}")))
    }

    async fn send_one(&self, access_token: &str, message: &PushMessage) -> Delivery {
        let result = self
            .http
            .post(self.send_url.clone())
            .bearer_auth(access_token)
            .json(&SendRequest { message })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<SendReply>().await {
                    Ok(reply) => Delivery::Done(SendResponse::ok(reply.name)),
                    Err(e) => Delivery::Done(SendResponse::err(e.to_string())),
                }
            }
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                self.token.lock().await.take();
                let err = api_error(SERVICE, response).await;
                Delivery::Unauthorized(SendResponse::err(err.to_string()))
            }
            Ok(response) => Delivery::Done(SendResponse::err(
                api_error(SERVICE, response).await.to_string(),
            )),
            Err(e) => Delivery::Done(SendResponse::err(e.to_string())),
        }
    }
}

/// Outcome of one send; a rejected token is kept apart so the batch can re-authorize.
enum Delivery {
    Done(SendResponse),
    Unauthorized(SendResponse),
}

impl Delivery {
    fn into_response(self) -> SendResponse {
        match self {
            Self::Done(response) | Self::Unauthorized(response) => response,
        }
    }
}

#[async_trait]
impl PushService for FcmClient {
    /// Sends each message in order. A 401 triggers one fresh token per batch.
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<BatchResponse> {
        let mut access_token = self.authorize().await?;
        let mut reauthorized = false;

        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            let response = match self.send_one(&access_token, message).await {
                Delivery::Unauthorized(rejected) if !reauthorized => {
                    reauthorized = true;
                    log::warn!("FCM rejected the access token; minting a new one");
                    match self.authorize().await {
                        Ok(token) => {
                            access_token = token;
                            self.send_one(&access_token, message).await.into_response()
                        }
                        Err(e) => {
                            log::error!("{}", e);
                            rejected
                        }
                    }
                }
                delivery => delivery.into_response(),
            };
            responses.push(response);
        }
        Ok(BatchResponse { responses })
    }
}
