// src/error.rs

//! Unified error handling for the offer watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for offerwatch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 payload could not be decoded
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Service-account assertion could not be signed
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Browser automation failed
    #[error("Browser error during {context}: {message}")]
    Browser { context: String, message: String },

    /// Page load or selector wait exceeded its deadline
    #[error("Extraction timed out during {stage} after {secs}s")]
    ExtractionTimeout { stage: &'static str, secs: u64 },

    /// A remote API answered with a non-success status
    #[error("{service} API error {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Guarded write rejected because the stored version moved on
    #[error("Write conflict on {0}")]
    Conflict(String),

    /// Push delivery failed for a whole request
    #[error("Push error: {0}")]
    Push(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a browser automation error with context.
    pub fn browser(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Browser {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an API error for a remote service.
    pub fn api(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            message: message.into(),
        }
    }

    /// Whether this error is a timeout raised by the extractor.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ExtractionTimeout { .. })
    }
}
