// src/models/mod.rs

//! Domain models for the offer watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod delivery;
mod offer;

// Re-export all public types
pub use config::{
    BrowserConfig, Config, ExtractorMode, GitHubConfig, LoggingConfig, PushConfig,
    RegistryBackend, RegistryConfig, StoreBackend, StoreConfig, TargetConfig,
};
pub use delivery::{DeliveryResult, DispatchReport, Target};
pub use offer::{Offer, OfferState};
