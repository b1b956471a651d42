//! Service layer for the offer watcher.
//!
//! This module contains the business logic for:
//! - Subscriber loading (`SubscriberRegistry`)
//! - Offer extraction (`OfferExtractor`, `StaticOfferExtractor`)
//! - Offer state persistence (`OfferStateStore`)
//! - Push fan-out (`NotificationDispatcher`)

pub mod dispatcher;
pub mod extractor;
pub mod registry;
pub mod state;

pub use dispatcher::{NotificationDispatcher, PushMessage, PushService};
pub use extractor::{
    BrowserLauncher, BrowserSession, ClientProfile, OfferExtractor, OfferSource,
    StaticOfferExtractor,
};
pub use registry::{LineFileSource, RecordSource, SubscriberRegistry};
pub use state::OfferStateStore;
