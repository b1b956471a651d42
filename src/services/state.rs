// src/services/state.rs

//! Persistence of the last notified offer.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{Offer, OfferState};
use crate::storage::ContentStore;

/// Reads and writes the single offer state record.
pub struct OfferStateStore {
    store: Arc<dyn ContentStore>,
    path: String,
}

impl OfferStateStore {
    pub fn new(store: Arc<dyn ContentStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Where the record lives, for logs.
    pub fn location(&self) -> String {
        self.store.location(&self.path)
    }

    /// The persisted offer, or `None` when there is none or it cannot be read.
    pub async fn read_last_offer(&self) -> Option<OfferState> {
        let stored = match self.store.get(&self.path).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                log::info!("No previous offer found at {}", self.location());
                return None;
            }
            Err(e) => {
                log::warn!("Could not read previous offer: {}", e);
                return None;
            }
        };

        match serde_json::from_slice::<OfferState>(&stored.body) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Previous offer at {} is not valid JSON: {}", self.location(), e);
                None
            }
        }
    }

    /// Persist `offer` as the last notified one.
    ///
    /// The current version is fetched right before writing so the write only
    /// replaces the revision it was based on.
    pub async fn write_offer(&self, offer: &Offer) -> Result<()> {
        let current = self.store.get(&self.path).await?;
        let version = current.as_ref().map(|c| c.version.as_str());

        let state = OfferState::new(offer.clone());
        let body = serde_json::to_vec_pretty(&state)?;
        let message = format!("Update last offer: {}", offer.title());

        self.store.put(&self.path, &body, &message, version).await?;
        log::info!("Saved offer to {}", self.location());
        Ok(())
    }
}
