//! Offer data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::resolve;

/// The promotional offer currently published on the tracked page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    /// Offer headline
    #[serde(default)]
    pub title: Option<String>,

    /// Click-through URL
    #[serde(default)]
    pub link: Option<String>,
}

impl Offer {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            link: Some(link.into()),
        }
    }

    /// Build an offer from raw extracted values, treating blank strings as absent.
    ///
    /// Runs of whitespace inside the title collapse to one space, so rendered
    /// and static pages yield the same title.
    pub fn from_raw(title: Option<String>, link: Option<String>) -> Self {
        let title = title
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty());
        let link = link
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self { title, link }
    }

    /// Both fields present and non-empty.
    pub fn is_valid(&self) -> bool {
        let present = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.title) && present(&self.link)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn link(&self) -> &str {
        self.link.as_deref().unwrap_or("")
    }

    /// Resolve a relative link against the site origin.
    pub fn with_absolute_link(mut self, origin: &str) -> Self {
        if let Some(link) = self.link.take() {
            let absolute = if link.starts_with('/') {
                resolve(origin, &link).unwrap_or(link)
            } else {
                link
            };
            self.link = Some(absolute);
        }
        self
    }
}

/// The last offer notifications were dispatched for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfferState {
    #[serde(flatten)]
    pub offer: Offer,

    /// When the dispatch for this offer happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,
}

impl OfferState {
    pub fn new(offer: Offer) -> Self {
        Self {
            offer,
            notified_at: Some(Utc::now()),
        }
    }

    /// Title equality is the only change signal.
    pub fn same_title(&self, offer: &Offer) -> bool {
        self.offer.title == offer.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(Offer::new("Crete 5 nights", "https://example.com/x").is_valid());
        assert!(!Offer::default().is_valid());
        assert!(!Offer::from_raw(Some("Crete".into()), None).is_valid());
        assert!(!Offer::from_raw(Some("  ".into()), Some("/x".into())).is_valid());
    }

    #[test]
    fn test_title_whitespace_collapsed() {
        let offer = Offer::from_raw(
            Some("\n  Crete\n\t5   nights ".into()),
            Some(" /x ".into()),
        );
        assert_eq!(offer.title(), "Crete 5 nights");
        assert_eq!(offer.link(), "/x");
    }

    #[test]
    fn test_relative_link_made_absolute() {
        let offer = Offer::new("Crete", "/x").with_absolute_link("https://www.lagonika.gr/");
        assert_eq!(offer.link(), "https://www.lagonika.gr/x");

        let offer = Offer::new("Crete", "https://other.example/y")
            .with_absolute_link("https://www.lagonika.gr/");
        assert_eq!(offer.link(), "https://other.example/y");
    }

    #[test]
    fn test_state_reads_legacy_record() {
        let json = r#"{ "title": "Old", "link": "https://example.com/old" }"#;
        let state: OfferState = serde_json::from_str(json).unwrap();
        assert_eq!(state.offer.title(), "Old");
        assert!(state.notified_at.is_none());
    }

    #[test]
    fn test_state_serializes_flat() {
        let state = OfferState::new(Offer::new("New", "https://example.com/new"));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["title"], "New");
        assert_eq!(value["link"], "https://example.com/new");
        assert!(value.get("notified_at").is_some());
    }
}
