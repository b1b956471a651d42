//! Change detection between the persisted and the current offer.
//!
//! The title is the only signal: a link-only change is not a new offer.

use crate::models::{Offer, OfferState};

/// What the comparison concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// The current offer is missing its title or link
    Invalid,
    /// Nothing has been persisted yet
    FirstOffer,
    /// The title differs from the persisted one
    TitleChanged { previous: String },
    /// Same title as the persisted offer
    Unchanged,
}

/// Compare `current` against the last notified offer.
pub fn detect_change(current: &Offer, previous: Option<&OfferState>) -> ChangeDecision {
    if !current.is_valid() {
        return ChangeDecision::Invalid;
    }
    match previous {
        None => ChangeDecision::FirstOffer,
        Some(state) if state.same_title(current) => ChangeDecision::Unchanged,
        Some(state) => ChangeDecision::TitleChanged {
            previous: state.offer.title().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(title: &str, link: &str) -> OfferState {
        OfferState::new(Offer::new(title, link))
    }

    #[test]
    fn test_first_offer() {
        let decision = detect_change(&Offer::new("A", "https://x/a"), None);
        assert_eq!(decision, ChangeDecision::FirstOffer);
    }

    #[test]
    fn test_title_change() {
        let previous = state("A", "https://x/a");
        let decision = detect_change(&Offer::new("B", "https://x/a"), Some(&previous));
        assert_eq!(
            decision,
            ChangeDecision::TitleChanged {
                previous: "A".into()
            }
        );
    }

    #[test]
    fn test_link_only_change_is_unchanged() {
        let previous = state("A", "https://x/a");
        let decision = detect_change(&Offer::new("A", "https://x/other"), Some(&previous));
        assert_eq!(decision, ChangeDecision::Unchanged);
    }

    #[test]
    fn test_invalid_offer_wins_over_state() {
        let missing_link = Offer::from_raw(Some("A".into()), None);
        assert_eq!(detect_change(&missing_link, None), ChangeDecision::Invalid);

        let previous = state("A", "https://x/a");
        assert_eq!(
            detect_change(&Offer::default(), Some(&previous)),
            ChangeDecision::Invalid
        );
    }
}
