//! Redemption state machine
//!
//! The core of the funnel: owns the per-user sessions and drives every
//! transition between menu browsing and code entry. Transport-free; each
//! operation returns a [`FunnelReply`] the bot layer turns into messages and
//! keyboards. Store failures degrade (logged, conversation continues), they
//! never crash an event handler.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, warn};

use crate::audit::AuditLog;
use crate::catalog::{Offer, OfferCatalog};
use crate::menu::{render_categories, render_offer_page, MenuPage};
use crate::registry::{ChatUser, ClientRegistry};
use crate::session::{SessionState, SessionStore};

// Audit event kinds
pub const EVENT_START: &str = "START";
pub const EVENT_PHONE: &str = "PHONE";
pub const EVENT_LOCATION: &str = "LOCATION";
pub const EVENT_CATEGORY: &str = "BTN";
pub const EVENT_OFFER: &str = "OFFER";
pub const EVENT_CODE_FAIL: &str = "CODE_FAIL";
pub const EVENT_REDEEM: &str = "REDEEM";
pub const EVENT_PING: &str = "PING";

/// What the transport should show the user after an event.
#[derive(Debug, Clone)]
pub enum FunnelReply {
    /// Show the category list
    Categories(MenuPage),
    /// Show one page of a category's offers
    OfferPage(MenuPage),
    /// Ask for (or re-ask after a mismatch) an offer's secret code
    CodePrompt { offer_name: String, retry: bool },
    /// Offer already redeemed; notice only, nothing changed
    AlreadyTaken,
    /// Selected id is gone from the catalog; benign notice
    OfferMissing,
    /// Code accepted; reveal the link
    Redeemed {
        offer_name: String,
        link: String,
        /// The redemption is user-visible-successful even when persistence
        /// failed; the failure is logged for manual reconciliation.
        persist_failed: bool,
    },
    /// Code entry abandoned; back on the offer page
    Cancelled(MenuPage),
    /// Event does not apply to the current state
    Ignored,
}

/// Case- and whitespace-insensitive code comparison.
pub fn codes_match(input: &str, stored: &str) -> bool {
    normalize_code(input) == normalize_code(stored) && !normalize_code(stored).is_empty()
}

fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Words that abandon code entry.
pub fn is_cancel_word(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "cancel" | "stop" | "back")
}

pub struct Funnel {
    catalog: Arc<OfferCatalog>,
    registry: Arc<ClientRegistry>,
    sessions: Arc<SessionStore>,
    audit: AuditLog,
    page_size: usize,
}

impl Funnel {
    pub fn new(
        catalog: Arc<OfferCatalog>,
        registry: Arc<ClientRegistry>,
        sessions: Arc<SessionStore>,
        audit: AuditLog,
        page_size: usize,
    ) -> Self {
        Self {
            catalog,
            registry,
            sessions,
            audit,
            page_size,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Registration complete: move to the category list.
    pub fn open_categories(&self, user: &ChatUser) -> FunnelReply {
        self.sessions
            .set_state(user.id, SessionState::BrowsingCategories);
        FunnelReply::Categories(render_categories(self.catalog.snapshot().categories()))
    }

    /// Category picked from the menu; show its first page.
    pub async fn select_category(&self, user: &ChatUser, category: &str) -> FunnelReply {
        self.audit.record(user, EVENT_CATEGORY, category);
        self.show_offer_page(user, category, 1).await
    }

    /// Page forward or back within the active category.
    pub async fn turn_page(&self, user: &ChatUser, forward: bool) -> FunnelReply {
        let session = self.sessions.get(user.id);
        let SessionState::BrowsingOfferPage { category, page } = session.state else {
            return FunnelReply::Ignored;
        };
        let target = if forward { page + 1 } else { page.saturating_sub(1).max(1) };
        self.show_offer_page(user, &category, target).await
    }

    /// Back control from an offer page.
    pub fn back_to_categories(&self, user: &ChatUser) -> FunnelReply {
        self.open_categories(user)
    }

    /// Offer tapped on a page.
    ///
    /// An already-taken offer (double tap, or a page rendered before the
    /// redemption landed) is rejected without touching the session. A missing
    /// id after a reload is a benign "offer not found".
    pub async fn select_offer(&self, user: &ChatUser, offer_id: &str) -> FunnelReply {
        let taken = self.taken_or_empty(user.id).await;
        if taken.contains(offer_id) {
            return FunnelReply::AlreadyTaken;
        }

        let snapshot = self.catalog.snapshot();
        let Some(offer) = snapshot.by_id(offer_id) else {
            warn!(user_id = user.id, offer_id, "Selected offer missing from catalog");
            return FunnelReply::OfferMissing;
        };

        // Return position for cancel/success
        let (category, page) = match self.sessions.get(user.id).state {
            SessionState::BrowsingOfferPage { category, page } => (category, page),
            _ => (offer.category.clone(), 1),
        };

        self.audit.record(user, EVENT_OFFER, offer_id);
        self.sessions.set_state(
            user.id,
            SessionState::AwaitingCode {
                offer: offer.clone(),
                category,
                page,
            },
        );

        FunnelReply::CodePrompt {
            offer_name: offer.name.clone(),
            retry: false,
        }
    }

    /// Free text while a code is pending.
    ///
    /// Validates against the offer captured at selection time, so a catalog
    /// reload mid-entry changes nothing. Returns `Ignored` when the user is
    /// not awaiting a code.
    pub async fn submit_code(&self, user: &ChatUser, text: &str) -> FunnelReply {
        let session = self.sessions.get(user.id);
        let SessionState::AwaitingCode { offer, category, page } = session.state else {
            return FunnelReply::Ignored;
        };

        if is_cancel_word(text) {
            return self.abandon_code(user, &category, page).await;
        }

        if !codes_match(text, &offer.code) {
            self.audit.record(user, EVENT_CODE_FAIL, &offer.id);
            return FunnelReply::CodePrompt {
                offer_name: offer.name.clone(),
                retry: true,
            };
        }

        // Link is revealed even if persistence fails; the gap is logged for
        // manual reconciliation rather than shown to the user.
        let persist_failed = match self.registry.mark_offer_taken(user, &offer.id).await {
            Ok(()) => false,
            Err(e) => {
                error!(
                    user_id = user.id,
                    offer_id = %offer.id,
                    error = %e,
                    "Redemption persisted nowhere, needs manual reconciliation"
                );
                true
            }
        };

        self.audit.record(user, EVENT_REDEEM, &offer.id);
        self.sessions
            .set_state(user.id, SessionState::BrowsingOfferPage { category, page });

        FunnelReply::Redeemed {
            offer_name: offer.name.clone(),
            link: offer.link.clone(),
            persist_failed,
        }
    }

    /// Cancel control tapped while a code is pending.
    pub async fn cancel_code(&self, user: &ChatUser) -> FunnelReply {
        let session = self.sessions.get(user.id);
        let SessionState::AwaitingCode { category, page, .. } = session.state else {
            return FunnelReply::Ignored;
        };
        self.abandon_code(user, &category, page).await
    }

    /// Re-render the offer page the user was last on.
    pub async fn refresh_offer_page(&self, user: &ChatUser) -> FunnelReply {
        let session = self.sessions.get(user.id);
        let SessionState::BrowsingOfferPage { category, page } = session.state else {
            return FunnelReply::Ignored;
        };
        self.show_offer_page(user, &category, page).await
    }

    async fn abandon_code(&self, user: &ChatUser, category: &str, page: usize) -> FunnelReply {
        let reply = self.show_offer_page(user, category, page).await;
        match reply {
            FunnelReply::OfferPage(menu) => FunnelReply::Cancelled(menu),
            other => other,
        }
    }

    /// Render one page of a category with the user's taken offers filtered
    /// out, and move the session onto that page (clamped).
    async fn show_offer_page(&self, user: &ChatUser, category: &str, page: usize) -> FunnelReply {
        let taken = self.taken_or_empty(user.id).await;
        let snapshot = self.catalog.snapshot();
        let available: Vec<Offer> = snapshot
            .offers_in(category)
            .iter()
            .filter(|offer| !taken.contains(&offer.id))
            .cloned()
            .collect();

        let menu = render_offer_page(&available, category, page, self.page_size);
        self.sessions.set_state(
            user.id,
            SessionState::BrowsingOfferPage {
                category: category.to_string(),
                page: menu.page,
            },
        );
        FunnelReply::OfferPage(menu)
    }

    /// Taken-offer lookup that degrades to an empty set on store failure.
    async fn taken_or_empty(&self, user_id: u64) -> HashSet<String> {
        match self.registry.taken_offers(user_id).await {
            Ok(taken) => taken,
            Err(e) => {
                error!(user_id, error = %e, "Taken-offers lookup failed, rendering unfiltered");
                HashSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_match_is_case_and_whitespace_insensitive() {
        assert!(codes_match(" abc123 ", "ABC123"));
        assert!(codes_match("a b c 1 2 3", "ABC123"));
        assert!(!codes_match("abc124", "ABC123"));
    }

    #[test]
    fn test_empty_stored_code_never_matches() {
        assert!(!codes_match("", ""));
        assert!(!codes_match("   ", ""));
    }

    #[test]
    fn test_cancel_words() {
        assert!(is_cancel_word("  Cancel "));
        assert!(is_cancel_word("STOP"));
        assert!(is_cancel_word("back"));
        assert!(!is_cancel_word("xk9"));
    }
}
