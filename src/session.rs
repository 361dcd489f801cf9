//! Per-user conversation state
//!
//! Transient, process-lifetime sessions keyed by user id. A session is
//! created on first event from a user and mutated on every subsequent event;
//! it is never explicitly destroyed. After a restart it is rebuilt lazily
//! from the client registry (minus the page the user last looked at).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::catalog::Offer;

/// Where a user currently is in the funnel.
///
/// `AwaitingCode` captures the offer object at selection time; a concurrent
/// catalog reload never changes what an in-flight code check validates
/// against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    BrowsingCategories,
    BrowsingOfferPage {
        category: String,
        page: usize,
    },
    AwaitingCode {
        offer: Offer,
        /// Offer page to return to on success or cancel
        category: String,
        page: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: SessionState,
    /// Last rendered menu message, for in-place edits
    pub menu_message: Option<i32>,
}

/// Process-wide session table owned by the redemption state machine.
///
/// Single-event-at-a-time dispatch per user is not enforced here; two events
/// from the same user interleaving across an await can race on the store's
/// read-modify-write. Accepted gap, same as the registry's.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<u64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's session, created as `Idle` on first contact.
    pub fn get(&self, user_id: u64) -> Session {
        self.inner
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .clone()
    }

    pub fn set_state(&self, user_id: u64, state: SessionState) {
        self.inner.lock().unwrap().entry(user_id).or_default().state = state;
    }

    pub fn set_menu_message(&self, user_id: u64, message_id: Option<i32>) {
        self.inner
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .menu_message = message_id;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_on_first_contact() {
        let sessions = SessionStore::new();
        assert_eq!(sessions.len(), 0);

        let session = sessions.get(42);
        assert!(matches!(session.state, SessionState::Idle));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_state_survives_across_lookups() {
        let sessions = SessionStore::new();
        sessions.set_state(
            42,
            SessionState::BrowsingOfferPage {
                category: "cards".to_string(),
                page: 2,
            },
        );
        sessions.set_menu_message(42, Some(1001));

        let session = sessions.get(42);
        assert!(matches!(
            session.state,
            SessionState::BrowsingOfferPage { ref category, page: 2 } if category == "cards"
        ));
        assert_eq!(session.menu_message, Some(1001));
    }
}
