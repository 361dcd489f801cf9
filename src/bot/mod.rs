//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Handles incoming text, contact, and location messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages
//!
//! Handlers are thin shims: they translate transport events into funnel
//! operations and funnel replies back into messages. Every handler catches
//! its own errors at the dispatch boundary so one user's failure never
//! terminates the process or touches another session.

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

use std::sync::Arc;

use teloxide::types::User;

use crate::audit::AuditLog;
use crate::catalog::OfferCatalog;
use crate::config::BotConfig;
use crate::funnel::Funnel;
use crate::registry::{ChatUser, ClientRegistry};
use crate::session::SessionStore;
use crate::store::SheetStore;

/// Everything the handlers share, assembled once in `main`.
pub struct App {
    pub config: BotConfig,
    pub store: Arc<dyn SheetStore>,
    pub catalog: Arc<OfferCatalog>,
    pub registry: Arc<ClientRegistry>,
    pub sessions: Arc<SessionStore>,
    pub audit: AuditLog,
    pub funnel: Funnel,
}

/// Project a Telegram user into the identity the core modules use.
pub fn chat_user(user: &User) -> ChatUser {
    ChatUser {
        id: user.id.0,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
    }
}
