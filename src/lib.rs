//! # Offerbot
//!
//! A chat-driven promotional funnel: walks a Telegram user through
//! registration (phone, location), presents a catalog of categorized offers,
//! gates each offer behind a secret code, and records every step in a
//! spreadsheet store that doubles as the system of record and audit log.

pub mod audit;
pub mod bot;
pub mod catalog;
pub mod config;
pub mod funnel;
pub mod health;
pub mod menu;
pub mod registry;
pub mod session;
pub mod store;
pub mod timefmt;
