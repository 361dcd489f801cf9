//! # Bot Configuration Module
//!
//! Configuration structures for the funnel bot: environment-driven settings
//! for the chat transport, the spreadsheet backend and the retry policy
//! applied to remote store calls.

use std::collections::HashSet;
use std::env;

use anyhow::{Context, Result};

// Defaults for the spreadsheet layout
pub const DEFAULT_OFFERS_SHEET: &str = "Offers";
pub const DEFAULT_CLIENTS_SHEET: &str = "Clients";
pub const DEFAULT_EVENT_LOG_SHEET: &str = "EventLog";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_HEALTH_PORT: u16 = 10000;

/// Retry policy for remote store operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 500,   // 0.5 seconds
            max_retry_delay_ms: 5000,   // 5 seconds
            request_timeout_secs: 15,
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot API token
    pub bot_token: String,
    /// Spreadsheet identifier within the values API
    pub spreadsheet_id: String,
    /// OAuth bearer token for the spreadsheet API
    pub sheets_token: String,
    /// Base URL of the values API
    pub sheets_api_base: String,
    /// Sheet holding the offer catalog
    pub offers_sheet: String,
    /// Sheet holding client records
    pub clients_sheet: String,
    /// Append-only audit log sheet
    pub event_log_sheet: String,
    /// Offers shown per menu page
    pub page_size: usize,
    /// User ids allowed to run operator commands
    pub operator_ids: HashSet<u64>,
    /// Port for the liveness endpoint
    pub health_port: u16,
    /// Retry policy for store calls
    pub retry: RetryConfig,
}

impl BotConfig {
    /// Build the configuration from the process environment.
    ///
    /// `TELEGRAM_BOT_TOKEN`, `SPREADSHEET_ID` and `SHEETS_TOKEN` are required;
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let spreadsheet_id = env::var("SPREADSHEET_ID").context("SPREADSHEET_ID must be set")?;
        let sheets_token = env::var("SHEETS_TOKEN").context("SHEETS_TOKEN must be set")?;

        let operator_ids = env::var("OPERATOR_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| part.trim().parse::<u64>().ok())
            .collect();

        Ok(Self {
            bot_token,
            spreadsheet_id,
            sheets_token,
            sheets_api_base: env::var("SHEETS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API_BASE.to_string()),
            offers_sheet: env::var("OFFERS_SHEET")
                .unwrap_or_else(|_| DEFAULT_OFFERS_SHEET.to_string()),
            clients_sheet: env::var("CLIENTS_SHEET")
                .unwrap_or_else(|_| DEFAULT_CLIENTS_SHEET.to_string()),
            event_log_sheet: env::var("EVENT_LOG_SHEET")
                .unwrap_or_else(|_| DEFAULT_EVENT_LOG_SHEET.to_string()),
            page_size: env::var("PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),
            operator_ids,
            health_port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HEALTH_PORT),
            retry: RetryConfig::default(),
        })
    }

    pub fn is_operator(&self, user_id: u64) -> bool {
        self.operator_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_reasonable() {
        let retry = RetryConfig::default();
        assert!(retry.max_retries <= 10);
        assert!(retry.base_retry_delay_ms >= 100);
        assert!(retry.max_retry_delay_ms >= retry.base_retry_delay_ms);
        assert!(retry.request_timeout_secs > 0);
    }
}
