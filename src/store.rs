//! Tabular store adapter
//!
//! Thin async bridge around a remote spreadsheet API. Everything above this
//! module (catalog, registry, audit log) talks to the sheet through the
//! [`SheetStore`] trait, so tests and local development can run against the
//! in-memory backend instead of the network.
//!
//! Row and column indices are 1-based, matching the sheet UI and the remote
//! API's A1 notation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Typed errors for remote store operations
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Remote store unreachable or transport-level failure
    Network(String),
    /// Quota or rate limit exceeded
    Quota(String),
    /// Response body did not have the expected shape
    MalformedResponse(String),
    /// Operation exceeded the configured deadline
    Timeout(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Network(msg) => write!(f, "Network error: {msg}"),
            StoreError::Quota(msg) => write!(f, "Quota error: {msg}"),
            StoreError::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
            StoreError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

/// Abstract spreadsheet access used by the catalog, registry and audit log.
///
/// All operations are potentially high-latency remote calls and are always
/// fallible; callers log failures and keep the conversation loop alive.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Read a single row. Returns an empty vector for a row past the end.
    async fn read_row(&self, sheet: &str, row: usize) -> Result<Vec<String>, StoreError>;

    /// Read a single column top to bottom, header cell included.
    async fn read_column(&self, sheet: &str, col: usize) -> Result<Vec<String>, StoreError>;

    /// Read the whole table, header row first.
    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError>;

    /// Overwrite one row starting at column A.
    async fn write_range(&self, sheet: &str, row: usize, cells: &[String])
        -> Result<(), StoreError>;

    /// Append a row after the last non-empty row.
    async fn append_row(&self, sheet: &str, cells: &[String]) -> Result<(), StoreError>;
}

/// Convert a 1-based column number to its A1 letter form (1 -> A, 27 -> AA).
fn column_letter(mut col: usize) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Remote spreadsheet client over the values HTTP API.
///
/// Each call retries transient failures (network, timeout, quota) with
/// exponential backoff plus random jitter, bounded by [`RetryConfig`].
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl SheetsClient {
    pub fn new(
        base_url: impl Into<String>,
        spreadsheet_id: &str,
        token: impl Into<String>,
        retry: RetryConfig,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.request_timeout_secs))
            .build()
            .map_err(StoreError::from)?;
        Ok(Self {
            http,
            base_url: format!("{}/{}", base_url.into().trim_end_matches('/'), spreadsheet_id),
            token: token.into(),
            retry,
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .retry
            .base_retry_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.retry.max_retry_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=self.retry.base_retry_delay_ms / 2);
        Duration::from_millis(exp + jitter)
    }

    fn status_to_error(status: reqwest::StatusCode, body: String) -> StoreError {
        if status.as_u16() == 429 {
            StoreError::Quota(format!("rate limited: {body}"))
        } else {
            StoreError::Network(format!("HTTP {status}: {body}"))
        }
    }

    /// Run one request closure with the retry policy applied.
    async fn with_retry<F, Fut, T>(&self, op: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(StoreError::MalformedResponse(msg)) => {
                    // Not transient, retrying will not change the shape
                    return Err(StoreError::MalformedResponse(msg));
                }
                Err(err) if attempt < self.retry.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(op, attempt, error = %err, delay_ms = delay.as_millis() as u64, "Store call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_values(&self, range: &str, major_dimension: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let url = format!(
            "{}/values/{}?majorDimension={}",
            self.base_url, range, major_dimension
        );
        self.with_retry("get_values", || {
            let url = url.clone();
            async move {
                let response = self
                    .http
                    .get(&url)
                    .bearer_auth(&self.token)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::status_to_error(status, body));
                }
                let parsed: ValuesResponse = response
                    .json()
                    .await
                    .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
                Ok(parsed.values)
            }
        })
        .await
    }
}

#[async_trait]
impl SheetStore for SheetsClient {
    async fn read_row(&self, sheet: &str, row: usize) -> Result<Vec<String>, StoreError> {
        let range = format!("{sheet}!{row}:{row}");
        let mut values = self.get_values(&range, "ROWS").await?;
        let first = values.drain(..).next().unwrap_or_default();
        Ok(first)
    }

    async fn read_column(&self, sheet: &str, col: usize) -> Result<Vec<String>, StoreError> {
        let letter = column_letter(col);
        let range = format!("{sheet}!{letter}:{letter}");
        let mut values = self.get_values(&range, "COLUMNS").await?;
        let first = values.drain(..).next().unwrap_or_default();
        Ok(first)
    }

    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError> {
        self.get_values(sheet, "ROWS").await
    }

    async fn write_range(
        &self,
        sheet: &str,
        row: usize,
        cells: &[String],
    ) -> Result<(), StoreError> {
        let range = format!(
            "{sheet}!A{row}:{}{row}",
            column_letter(cells.len().max(1))
        );
        let url = format!(
            "{}/values/{}?valueInputOption=USER_ENTERED",
            self.base_url, range
        );
        let body = serde_json::json!({ "values": [cells] });
        self.with_retry("write_range", || {
            let url = url.clone();
            let body = body.clone();
            async move {
                let response = self
                    .http
                    .put(&url)
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(Self::status_to_error(status, text));
                }
                debug!(sheet, row, "Row range written");
                Ok(())
            }
        })
        .await
    }

    async fn append_row(&self, sheet: &str, cells: &[String]) -> Result<(), StoreError> {
        let url = format!(
            "{}/values/{}:append?valueInputOption=USER_ENTERED",
            self.base_url, sheet
        );
        let body = serde_json::json!({ "values": [cells] });
        self.with_retry("append_row", || {
            let url = url.clone();
            let body = body.clone();
            async move {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(Self::status_to_error(status, text));
                }
                debug!(sheet, "Row appended");
                Ok(())
            }
        })
        .await
    }
}

/// In-memory backend with the same contract as the remote client.
///
/// Used by the integration tests and handy for running the funnel locally
/// without credentials. Rows are ragged exactly like sheet responses.
#[derive(Default)]
pub struct MemorySheetStore {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a whole sheet, header row first.
    pub fn seed(&self, sheet: &str, rows: Vec<Vec<String>>) {
        self.sheets.lock().unwrap().insert(sheet.to_string(), rows);
    }

    /// Snapshot of a sheet's current rows, for assertions.
    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.sheets
            .lock()
            .unwrap()
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn read_row(&self, sheet: &str, row: usize) -> Result<Vec<String>, StoreError> {
        let sheets = self.sheets.lock().unwrap();
        Ok(sheets
            .get(sheet)
            .and_then(|rows| rows.get(row.saturating_sub(1)))
            .cloned()
            .unwrap_or_default())
    }

    async fn read_column(&self, sheet: &str, col: usize) -> Result<Vec<String>, StoreError> {
        let sheets = self.sheets.lock().unwrap();
        let rows = sheets.get(sheet).cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|r| r.get(col.saturating_sub(1)).cloned().unwrap_or_default())
            .collect())
    }

    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self.rows(sheet))
    }

    async fn write_range(
        &self,
        sheet: &str,
        row: usize,
        cells: &[String],
    ) -> Result<(), StoreError> {
        let mut sheets = self.sheets.lock().unwrap();
        let rows = sheets.entry(sheet.to_string()).or_default();
        while rows.len() < row {
            rows.push(Vec::new());
        }
        rows[row - 1] = cells.to_vec();
        Ok(())
    }

    async fn append_row(&self, sheet: &str, cells: &[String]) -> Result<(), StoreError> {
        let mut sheets = self.sheets.lock().unwrap();
        sheets
            .entry(sheet.to_string())
            .or_default()
            .push(cells.to_vec());
        Ok(())
    }
}
