//! Client registry
//!
//! Maps a chat user identity to a persisted row in the clients sheet holding
//! profile fields, contact info, referral mark and per-offer redemption
//! status. Records are created lazily on first contact and never deleted;
//! offer history and per-offer status only ever grow.
//!
//! The sheet is scanned linearly by user id (no secondary index); acceptable
//! at the expected registrant volume.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::store::{SheetStore, StoreError};
use crate::timefmt::now_stamp;

// Clients sheet base layout (0-based):
// [client_no, user_id, username, first_name, phone, location, referral,
//  offer_history, <one column per numeric offer id>, status, updated_at]
pub const CLIENT_NO_COL: usize = 0;
pub const CLIENT_USER_ID_COL: usize = 1;
pub const CLIENT_USERNAME_COL: usize = 2;
pub const CLIENT_FIRST_NAME_COL: usize = 3;
pub const CLIENT_PHONE_COL: usize = 4;
pub const CLIENT_LOCATION_COL: usize = 5;
pub const CLIENT_REFERRAL_COL: usize = 6;
pub const CLIENT_HISTORY_COL: usize = 7;

pub const HISTORY_DELIMITER: char = ';';

/// Status token written to an offer's dedicated column on redemption.
pub const OFFER_STATUS_SELECTED: &str = "SELECTED";
/// Lifecycle label for a freshly created record.
pub const STATUS_NEW: &str = "new";

/// Stable chat-platform identity of a user, as the registry needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl ChatUser {
    pub fn new(id: u64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            username: None,
            first_name: first_name.into(),
            last_name: None,
        }
    }
}

/// Partial update for a client row.
///
/// `None` means "field not supplied" and never clobbers an existing value;
/// `Some` overwrites. `offer` appends to the delimited history instead of
/// replacing it.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub phone: Option<String>,
    pub location: Option<String>,
    pub referral: Option<String>,
    pub offer: Option<String>,
    pub status: Option<String>,
}

impl ClientUpdate {
    pub fn status(value: impl Into<String>) -> Self {
        Self {
            status: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn phone(value: impl Into<String>) -> Self {
        Self {
            phone: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn location(value: impl Into<String>) -> Self {
        Self {
            location: Some(value.into()),
            ..Default::default()
        }
    }
}

/// Typed column mapping resolved once from the clients sheet header.
///
/// Offer columns are discovered dynamically: any header cell whose text is
/// purely numeric names the offer id whose status lives in that column.
#[derive(Debug, Clone)]
pub struct ClientSchema {
    /// Offer id -> 0-based column index
    pub offer_columns: HashMap<String, usize>,
    pub status_col: usize,
    pub updated_col: usize,
    /// Full row width implied by the header
    pub width: usize,
}

impl ClientSchema {
    pub fn resolve(header: &[String]) -> Self {
        let mut offer_columns = HashMap::new();
        let mut status_col = None;
        let mut updated_col = None;

        for (i, cell) in header.iter().enumerate().skip(CLIENT_HISTORY_COL + 1) {
            let text = cell.trim();
            if !text.is_empty() && text.parse::<u64>().is_ok() {
                offer_columns.insert(text.to_string(), i);
            } else {
                match text.to_ascii_lowercase().as_str() {
                    "status" => status_col = Some(i),
                    "updated_at" | "last_updated" | "updated" => updated_col = Some(i),
                    _ => {}
                }
            }
        }

        // Positional fallback: status and updated_at are the last two columns.
        let width = header.len().max(CLIENT_HISTORY_COL + 3);
        let status_col = status_col.unwrap_or(width - 2);
        let updated_col = updated_col.unwrap_or(width - 1);
        let width = width.max(status_col + 1).max(updated_col + 1);

        Self {
            offer_columns,
            status_col,
            updated_col,
            width,
        }
    }
}

fn parse_history(field: &str) -> impl Iterator<Item = &str> {
    field
        .split(HISTORY_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn cell_truthy(cell: &str) -> bool {
    !cell.trim().is_empty()
}

/// Persisted, append-only-history record store for funnel clients.
pub struct ClientRegistry {
    store: Arc<dyn SheetStore>,
    sheet: String,
    schema: RwLock<Option<ClientSchema>>,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn SheetStore>, sheet: impl Into<String>) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            schema: RwLock::new(None),
        }
    }

    /// Resolved header schema, cached after the first successful load.
    pub async fn schema(&self) -> Result<ClientSchema, StoreError> {
        if let Some(schema) = self.schema.read().unwrap().clone() {
            return Ok(schema);
        }
        self.refresh_schema().await
    }

    /// Re-derive the schema from the current header row.
    pub async fn refresh_schema(&self) -> Result<ClientSchema, StoreError> {
        let header = self.store.read_row(&self.sheet, 1).await?;
        let schema = ClientSchema::resolve(&header);
        debug!(
            offer_columns = schema.offer_columns.len(),
            width = schema.width,
            "Client schema resolved"
        );
        *self.schema.write().unwrap() = Some(schema.clone());
        Ok(schema)
    }

    /// Offer id -> column index mapping from the current schema.
    pub async fn column_map_for_offers(&self) -> Result<HashMap<String, usize>, StoreError> {
        Ok(self.schema().await?.offer_columns)
    }

    /// 1-based sheet row for a user, if a record exists. Linear scan.
    pub async fn find_row(&self, user_id: u64) -> Result<Option<usize>, StoreError> {
        let column = self
            .store
            .read_column(&self.sheet, CLIENT_USER_ID_COL + 1)
            .await?;
        let needle = user_id.to_string();
        Ok(column
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, cell)| cell.trim() == needle)
            .map(|(i, _)| i + 1))
    }

    /// Create or partially update a client row.
    ///
    /// Existing rows are read in full, patched with the supplied fields only,
    /// given a fresh `updated_at`, and written back as one full-row range
    /// write. A miss synthesizes a new row with the next sequential client
    /// number. Two upserts for the same user racing between the read and the
    /// write can lose the slower one's untouched fields (last write wins);
    /// known gap, accepted at this volume.
    pub async fn upsert(&self, user: &ChatUser, update: ClientUpdate) -> Result<(), StoreError> {
        let rows = self.store.read_all(&self.sheet).await?;
        let schema = self.resolve_and_cache(&rows);

        let needle = user.id.to_string();
        let hit = rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| {
                row.get(CLIENT_USER_ID_COL).map(String::as_str).unwrap_or("") == needle
            })
            .map(|(i, row)| (i + 1, row.clone()));

        match hit {
            Some((row_index, mut row)) => {
                row.resize(schema.width.max(row.len()), String::new());

                // Identity fields follow the platform's current values
                row[CLIENT_USERNAME_COL] = user.username.clone().unwrap_or_default();
                row[CLIENT_FIRST_NAME_COL] = user.first_name.clone();

                if let Some(phone) = update.phone {
                    row[CLIENT_PHONE_COL] = phone;
                }
                if let Some(location) = update.location {
                    row[CLIENT_LOCATION_COL] = location;
                }
                if let Some(referral) = update.referral {
                    row[CLIENT_REFERRAL_COL] = referral;
                }
                if let Some(offer) = update.offer {
                    append_history(&mut row[CLIENT_HISTORY_COL], &offer);
                }
                if let Some(status) = update.status {
                    row[schema.status_col] = status;
                }
                row[schema.updated_col] = now_stamp();

                self.store.write_range(&self.sheet, row_index, &row).await
            }
            None => {
                let client_no = rows.len(); // header is row 1, numbering starts at 1
                let row = synthesize_row(&schema, client_no, user, update);
                info!(user_id = user.id, client_no, "Registering new client");
                self.store.append_row(&self.sheet, &row).await
            }
        }
    }

    /// Every offer id this user has ever taken.
    ///
    /// Union of the delimited history field and any truthy per-offer status
    /// cell. Grows monotonically; ids referencing offers removed by a later
    /// catalog reload are tolerated leftovers.
    pub async fn taken_offers(&self, user_id: u64) -> Result<HashSet<String>, StoreError> {
        let rows = self.store.read_all(&self.sheet).await?;
        let schema = self.resolve_and_cache(&rows);

        let needle = user_id.to_string();
        let Some(row) = rows.iter().skip(1).find(|row| {
            row.get(CLIENT_USER_ID_COL).map(String::as_str).unwrap_or("") == needle
        }) else {
            return Ok(HashSet::new());
        };

        let mut taken: HashSet<String> = row
            .get(CLIENT_HISTORY_COL)
            .map(|field| parse_history(field).map(str::to_string).collect())
            .unwrap_or_default();

        for (offer_id, &col) in &schema.offer_columns {
            if row.get(col).map(String::as_str).is_some_and(cell_truthy) {
                taken.insert(offer_id.clone());
            }
        }

        Ok(taken)
    }

    /// Persist a redemption: append the offer to the history if absent and
    /// set its dedicated status column (when the sheet defines one) to
    /// `SELECTED`. Idempotent; a second call leaves the row unchanged apart
    /// from `updated_at`.
    pub async fn mark_offer_taken(
        &self,
        user: &ChatUser,
        offer_id: &str,
    ) -> Result<(), StoreError> {
        let rows = self.store.read_all(&self.sheet).await?;
        let schema = self.resolve_and_cache(&rows);

        let needle = user.id.to_string();
        let hit = rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| {
                row.get(CLIENT_USER_ID_COL).map(String::as_str).unwrap_or("") == needle
            })
            .map(|(i, row)| (i + 1, row.clone()));

        match hit {
            Some((row_index, mut row)) => {
                row.resize(schema.width.max(row.len()), String::new());
                append_history(&mut row[CLIENT_HISTORY_COL], offer_id);
                if let Some(&col) = schema.offer_columns.get(offer_id) {
                    if col >= row.len() {
                        row.resize(col + 1, String::new());
                    }
                    row[col] = OFFER_STATUS_SELECTED.to_string();
                }
                row[schema.updated_col] = now_stamp();
                info!(user_id = user.id, offer_id, "Offer marked taken");
                self.store.write_range(&self.sheet, row_index, &row).await
            }
            None => {
                // First contact happening straight at redemption; create the
                // record with the offer already marked.
                let client_no = rows.len();
                let update = ClientUpdate {
                    offer: Some(offer_id.to_string()),
                    status: Some(STATUS_NEW.to_string()),
                    ..Default::default()
                };
                let mut row = synthesize_row(&schema, client_no, user, update);
                if let Some(&col) = schema.offer_columns.get(offer_id) {
                    if col >= row.len() {
                        row.resize(col + 1, String::new());
                    }
                    row[col] = OFFER_STATUS_SELECTED.to_string();
                }
                info!(user_id = user.id, offer_id, "Offer marked taken for new client");
                self.store.append_row(&self.sheet, &row).await
            }
        }
    }

    fn resolve_and_cache(&self, rows: &[Vec<String>]) -> ClientSchema {
        let header = rows.first().cloned().unwrap_or_default();
        let schema = ClientSchema::resolve(&header);
        *self.schema.write().unwrap() = Some(schema.clone());
        schema
    }
}

fn append_history(field: &mut String, offer_id: &str) {
    if parse_history(field).any(|id| id == offer_id) {
        return;
    }
    if field.is_empty() {
        field.push_str(offer_id);
    } else {
        field.push(HISTORY_DELIMITER);
        field.push_str(offer_id);
    }
}

fn synthesize_row(
    schema: &ClientSchema,
    client_no: usize,
    user: &ChatUser,
    update: ClientUpdate,
) -> Vec<String> {
    let mut row = vec![String::new(); schema.width];
    row[CLIENT_NO_COL] = client_no.to_string();
    row[CLIENT_USER_ID_COL] = user.id.to_string();
    row[CLIENT_USERNAME_COL] = user.username.clone().unwrap_or_default();
    row[CLIENT_FIRST_NAME_COL] = user.first_name.clone();
    row[CLIENT_PHONE_COL] = update.phone.unwrap_or_default();
    row[CLIENT_LOCATION_COL] = update.location.unwrap_or_default();
    row[CLIENT_REFERRAL_COL] = update.referral.unwrap_or_default();
    row[CLIENT_HISTORY_COL] = update.offer.unwrap_or_default();
    row[schema.status_col] = update.status.unwrap_or_else(|| STATUS_NEW.to_string());
    row[schema.updated_col] = now_stamp();
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_schema_discovers_numeric_offer_columns() {
        let schema = ClientSchema::resolve(&header(&[
            "no", "user_id", "username", "first_name", "phone", "location", "ref", "history",
            "7", "12", "status", "updated_at",
        ]));
        assert_eq!(schema.offer_columns.get("7"), Some(&8));
        assert_eq!(schema.offer_columns.get("12"), Some(&9));
        assert_eq!(schema.status_col, 10);
        assert_eq!(schema.updated_col, 11);
        assert_eq!(schema.width, 12);
    }

    #[test]
    fn test_schema_positional_fallback_without_named_columns() {
        let schema = ClientSchema::resolve(&header(&[
            "no", "user_id", "username", "first_name", "phone", "location", "ref", "history",
            "x", "y",
        ]));
        assert!(schema.offer_columns.is_empty());
        assert_eq!(schema.status_col, 8);
        assert_eq!(schema.updated_col, 9);
    }

    #[test]
    fn test_schema_tolerates_empty_header() {
        let schema = ClientSchema::resolve(&[]);
        assert_eq!(schema.status_col, CLIENT_HISTORY_COL + 1);
        assert_eq!(schema.updated_col, CLIENT_HISTORY_COL + 2);
    }

    #[test]
    fn test_history_append_is_idempotent() {
        let mut field = String::new();
        append_history(&mut field, "7");
        append_history(&mut field, "12");
        append_history(&mut field, "7");
        assert_eq!(field, "7;12");
    }

    #[test]
    fn test_history_parsing_skips_blanks() {
        let ids: Vec<&str> = parse_history("7; ;12;").collect();
        assert_eq!(ids, vec!["7", "12"]);
    }
}
