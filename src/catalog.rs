//! Offer catalog
//!
//! Loads the offer list from the offers sheet into an in-memory index keyed
//! by offer id and by category. The whole catalog is rebuilt on reload and
//! swapped in atomically, so readers never observe a partially-updated index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{SheetStore, StoreError};

// Offers sheet layout: [id, category, link, name, _, code]
pub const OFFER_ID_COL: usize = 0;
pub const OFFER_CATEGORY_COL: usize = 1;
pub const OFFER_LINK_COL: usize = 2;
pub const OFFER_NAME_COL: usize = 3;
/// Code cell sits at a fixed offset from the row start.
pub const OFFER_CODE_COL: usize = 5;

/// Category label assigned to rows with an empty category cell.
pub const FALLBACK_CATEGORY: &str = "uncategorized";

/// A redeemable promotional item, immutable until the next catalog reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub category: String,
    pub name: String,
    pub link: String,
    /// Secret required to redeem the offer
    pub code: String,
    /// 1-based row in the offers sheet, kept for auditing
    pub source_row: usize,
}

/// One complete, immutable load of the offers sheet.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    by_id: HashMap<String, Offer>,
    categories: Vec<String>,
    by_category: HashMap<String, Vec<Offer>>,
}

impl CatalogSnapshot {
    /// Build a snapshot from raw sheet rows (header row first).
    ///
    /// Skips the header and any row with an empty id. Duplicate ids are
    /// last-write-wins in the id index; category lists keep one entry per
    /// source row in insertion order, then sort by numeric id when every id
    /// in the category parses as an integer, lexicographically otherwise.
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        let mut snapshot = CatalogSnapshot::default();

        for (i, row) in rows.iter().enumerate().skip(1) {
            let cell = |col: usize| row.get(col).map(String::as_str).unwrap_or("").trim();

            let id = cell(OFFER_ID_COL);
            if id.is_empty() {
                continue;
            }
            let category = match cell(OFFER_CATEGORY_COL) {
                "" => FALLBACK_CATEGORY.to_string(),
                name => name.to_string(),
            };

            let offer = Offer {
                id: id.to_string(),
                category: category.clone(),
                name: cell(OFFER_NAME_COL).to_string(),
                link: cell(OFFER_LINK_COL).to_string(),
                code: cell(OFFER_CODE_COL).to_string(),
                source_row: i + 1,
            };

            if !snapshot.by_category.contains_key(&category) {
                snapshot.categories.push(category.clone());
            }
            snapshot
                .by_category
                .entry(category)
                .or_default()
                .push(offer.clone());
            snapshot.by_id.insert(offer.id.clone(), offer);
        }

        for offers in snapshot.by_category.values_mut() {
            let all_numeric = offers.iter().all(|o| o.id.parse::<u64>().is_ok());
            if all_numeric {
                offers.sort_by_key(|o| o.id.parse::<u64>().unwrap_or(u64::MAX));
            } else {
                offers.sort_by(|a, b| a.id.cmp(&b.id));
            }
        }

        snapshot
    }

    /// Category names in first-seen order during load.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn offers_in(&self, category: &str) -> &[Offer] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn by_id(&self, offer_id: &str) -> Option<&Offer> {
        self.by_id.get(offer_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Process-wide offer index with atomic snapshot replacement.
pub struct OfferCatalog {
    store: Arc<dyn SheetStore>,
    sheet: String,
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl OfferCatalog {
    /// Create an empty catalog; call [`reload`](Self::reload) to populate it.
    pub fn new(store: Arc<dyn SheetStore>, sheet: impl Into<String>) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    /// Fetch the offers sheet and replace the snapshot atomically.
    ///
    /// An empty or header-only sheet yields an empty catalog, not an error.
    /// In-flight readers keep the snapshot they already cloned.
    pub async fn reload(&self) -> Result<Arc<CatalogSnapshot>, StoreError> {
        let rows = self.store.read_all(&self.sheet).await?;
        let snapshot = Arc::new(CatalogSnapshot::from_rows(&rows));
        info!(
            offers = snapshot.len(),
            categories = snapshot.categories().len(),
            "Offer catalog reloaded"
        );
        *self.current.write().unwrap() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Cheap handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_only_sheet_is_empty_catalog() {
        let rows = vec![row(&["id", "category", "link", "name", "", "code"])];
        let snapshot = CatalogSnapshot::from_rows(&rows);
        assert!(snapshot.is_empty());
        assert!(snapshot.categories().is_empty());
    }

    #[test]
    fn test_rows_with_empty_id_skipped() {
        let rows = vec![
            row(&["id", "category", "link", "name", "", "code"]),
            row(&["", "cards", "https://x", "ghost", "", "AA"]),
            row(&["3", "cards", "https://y", "real", "", "BB"]),
        ];
        let snapshot = CatalogSnapshot::from_rows(&rows);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.by_id("3").is_some());
    }

    #[test]
    fn test_empty_category_gets_fallback() {
        let rows = vec![
            row(&["id", "category", "link", "name", "", "code"]),
            row(&["9", "", "https://x", "loose", "", "CC"]),
        ];
        let snapshot = CatalogSnapshot::from_rows(&rows);
        assert_eq!(snapshot.by_id("9").unwrap().category, FALLBACK_CATEGORY);
        assert_eq!(snapshot.offers_in(FALLBACK_CATEGORY).len(), 1);
    }

    #[test]
    fn test_duplicate_ids_last_write_wins_in_index() {
        let rows = vec![
            row(&["id", "category", "link", "name", "", "code"]),
            row(&["5", "cards", "https://old", "old", "", "AA"]),
            row(&["5", "cards", "https://new", "new", "", "BB"]),
        ];
        let snapshot = CatalogSnapshot::from_rows(&rows);
        assert_eq!(snapshot.by_id("5").unwrap().name, "new");
    }
}
