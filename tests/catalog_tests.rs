use std::sync::Arc;

use offerbot::catalog::{OfferCatalog, FALLBACK_CATEGORY};
use offerbot::store::MemorySheetStore;

const OFFERS: &str = "Offers";

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

fn header() -> Vec<String> {
    row(&["id", "category", "link", "name", "notes", "code"])
}

fn offer_row(id: &str, category: &str, name: &str, code: &str) -> Vec<String> {
    row(&[id, category, &format!("https://x/{id}"), name, "", code])
}

fn catalog_with(rows: Vec<Vec<String>>) -> OfferCatalog {
    let store = Arc::new(MemorySheetStore::new());
    store.seed(OFFERS, rows);
    OfferCatalog::new(store, OFFERS)
}

/// Header-only sheet reloads into an empty catalog, not an error.
#[tokio::test]
async fn test_header_only_sheet_yields_empty_catalog() {
    let catalog = catalog_with(vec![header()]);
    let snapshot = catalog.reload().await.unwrap();
    assert!(snapshot.is_empty());
    assert!(snapshot.categories().is_empty());
}

/// Fully empty sheet behaves the same.
#[tokio::test]
async fn test_empty_sheet_yields_empty_catalog() {
    let catalog = catalog_with(Vec::new());
    let snapshot = catalog.reload().await.unwrap();
    assert!(snapshot.is_empty());
}

/// Offers within a category come back in non-decreasing numeric id order
/// when every id in the category is numeric.
#[tokio::test]
async fn test_numeric_ids_sorted_numerically() {
    let catalog = catalog_with(vec![
        header(),
        offer_row("10", "cards", "Ten", "A"),
        offer_row("2", "cards", "Two", "B"),
        offer_row("7", "cards", "Seven", "C"),
    ]);
    let snapshot = catalog.reload().await.unwrap();
    let ids: Vec<&str> = snapshot
        .offers_in("cards")
        .iter()
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(ids, vec!["2", "7", "10"]);
}

/// One non-numeric id flips the whole category to lexicographic order.
#[tokio::test]
async fn test_mixed_ids_sorted_lexicographically() {
    let catalog = catalog_with(vec![
        header(),
        offer_row("10", "cards", "Ten", "A"),
        offer_row("2", "cards", "Two", "B"),
        offer_row("vip", "cards", "Vip", "C"),
    ]);
    let snapshot = catalog.reload().await.unwrap();
    let ids: Vec<&str> = snapshot
        .offers_in("cards")
        .iter()
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(ids, vec!["10", "2", "vip"]);
}

/// Categories keep first-seen source order across the whole load.
#[tokio::test]
async fn test_categories_in_first_seen_order() {
    let catalog = catalog_with(vec![
        header(),
        offer_row("1", "casino", "A", "X"),
        offer_row("2", "cards", "B", "Y"),
        offer_row("3", "casino", "C", "Z"),
    ]);
    let snapshot = catalog.reload().await.unwrap();
    assert_eq!(snapshot.categories(), &["casino".to_string(), "cards".to_string()]);
}

/// Rows with an empty category land in the fallback bucket.
#[tokio::test]
async fn test_fallback_category_assigned() {
    let catalog = catalog_with(vec![header(), offer_row("5", "", "Loose", "K")]);
    let snapshot = catalog.reload().await.unwrap();
    assert_eq!(snapshot.offers_in(FALLBACK_CATEGORY).len(), 1);
    assert_eq!(snapshot.by_id("5").unwrap().category, FALLBACK_CATEGORY);
}

/// A reload never mutates a snapshot a reader already holds.
#[tokio::test]
async fn test_reload_swaps_snapshot_atomically() {
    let store = Arc::new(MemorySheetStore::new());
    store.seed(OFFERS, vec![header(), offer_row("1", "cards", "One", "A")]);
    let catalog = OfferCatalog::new(Arc::clone(&store) as Arc<dyn offerbot::store::SheetStore>, OFFERS);

    let before = catalog.reload().await.unwrap();
    assert_eq!(before.len(), 1);

    store.seed(
        OFFERS,
        vec![
            header(),
            offer_row("1", "cards", "One", "A"),
            offer_row("2", "cards", "Two", "B"),
        ],
    );
    let after = catalog.reload().await.unwrap();

    // The old handle still sees the old world; new readers see the new one.
    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
    assert_eq!(catalog.snapshot().len(), 2);
}

/// Offer fields map from the sheet layout, code at its fixed offset.
#[tokio::test]
async fn test_offer_fields_and_source_row() {
    let catalog = catalog_with(vec![header(), offer_row("7", "cards", "Seven", "XK9")]);
    let snapshot = catalog.reload().await.unwrap();
    let offer = snapshot.by_id("7").unwrap();
    assert_eq!(offer.name, "Seven");
    assert_eq!(offer.link, "https://x/7");
    assert_eq!(offer.code, "XK9");
    assert_eq!(offer.source_row, 2);
}
