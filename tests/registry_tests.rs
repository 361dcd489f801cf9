use std::sync::Arc;

use offerbot::registry::{ChatUser, ClientRegistry, ClientUpdate, OFFER_STATUS_SELECTED};
use offerbot::store::MemorySheetStore;

const CLIENTS: &str = "Clients";

fn header() -> Vec<String> {
    [
        "no", "user_id", "username", "first_name", "phone", "location", "ref", "history", "7",
        "12", "status", "updated_at",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn setup() -> (Arc<MemorySheetStore>, ClientRegistry) {
    let store = Arc::new(MemorySheetStore::new());
    store.seed(CLIENTS, vec![header()]);
    let registry = ClientRegistry::new(
        Arc::clone(&store) as Arc<dyn offerbot::store::SheetStore>,
        CLIENTS,
    );
    (store, registry)
}

fn ann() -> ChatUser {
    ChatUser {
        id: 1001,
        username: Some("ann".to_string()),
        first_name: "Ann".to_string(),
        last_name: None,
    }
}

#[tokio::test]
async fn test_upsert_creates_row_with_sequential_number() {
    let (store, registry) = setup();

    registry.upsert(&ann(), ClientUpdate::status("new")).await.unwrap();
    let rows = store.rows(CLIENTS);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "1"); // first client
    assert_eq!(rows[1][1], "1001");
    assert_eq!(rows[1][10], "new");
    assert!(!rows[1][11].is_empty()); // updated_at stamped

    let bob = ChatUser::new(1002, "Bob");
    registry.upsert(&bob, ClientUpdate::status("new")).await.unwrap();
    assert_eq!(store.rows(CLIENTS)[2][0], "2");
}

#[tokio::test]
async fn test_find_row_scans_user_id_column() {
    let (_store, registry) = setup();
    registry.upsert(&ann(), ClientUpdate::status("new")).await.unwrap();

    assert_eq!(registry.find_row(1001).await.unwrap(), Some(2));
    assert_eq!(registry.find_row(9999).await.unwrap(), None);
}

/// Absent fields never clobber existing values; supplied fields overwrite.
#[tokio::test]
async fn test_upsert_partial_update_keeps_existing_fields() {
    let (store, registry) = setup();
    let user = ann();

    registry
        .upsert(&user, ClientUpdate::phone("+70001112233"))
        .await
        .unwrap();
    registry
        .upsert(&user, ClientUpdate::location("55.75,37.61"))
        .await
        .unwrap();

    let rows = store.rows(CLIENTS);
    assert_eq!(rows.len(), 2, "second upsert must update, not append");
    assert_eq!(rows[1][4], "+70001112233");
    assert_eq!(rows[1][5], "55.75,37.61");
}

#[tokio::test]
async fn test_offer_field_appends_to_history() {
    let (store, registry) = setup();
    let user = ann();

    let with_offer = |id: &str| ClientUpdate {
        offer: Some(id.to_string()),
        ..Default::default()
    };
    registry.upsert(&user, with_offer("7")).await.unwrap();
    registry.upsert(&user, with_offer("12")).await.unwrap();
    registry.upsert(&user, with_offer("7")).await.unwrap();

    assert_eq!(store.rows(CLIENTS)[1][7], "7;12");
}

/// Taken offers union the history field and truthy per-offer columns.
#[tokio::test]
async fn test_taken_offers_unions_history_and_status_columns() {
    let (store, registry) = setup();
    let mut row: Vec<String> = vec![String::new(); 12];
    row[0] = "1".to_string();
    row[1] = "1001".to_string();
    row[7] = "3;5".to_string(); // history mentions 3 and 5
    row[9] = "DONE".to_string(); // offer 12's dedicated column is truthy
    let mut rows = vec![header()];
    rows.push(row);
    store.seed(CLIENTS, rows);

    let taken = registry.taken_offers(1001).await.unwrap();
    assert!(taken.contains("3"));
    assert!(taken.contains("5"));
    assert!(taken.contains("12"));
    assert!(!taken.contains("7"));
}

#[tokio::test]
async fn test_taken_offers_empty_for_unknown_user() {
    let (_store, registry) = setup();
    assert!(registry.taken_offers(4242).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mark_offer_taken_sets_status_column_and_history() {
    let (store, registry) = setup();
    let user = ann();
    registry.upsert(&user, ClientUpdate::status("new")).await.unwrap();

    registry.mark_offer_taken(&user, "7").await.unwrap();

    let rows = store.rows(CLIENTS);
    assert_eq!(rows[1][7], "7");
    assert_eq!(rows[1][8], OFFER_STATUS_SELECTED);
}

/// Marking twice leaves the same persisted state as marking once.
#[tokio::test]
async fn test_mark_offer_taken_idempotent() {
    let (store, registry) = setup();
    let user = ann();
    registry.upsert(&user, ClientUpdate::status("new")).await.unwrap();

    registry.mark_offer_taken(&user, "7").await.unwrap();
    let first = store.rows(CLIENTS);
    registry.mark_offer_taken(&user, "7").await.unwrap();
    let second = store.rows(CLIENTS);

    // Only the refresh stamp may differ
    assert_eq!(first[1][..11], second[1][..11]);
    assert_eq!(second[1][7], "7");
}

/// Redeeming never un-marks: the taken set grows monotonically.
#[tokio::test]
async fn test_taken_offers_monotonic_growth() {
    let (_store, registry) = setup();
    let user = ann();
    registry.upsert(&user, ClientUpdate::status("new")).await.unwrap();

    registry.mark_offer_taken(&user, "7").await.unwrap();
    let before = registry.taken_offers(user.id).await.unwrap();

    registry.mark_offer_taken(&user, "12").await.unwrap();
    registry
        .upsert(&user, ClientUpdate::phone("+7000"))
        .await
        .unwrap();
    let after = registry.taken_offers(user.id).await.unwrap();

    assert!(before.is_subset(&after));
    assert!(after.contains("7") && after.contains("12"));
}

/// Marking an offer with no dedicated column still records it in history.
#[tokio::test]
async fn test_mark_offer_without_dedicated_column() {
    let (store, registry) = setup();
    let user = ann();
    registry.upsert(&user, ClientUpdate::status("new")).await.unwrap();

    registry.mark_offer_taken(&user, "99").await.unwrap();
    assert_eq!(store.rows(CLIENTS)[1][7], "99");
    assert!(registry.taken_offers(user.id).await.unwrap().contains("99"));
}

/// Marking for a user with no record creates the record.
#[tokio::test]
async fn test_mark_offer_taken_creates_missing_record() {
    let (store, registry) = setup();
    registry.mark_offer_taken(&ann(), "7").await.unwrap();

    let rows = store.rows(CLIENTS);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "1001");
    assert_eq!(rows[1][8], OFFER_STATUS_SELECTED);
}

#[tokio::test]
async fn test_column_map_for_offers() {
    let (_store, registry) = setup();
    let map = registry.column_map_for_offers().await.unwrap();
    assert_eq!(map.get("7"), Some(&8));
    assert_eq!(map.get("12"), Some(&9));
    assert_eq!(map.len(), 2);
}
