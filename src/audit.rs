//! Audit event log
//!
//! Write-only, append-only event rows in the event-log sheet. Events go
//! through an ordered in-process queue drained by a dedicated writer task,
//! so audit latency never sits on the user-facing path while per-user causal
//! order is preserved. Write failures are logged and dropped; the log is
//! never read back.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::registry::ChatUser;
use crate::store::{SheetStore, StoreError};
use crate::timefmt::now_stamp;

/// Audit rows keep at most this much event content.
pub const MAX_CONTENT_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: String,
    pub user_id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub kind: String,
    pub content: String,
}

impl AuditEvent {
    pub fn new(user: &ChatUser, kind: impl Into<String>, content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.len() > MAX_CONTENT_LEN {
            let mut cut = MAX_CONTENT_LEN;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }
        Self {
            timestamp: now_stamp(),
            user_id: user.id,
            username: user.username.clone().unwrap_or_default(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone().unwrap_or_default(),
            kind: kind.into(),
            content,
        }
    }

    fn into_row(self) -> Vec<String> {
        vec![
            self.timestamp,
            self.user_id.to_string(),
            self.username,
            self.first_name,
            self.last_name,
            self.kind,
            self.content,
        ]
    }
}

/// Append one event row directly, bypassing the queue.
///
/// Used by the writer task and by the operator's store-connectivity probe,
/// which needs the result.
pub async fn append_event(
    store: &dyn SheetStore,
    sheet: &str,
    event: AuditEvent,
) -> Result<(), StoreError> {
    store.append_row(sheet, &event.into_row()).await
}

/// Handle to the ordered audit queue.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditLog {
    /// Spawn the writer task and return the queue handle.
    pub fn spawn(store: Arc<dyn SheetStore>, sheet: impl Into<String>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        let sheet = sheet.into();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let kind = event.kind.clone();
                let user_id = event.user_id;
                match append_event(store.as_ref(), &sheet, event).await {
                    Ok(()) => debug!(user_id, kind, "Audit event written"),
                    Err(e) => error!(user_id, kind, error = %e, "Audit write failed, event dropped"),
                }
            }
        });
        Self { tx }
    }

    /// Enqueue an event without waiting for the store.
    pub fn record(&self, user: &ChatUser, kind: &str, content: &str) {
        let event = AuditEvent::new(user, kind, content);
        if self.tx.send(event).is_err() {
            error!(user_id = user.id, kind, "Audit writer gone, event dropped");
        }
    }
}
