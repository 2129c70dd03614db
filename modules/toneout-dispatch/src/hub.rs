//! Durable fan-out: ledger first, live subscribers second.
//!
//! `publish` appends to the notification ledger (assigning the cursor `seq`)
//! and only then pushes the stored record to the in-process broadcast channel
//! feeding SSE sessions. Delivery state lives in the store, so a restart or a
//! lagging subscriber loses nothing — clients recover by cursor via
//! `catch_up`.

use std::sync::Arc;

use tokio::sync::broadcast;

use toneout_common::Result;
use toneout_events::{InboxEntry, NotificationDraft, StoredNotification};

use crate::traits::NotificationLedger;

/// Buffered records per live subscriber before it lags out.
const CHANNEL_CAPACITY: usize = 256;

pub struct NotificationHub {
    ledger: Arc<dyn NotificationLedger>,
    tx: broadcast::Sender<StoredNotification>,
}

impl NotificationHub {
    /// Create the hub and its process-wide broadcast channel. One hub per
    /// service instance, created at startup and shared through state.
    pub fn new(ledger: Arc<dyn NotificationLedger>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { ledger, tx }
    }

    /// Append the draft durably, then push to live subscribers. A push with
    /// no receivers is not an error; SSE sessions come and go.
    pub async fn publish(&self, draft: NotificationDraft) -> Result<StoredNotification> {
        let stored = self.ledger.append(&draft).await?;
        let _ = self.tx.send(stored.clone());
        Ok(stored)
    }

    /// Cursor catch-up: everything after `since`, gap-free, with the
    /// recipient's read flags.
    pub async fn catch_up(
        &self,
        recipient: &str,
        since: i64,
        limit: i64,
    ) -> Result<Vec<InboxEntry>> {
        self.ledger.read_from(recipient, since, limit).await
    }

    /// Idempotent read mark. `Ok(false)` when `seq` does not exist.
    pub async fn mark_read(&self, recipient: &str, seq: i64) -> Result<bool> {
        self.ledger.mark_read(recipient, seq).await
    }

    /// Highest assigned cursor, for clients starting a fresh subscription.
    pub async fn latest_seq(&self) -> Result<i64> {
        self.ledger.latest_seq().await
    }

    /// A live feed of notifications stored after this point.
    pub fn subscribe(&self) -> broadcast::Receiver<StoredNotification> {
        self.tx.subscribe()
    }
}
