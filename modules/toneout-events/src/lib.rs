//! Durable notification ledger.
//!
//! Append-only Postgres store with a monotonic `seq` cursor and a
//! per-recipient read ledger. Notification content never mutates after
//! creation; the only per-recipient state is the read mark. Catch-up reads
//! are gap-free, so a cursor-polling client sees neither duplicates nor
//! holes.

pub mod store;
pub mod types;

pub use store::NotificationStore;
pub use types::{InboxEntry, NotificationDraft, NotificationKind, StoredNotification};
