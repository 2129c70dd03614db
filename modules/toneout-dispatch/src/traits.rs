// Trait abstractions for engine dependencies.
//
// DispatchStore replaces PgDispatchStore — calls, units and alerts behind one
// trait. NotificationLedger replaces NotificationStore — the durable feed.
//
// These enable deterministic testing with MemoryStore: no Postgres, no
// Docker. `cargo test` in seconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use toneout_common::{
    Alert, AlertFilter, Call, CallFilter, Result, StatusLogDraft, StatusLogEntry, Unit, UnitFilter,
};
use toneout_events::{InboxEntry, NotificationDraft, NotificationStore, StoredNotification};
use toneout_store::{ClaimOutcome, PgDispatchStore};

// ---------------------------------------------------------------------------
// DispatchStore — replaces PgDispatchStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DispatchStore: Send + Sync {
    // --- Calls ---

    /// Persist a freshly created call.
    async fn insert_call(&self, call: &Call) -> Result<()>;

    async fn call(&self, id: Uuid) -> Result<Option<Call>>;

    async fn list_calls(&self, filter: &CallFilter) -> Result<Vec<Call>>;

    /// Version-checked update of a call's mutable columns. Fails with
    /// `VersionConflict` when `expected_version` no longer matches.
    async fn update_call(&self, call: &Call, expected_version: i64) -> Result<Call>;

    /// Advance and return the durable per-year call-number sequence.
    async fn next_call_number(&self, year: i32) -> Result<i64>;

    // --- Units ---

    /// Persist a new unit; callsigns are unique per department.
    async fn insert_unit(&self, unit: &Unit) -> Result<()>;

    async fn unit(&self, id: Uuid) -> Result<Option<Unit>>;

    async fn list_units(&self, filter: &UnitFilter) -> Result<Vec<Unit>>;

    /// Atomically bind an available, unbound unit to a call (status becomes
    /// `Enroute`), logging the transition in the same transaction. A unit
    /// failing the condition is reported as a rejection, not an error.
    async fn try_claim(&self, unit_id: Uuid, call_id: Uuid, issued_by: &str)
        -> Result<ClaimOutcome>;

    /// Version-checked unit mutation plus its status-log entry, atomically.
    async fn apply_status(
        &self,
        unit: &Unit,
        expected_version: i64,
        log: &StatusLogDraft,
    ) -> Result<Unit>;

    /// Clear a unit's binding iff it still points at `call_id`, making the
    /// unit `Available` and logging the release. `None` means the binding was
    /// already gone (released, reassigned or taken out of service).
    async fn release(&self, unit_id: Uuid, call_id: Uuid, issued_by: &str)
        -> Result<Option<Unit>>;

    /// Status-log page for one unit, newest first.
    async fn status_log(&self, unit_id: Uuid, limit: i64) -> Result<Vec<StatusLogEntry>>;

    // --- Alerts ---

    async fn insert_alert(&self, alert: &Alert) -> Result<()>;

    async fn alert(&self, id: Uuid) -> Result<Option<Alert>>;

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// `Active → Responded`; any other current state is a conflict.
    async fn respond_alert(&self, id: Uuid, by: &str) -> Result<Alert>;

    /// `Active | Responded → Resolved`; resolving twice is a conflict.
    async fn resolve_alert(&self, id: Uuid, by: &str) -> Result<Alert>;

    /// Panic alerts still `Active` that were created before the cutoff.
    async fn stale_panics(&self, created_before: DateTime<Utc>) -> Result<Vec<Alert>>;

    /// Stamp `last_reminded_at` iff the alert is still active and was not
    /// reminded since `not_since`. Exactly one concurrent sweeper wins.
    async fn touch_reminder(&self, id: Uuid, not_since: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
impl DispatchStore for PgDispatchStore {
    async fn insert_call(&self, call: &Call) -> Result<()> {
        self.insert_call(call).await
    }

    async fn call(&self, id: Uuid) -> Result<Option<Call>> {
        self.call(id).await
    }

    async fn list_calls(&self, filter: &CallFilter) -> Result<Vec<Call>> {
        self.list_calls(filter).await
    }

    async fn update_call(&self, call: &Call, expected_version: i64) -> Result<Call> {
        self.update_call(call, expected_version).await
    }

    async fn next_call_number(&self, year: i32) -> Result<i64> {
        self.next_call_number(year).await
    }

    async fn insert_unit(&self, unit: &Unit) -> Result<()> {
        self.insert_unit(unit).await
    }

    async fn unit(&self, id: Uuid) -> Result<Option<Unit>> {
        self.unit(id).await
    }

    async fn list_units(&self, filter: &UnitFilter) -> Result<Vec<Unit>> {
        self.list_units(filter).await
    }

    async fn try_claim(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<ClaimOutcome> {
        self.try_claim(unit_id, call_id, issued_by).await
    }

    async fn apply_status(
        &self,
        unit: &Unit,
        expected_version: i64,
        log: &StatusLogDraft,
    ) -> Result<Unit> {
        self.apply_status(unit, expected_version, log).await
    }

    async fn release(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<Option<Unit>> {
        self.release(unit_id, call_id, issued_by).await
    }

    async fn status_log(&self, unit_id: Uuid, limit: i64) -> Result<Vec<StatusLogEntry>> {
        self.status_log(unit_id, limit).await
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.insert_alert(alert).await
    }

    async fn alert(&self, id: Uuid) -> Result<Option<Alert>> {
        self.alert(id).await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.list_alerts(filter).await
    }

    async fn respond_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        self.respond_alert(id, by).await
    }

    async fn resolve_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        self.resolve_alert(id, by).await
    }

    async fn stale_panics(&self, created_before: DateTime<Utc>) -> Result<Vec<Alert>> {
        self.stale_panics(created_before).await
    }

    async fn touch_reminder(&self, id: Uuid, not_since: DateTime<Utc>) -> Result<bool> {
        self.touch_reminder(id, not_since).await
    }
}

// ---------------------------------------------------------------------------
// NotificationLedger — replaces NotificationStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Durably append a notification, assigning the next `seq`.
    async fn append(&self, draft: &NotificationDraft) -> Result<StoredNotification>;

    /// Everything after cursor `since` in `seq` order, stopping at the first
    /// gap, with the recipient's read flag on each row.
    async fn read_from(&self, recipient: &str, since: i64, limit: i64) -> Result<Vec<InboxEntry>>;

    /// Idempotent per-recipient read mark. `Ok(false)` when `seq` is unknown.
    async fn mark_read(&self, recipient: &str, seq: i64) -> Result<bool>;

    /// Highest assigned `seq`, 0 when the ledger is empty.
    async fn latest_seq(&self) -> Result<i64>;
}

#[async_trait]
impl NotificationLedger for NotificationStore {
    async fn append(&self, draft: &NotificationDraft) -> Result<StoredNotification> {
        Ok(self.append(draft).await?)
    }

    async fn read_from(&self, recipient: &str, since: i64, limit: i64) -> Result<Vec<InboxEntry>> {
        Ok(self.read_from(recipient, since, limit.max(0) as usize).await?)
    }

    async fn mark_read(&self, recipient: &str, seq: i64) -> Result<bool> {
        Ok(self.mark_read(recipient, seq).await?)
    }

    async fn latest_seq(&self) -> Result<i64> {
        Ok(self.latest_seq().await?)
    }
}
