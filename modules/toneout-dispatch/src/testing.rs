// In-memory store for engine tests.
//
// MemoryStore implements both trait boundaries — DispatchStore and
// NotificationLedger — with the same conditional-update semantics as the
// Postgres store: version-checked call/unit updates, atomic claims, a
// monotonic notification seq. No Postgres, no Docker.
//
// Fault switches simulate the failure points the engines care about: a
// failing alert insert, a failing ledger append, and claims that start
// erroring mid-batch. `burn_seq` leaves a hole in the notification sequence
// the way an uncommitted append would; `dispatch_after_reads` lands a
// concurrent assignment's call update between two reads of the call.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use toneout_common::{
    Alert, AlertFilter, AlertStatus, Call, CallFilter, CallStatus, DispatchError, RejectedUnit,
    Result, StatusLogDraft, StatusLogEntry, Unit, UnitFilter, UnitStatus,
};
use toneout_events::{InboxEntry, NotificationDraft, StoredNotification};
use toneout_store::ClaimOutcome;

use crate::traits::{DispatchStore, NotificationLedger};

/// Inner mutable state for MemoryStore.
struct MemoryInner {
    calls: HashMap<Uuid, Call>,
    call_numbers: HashMap<i32, i64>,
    units: HashMap<Uuid, Unit>,
    status_log: Vec<StatusLogEntry>,
    last_log_seq: i64,
    alerts: HashMap<Uuid, Alert>,
    notifications: Vec<StoredNotification>,
    last_seq: i64,
    reads: HashSet<(i64, String)>,
    fail_alert_insert: bool,
    fail_append: bool,
    fail_claims_after: Option<u32>,
    staged_dispatch: Option<StagedDispatch>,
}

/// A queued `Pending → Dispatched` flip, applied while a reader holds the
/// lock so it is indistinguishable from a concurrent writer.
struct StagedDispatch {
    call_id: Uuid,
    unit_ids: Vec<Uuid>,
    reads_left: u32,
}

/// Stateful in-memory store. Thread-safe via interior Mutex; every trait
/// method is a single critical section, so claims and version checks are
/// atomic exactly like their SQL counterparts.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                calls: HashMap::new(),
                call_numbers: HashMap::new(),
                units: HashMap::new(),
                status_log: Vec::new(),
                last_log_seq: 0,
                alerts: HashMap::new(),
                notifications: Vec::new(),
                last_seq: 0,
                reads: HashSet::new(),
                fail_alert_insert: false,
                fail_append: false,
                fail_claims_after: None,
                staged_dispatch: None,
            }),
        }
    }

    /// Make every alert insert fail, exercising the persist-failure policy.
    pub fn fail_alert_inserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_alert_insert = fail;
    }

    /// Make every ledger append fail, exercising the publish-failure policy.
    pub fn fail_ledger_appends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_append = fail;
    }

    /// Let `n` claims land, then fail every later claim attempt with a store
    /// error, exercising the mid-batch compensation path.
    pub fn fail_claims_after(&self, n: u32) {
        self.inner.lock().unwrap().fail_claims_after = Some(n);
    }

    /// Stage a `Pending → Dispatched` flip (attaching `unit_ids`) that lands
    /// once the call has been read `reads` more times — an assignment's call
    /// update committing between two loads.
    pub fn dispatch_after_reads(&self, call_id: Uuid, unit_ids: &[Uuid], reads: u32) {
        self.inner.lock().unwrap().staged_dispatch = Some(StagedDispatch {
            call_id,
            unit_ids: unit_ids.to_vec(),
            reads_left: reads,
        });
    }

    /// Consume a seq without storing a row — the hole an uncommitted append
    /// leaves in the sequence.
    pub fn burn_seq(&self) {
        self.inner.lock().unwrap().last_seq += 1;
    }

    // --- Assertion helpers ---

    /// Every stored notification in seq order, ignoring read marks.
    pub fn notifications(&self) -> Vec<StoredNotification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    /// Every alert for one unit, oldest first.
    pub fn alerts_for(&self, unit_id: Uuid) -> Vec<Alert> {
        let inner = self.inner.lock().unwrap();
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.unit_id == unit_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    /// Full status log for one unit, oldest first.
    pub fn log_for(&self, unit_id: Uuid) -> Vec<StatusLogEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .status_log
            .iter()
            .filter(|e| e.unit_id == unit_id)
            .cloned()
            .collect()
    }

    fn apply_staged_dispatch(inner: &mut MemoryInner, id: Uuid) {
        let due = match inner.staged_dispatch.as_mut() {
            Some(staged) if staged.call_id == id => {
                if staged.reads_left == 0 {
                    true
                } else {
                    staged.reads_left -= 1;
                    false
                }
            }
            _ => false,
        };
        if !due {
            return;
        }
        let Some(staged) = inner.staged_dispatch.take() else {
            return;
        };
        if let Some(call) = inner.calls.get_mut(&staged.call_id) {
            if call.status == CallStatus::Pending {
                call.status = CallStatus::Dispatched;
                call.dispatched_at = Some(Utc::now());
            }
            for unit_id in staged.unit_ids {
                if !call.assigned_units.contains(&unit_id) {
                    call.assigned_units.push(unit_id);
                }
            }
            call.version += 1;
        }
    }

    fn push_log(
        inner: &mut MemoryInner,
        unit_id: Uuid,
        code: Option<String>,
        status: UnitStatus,
        call_id: Option<Uuid>,
        notes: Option<String>,
        issued_by: &str,
    ) {
        inner.last_log_seq += 1;
        inner.status_log.push(StatusLogEntry {
            seq: inner.last_log_seq,
            unit_id,
            code,
            status,
            call_id,
            notes,
            issued_by: issued_by.to_string(),
            ts: Utc::now(),
        });
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn insert_call(&self, call: &Call) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .insert(call.id, call.clone());
        Ok(())
    }

    async fn call(&self, id: Uuid) -> Result<Option<Call>> {
        let mut inner = self.inner.lock().unwrap();
        Self::apply_staged_dispatch(&mut inner, id);
        Ok(inner.calls.get(&id).cloned())
    }

    async fn list_calls(&self, filter: &CallFilter) -> Result<Vec<Call>> {
        let inner = self.inner.lock().unwrap();
        let mut calls: Vec<Call> = inner
            .calls
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| filter.priority.is_none_or(|p| c.priority == p))
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        calls.truncate(filter.limit.unwrap_or(200) as usize);
        Ok(calls)
    }

    async fn update_call(&self, call: &Call, expected_version: i64) -> Result<Call> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .calls
            .get_mut(&call.id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "call",
                id: call.id.to_string(),
            })?;
        if stored.version != expected_version {
            return Err(DispatchError::VersionConflict {
                kind: "call",
                id: call.id,
            });
        }
        // Same column set the SQL update touches.
        stored.priority = call.priority;
        stored.status = call.status;
        stored.outcome = call.outcome.clone();
        stored.cancelled_reason = call.cancelled_reason.clone();
        stored.assigned_units = call.assigned_units.clone();
        stored.dispatched_at = call.dispatched_at;
        stored.closed_at = call.closed_at;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn next_call_number(&self, year: i32) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.call_numbers.entry(year).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_unit(&self, unit: &Unit) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .units
            .values()
            .any(|u| u.department == unit.department && u.callsign == unit.callsign)
        {
            return Err(DispatchError::CallsignTaken {
                department: unit.department,
                callsign: unit.callsign.clone(),
            });
        }
        inner.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn unit(&self, id: Uuid) -> Result<Option<Unit>> {
        Ok(self.inner.lock().unwrap().units.get(&id).cloned())
    }

    async fn list_units(&self, filter: &UnitFilter) -> Result<Vec<Unit>> {
        let inner = self.inner.lock().unwrap();
        let mut units: Vec<Unit> = inner
            .units
            .values()
            .filter(|u| filter.department.is_none_or(|d| u.department == d))
            .filter(|u| filter.status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        units.sort_by(|a, b| {
            (a.department.as_str(), &a.callsign).cmp(&(b.department.as_str(), &b.callsign))
        });
        Ok(units)
    }

    async fn try_claim(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(left) = inner.fail_claims_after.as_mut() {
            if *left == 0 {
                return Err(anyhow::anyhow!("injected claim failure").into());
            }
            *left -= 1;
        }
        let Some(unit) = inner.units.get_mut(&unit_id) else {
            return Ok(ClaimOutcome::Rejected(RejectedUnit::not_found(unit_id)));
        };
        if let Some(current) = unit.current_call {
            return Ok(ClaimOutcome::Rejected(RejectedUnit::already_assigned(
                unit_id, current,
            )));
        }
        if unit.status != UnitStatus::Available {
            return Ok(ClaimOutcome::Rejected(RejectedUnit::not_available(
                unit_id,
                unit.status,
            )));
        }

        unit.status = UnitStatus::Enroute;
        unit.current_call = Some(call_id);
        unit.updated_at = Utc::now();
        unit.version += 1;
        let claimed = unit.clone();
        Self::push_log(
            &mut inner,
            unit_id,
            None,
            UnitStatus::Enroute,
            Some(call_id),
            None,
            issued_by,
        );
        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn apply_status(
        &self,
        unit: &Unit,
        expected_version: i64,
        log: &StatusLogDraft,
    ) -> Result<Unit> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .units
            .get_mut(&unit.id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "unit",
                id: unit.id.to_string(),
            })?;
        if stored.version != expected_version {
            return Err(DispatchError::VersionConflict {
                kind: "unit",
                id: unit.id,
            });
        }
        stored.status = unit.status;
        stored.current_call = unit.current_call;
        stored.location = unit.location.clone();
        stored.updated_at = Utc::now();
        stored.version += 1;
        let updated = stored.clone();
        Self::push_log(
            &mut inner,
            unit.id,
            log.code.clone(),
            log.status,
            log.call_id,
            log.notes.clone(),
            &log.issued_by,
        );
        Ok(updated)
    }

    async fn release(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<Option<Unit>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(unit) = inner.units.get_mut(&unit_id) else {
            return Ok(None);
        };
        if unit.current_call != Some(call_id) {
            return Ok(None);
        }
        unit.current_call = None;
        unit.status = UnitStatus::Available;
        unit.updated_at = Utc::now();
        unit.version += 1;
        let released = unit.clone();
        Self::push_log(
            &mut inner,
            unit_id,
            None,
            UnitStatus::Available,
            Some(call_id),
            None,
            issued_by,
        );
        Ok(Some(released))
    }

    async fn status_log(&self, unit_id: Uuid, limit: i64) -> Result<Vec<StatusLogEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<StatusLogEntry> = inner
            .status_log
            .iter()
            .filter(|e| e.unit_id == unit_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_alert_insert {
            return Err(anyhow::anyhow!("injected alert insert failure").into());
        }
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn alert(&self, id: Uuid) -> Result<Option<Alert>> {
        Ok(self.inner.lock().unwrap().alerts.get(&id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let inner = self.inner.lock().unwrap();
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| filter.kind.is_none_or(|k| a.kind == k))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.department.is_none_or(|d| a.department == d))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn respond_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "alert",
                id: id.to_string(),
            })?;
        match alert.status {
            AlertStatus::Active => {
                alert.status = AlertStatus::Responded;
                alert.responded_at = Some(Utc::now());
                alert.responded_by = Some(by.to_string());
                Ok(alert.clone())
            }
            AlertStatus::Resolved => Err(DispatchError::AlreadyResolved { id }),
            AlertStatus::Responded => Err(DispatchError::AlreadyResponded { id }),
        }
    }

    async fn resolve_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound {
                kind: "alert",
                id: id.to_string(),
            })?;
        match alert.status {
            AlertStatus::Active | AlertStatus::Responded => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(Utc::now());
                alert.resolved_by = Some(by.to_string());
                Ok(alert.clone())
            }
            AlertStatus::Resolved => Err(DispatchError::AlreadyResolved { id }),
        }
    }

    async fn stale_panics(&self, created_before: DateTime<Utc>) -> Result<Vec<Alert>> {
        let inner = self.inner.lock().unwrap();
        let mut stale: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| {
                a.kind == toneout_common::AlertKind::Panic
                    && a.status == AlertStatus::Active
                    && a.created_at < created_before
            })
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.created_at);
        Ok(stale)
    }

    async fn touch_reminder(&self, id: Uuid, not_since: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(alert) = inner.alerts.get_mut(&id) else {
            return Ok(false);
        };
        if alert.status != AlertStatus::Active {
            return Ok(false);
        }
        if alert.last_reminded_at.is_some_and(|at| at >= not_since) {
            return Ok(false);
        }
        alert.last_reminded_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl NotificationLedger for MemoryStore {
    async fn append(&self, draft: &NotificationDraft) -> Result<StoredNotification> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_append {
            return Err(anyhow::anyhow!("injected ledger append failure").into());
        }
        inner.last_seq += 1;
        let stored = StoredNotification {
            seq: inner.last_seq,
            id: Uuid::new_v4(),
            kind: draft.kind,
            severity: draft.severity,
            department: draft.department,
            title: draft.title.clone(),
            payload: draft.payload.clone(),
            call_id: draft.call_id,
            unit_id: draft.unit_id,
            alert_id: draft.alert_id,
            created_at: Utc::now(),
        };
        inner.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn read_from(&self, recipient: &str, since: i64, limit: i64) -> Result<Vec<InboxEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut entries = Vec::new();
        let mut expected = since + 1;
        for stored in inner.notifications.iter().filter(|n| n.seq > since) {
            if entries.len() as i64 >= limit {
                break;
            }
            // Stop at the first hole rather than skip it.
            if stored.seq != expected {
                break;
            }
            let read = inner.reads.contains(&(stored.seq, recipient.to_string()));
            entries.push(InboxEntry {
                notification: stored.clone(),
                read,
            });
            expected += 1;
        }
        Ok(entries)
    }

    async fn mark_read(&self, recipient: &str, seq: i64) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.notifications.iter().any(|n| n.seq == seq) {
            return Ok(false);
        }
        inner.reads.insert((seq, recipient.to_string()));
        Ok(true)
    }

    async fn latest_seq(&self) -> Result<i64> {
        // Highest committed seq, like MAX(seq) — a burned seq is invisible.
        let inner = self.inner.lock().unwrap();
        Ok(inner.notifications.last().map(|n| n.seq).unwrap_or(0))
    }
}
