//! Engine integration tests over the in-memory store: call lifecycle, unit
//! state machine, assignment races, escalation policy, sweep, cursor feed.

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use toneout_common::codes::StatusCodeRegistry;
use toneout_common::{
    Alert, AlertKind, AlertStatus, Call, CallStatus, Department, DispatchError, Priority, Severity,
    Unit, UnitFilter, UnitStatus,
};
use toneout_dispatch::{
    DispatchCore, DispatchStore, MemoryStore, NewCall, NotificationLedger, PanicWatch,
};
use toneout_events::NotificationKind;

struct Rig {
    store: Arc<MemoryStore>,
    core: DispatchCore,
}

fn rig() -> Rig {
    let store = Arc::new(MemoryStore::new());
    let codes = Arc::new(StatusCodeRegistry::default_table());
    let core = DispatchCore::new(store.clone(), store.clone(), codes);
    Rig { store, core }
}

async fn open_call(rig: &Rig, priority: Priority) -> Call {
    rig.core
        .lifecycle
        .create_call(
            NewCall {
                call_type: "robbery".to_string(),
                priority,
                location: "Main St".to_string(),
                geo: None,
                description: None,
                caller_name: None,
                caller_phone: None,
            },
            "disp-1",
        )
        .await
        .unwrap()
}

async fn register(rig: &Rig, department: Department, callsign: &str, status: UnitStatus) -> Unit {
    let now = Utc::now();
    let unit = Unit {
        id: Uuid::new_v4(),
        callsign: callsign.to_string(),
        department,
        status,
        current_call: None,
        location: None,
        roster: vec!["J. Doe".to_string()],
        created_at: now,
        updated_at: now,
        version: 1,
    };
    rig.store.insert_unit(&unit).await.unwrap();
    unit
}

/// A unit holds a call iff it is Enroute, OnScene or Busy — checked over the
/// whole roster after the interesting operations.
async fn assert_binding_invariant(store: &MemoryStore) {
    let units = store.list_units(&UnitFilter::default()).await.unwrap();
    for unit in units {
        assert_eq!(
            unit.current_call.is_some(),
            unit.status.requires_call(),
            "binding invariant violated for {} ({})",
            unit.callsign,
            unit.status
        );
    }
}

fn old_panic_alert(unit: &Unit, age_secs: i64) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        kind: AlertKind::Panic,
        unit_id: unit.id,
        callsign: unit.callsign.clone(),
        department: unit.department,
        location: None,
        reason: None,
        status: AlertStatus::Active,
        created_at: Utc::now() - Duration::seconds(age_secs),
        responded_at: None,
        responded_by: None,
        resolved_at: None,
        resolved_by: None,
        last_reminded_at: None,
    }
}

// =========================================================================
// End to end
// =========================================================================

#[tokio::test]
async fn robbery_call_runs_end_to_end() {
    let rig = rig();

    let call = open_call(&rig, Priority::High).await;
    assert_eq!(call.status, CallStatus::Pending);
    assert_eq!(call.call_type, "ROBBERY");
    assert!(call.number.ends_with("-000001"));

    let a = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;
    let b = register(&rig, Department::Police, "A-13", UnitStatus::Available).await;

    let outcome = rig
        .core
        .assignment
        .assign(call.id, &[a.id, b.id], "disp-1")
        .await
        .unwrap();
    assert_eq!(outcome.assigned.len(), 2);
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.call.status, CallStatus::Dispatched);
    assert!(outcome.call.dispatched_at.is_some());
    assert_binding_invariant(&rig.store).await;

    // First unit arrives via its radio code; the call goes active.
    let arrived = rig
        .core
        .status
        .report_code(a.id, "10-97", None, "A-12")
        .await
        .unwrap();
    assert_eq!(arrived.status, UnitStatus::OnScene);
    assert_eq!(arrived.current_call, Some(call.id));
    let active = rig.store.call(call.id).await.unwrap().unwrap();
    assert_eq!(active.status, CallStatus::Active);

    let closed = rig
        .core
        .lifecycle
        .close_call(call.id, "ARRESTED", "disp-1")
        .await
        .unwrap();
    assert_eq!(closed.status, CallStatus::Closed);
    assert_eq!(closed.outcome.as_deref(), Some("ARRESTED"));
    assert!(closed.closed_at.is_some());
    // The assignment record is history; closing never shrinks it.
    assert_eq!(closed.assigned_units.len(), 2);

    for id in [a.id, b.id] {
        let unit = rig.store.unit(id).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Available);
        assert_eq!(unit.current_call, None);
    }
    assert_binding_invariant(&rig.store).await;

    // Unit A's audit trail: claimed, arrived, released.
    let log = rig.store.log_for(a.id);
    let statuses: Vec<UnitStatus> = log.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![UnitStatus::Enroute, UnitStatus::OnScene, UnitStatus::Available]
    );
    assert_eq!(log[1].code.as_deref(), Some("10-97"));
    assert_eq!(log[1].call_id, Some(call.id));

    // Opened then closed, in cursor order.
    let feed = rig.store.notifications();
    assert_eq!(feed.len(), 2);
    assert!(feed[0].title.starts_with("New call"));
    assert_eq!(feed[0].severity, Severity::Medium);
    assert!(feed[1].title.ends_with("closed"));
}

#[tokio::test]
async fn call_numbers_are_sequential_within_the_year() {
    let rig = rig();
    let year_prefix = format!("{}-", Utc::now().year());

    let first = open_call(&rig, Priority::Low).await;
    let second = open_call(&rig, Priority::Low).await;
    let third = open_call(&rig, Priority::Low).await;

    assert!(first.number.starts_with(&year_prefix));
    assert!(first.number.ends_with("-000001"));
    assert!(second.number.ends_with("-000002"));
    assert!(third.number.ends_with("-000003"));
}

// =========================================================================
// Assignment
// =========================================================================

#[tokio::test]
async fn assignment_reports_partial_success_per_unit() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;
    let other = open_call(&rig, Priority::Low).await;

    let free = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    let off_duty = register(&rig, Department::Police, "A-2", UnitStatus::OutOfService).await;
    let engaged = register(&rig, Department::Police, "A-3", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(other.id, &[engaged.id], "disp-2")
        .await
        .unwrap();
    let ghost = Uuid::new_v4();

    let outcome = rig
        .core
        .assignment
        .assign(call.id, &[free.id, off_duty.id, engaged.id, ghost], "disp-1")
        .await
        .unwrap();

    assert_eq!(outcome.assigned.len(), 1);
    assert_eq!(outcome.assigned[0].id, free.id);
    assert_eq!(outcome.call.status, CallStatus::Dispatched);
    assert_eq!(outcome.call.assigned_units, vec![free.id]);

    assert_eq!(outcome.rejected.len(), 3);
    let by_unit = |id: Uuid| outcome.rejected.iter().find(|r| r.unit_id == id).unwrap();
    assert_eq!(by_unit(off_duty.id).reason, "not_available");
    assert_eq!(by_unit(off_duty.id).status, Some(UnitStatus::OutOfService));
    assert_eq!(by_unit(engaged.id).reason, "already_assigned");
    assert_eq!(by_unit(engaged.id).current_call, Some(other.id));
    assert_eq!(by_unit(ghost).reason, "not_found");

    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn assignment_with_no_claims_leaves_the_call_untouched() {
    let rig = rig();
    let call = open_call(&rig, Priority::High).await;
    let off_duty = register(&rig, Department::Police, "A-2", UnitStatus::OutOfService).await;

    let err = rig
        .core
        .assignment
        .assign(call.id, &[off_duty.id], "disp-1")
        .await
        .unwrap_err();
    match err {
        DispatchError::NoUnitsAvailable { call_id, rejected } => {
            assert_eq!(call_id, call.id);
            assert_eq!(rejected.len(), 1);
            assert_eq!(rejected[0].reason, "not_available");
        }
        other => panic!("expected NoUnitsAvailable, got {other:?}"),
    }

    let untouched = rig.store.call(call.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, CallStatus::Pending);
    assert_eq!(untouched.version, 1);
    assert!(untouched.assigned_units.is_empty());
    assert!(untouched.dispatched_at.is_none());
}

#[tokio::test]
async fn assignment_rejects_terminal_calls_and_empty_requests() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;
    let unit = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;

    let err = rig
        .core
        .assignment
        .assign(call.id, &[], "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    rig.core
        .lifecycle
        .cancel_call(call.id, "duplicate entry", "disp-1")
        .await
        .unwrap();
    let err = rig
        .core
        .assignment
        .assign(call.id, &[unit.id], "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::CallState {
            status: CallStatus::Cancelled,
            ..
        }
    ));

    // The claim was never attempted against a cancelled call.
    let unit_now = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unit_now.status, UnitStatus::Available);
    assert_eq!(unit_now.current_call, None);
}

#[tokio::test]
async fn concurrent_assignment_has_exactly_one_winner() {
    let rig = rig();
    let call1 = open_call(&rig, Priority::High).await;
    let call2 = open_call(&rig, Priority::High).await;
    let unit = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;

    let e1 = rig.core.assignment.clone();
    let e2 = rig.core.assignment.clone();
    let (unit_id, first, second) = (unit.id, call1.id, call2.id);
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.assign(first, &[unit_id], "disp-1").await }),
        tokio::spawn(async move { e2.assign(second, &[unit_id], "disp-2").await }),
    );
    let r1 = r1.unwrap();
    let r2 = r2.unwrap();

    assert_eq!(
        r1.is_ok() as usize + r2.is_ok() as usize,
        1,
        "exactly one assignment must win"
    );
    let loser = if r1.is_ok() { r2 } else { r1 };
    match loser.unwrap_err() {
        DispatchError::NoUnitsAvailable { rejected, .. } => {
            assert_eq!(rejected[0].reason, "already_assigned");
        }
        other => panic!("loser should see the conflicting claim, got {other:?}"),
    }

    let unit_now = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unit_now.status, UnitStatus::Enroute);
    let bound_to = unit_now.current_call.unwrap();
    assert!(bound_to == call1.id || bound_to == call2.id);

    // The winning call is dispatched and holds the unit; the other is untouched.
    let c1 = rig.store.call(call1.id).await.unwrap().unwrap();
    let c2 = rig.store.call(call2.id).await.unwrap().unwrap();
    let (winner, loser_call) = if bound_to == call1.id { (c1, c2) } else { (c2, c1) };
    assert_eq!(winner.status, CallStatus::Dispatched);
    assert_eq!(winner.assigned_units, vec![unit.id]);
    assert_eq!(loser_call.status, CallStatus::Pending);
    assert!(loser_call.assigned_units.is_empty());
    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn claim_failure_mid_batch_releases_the_landed_claims() {
    let rig = rig();
    let call = open_call(&rig, Priority::High).await;
    let a = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    let b = register(&rig, Department::Police, "A-2", UnitStatus::Available).await;

    // The first claim lands, then the store starts erroring.
    rig.store.fail_claims_after(1);
    let err = rig
        .core
        .assignment
        .assign(call.id, &[a.id, b.id], "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Other(_)));

    // The landed claim was compensated: no unit stays bound to a call that
    // never dispatched.
    let a_now = rig.store.unit(a.id).await.unwrap().unwrap();
    assert_eq!(a_now.status, UnitStatus::Available);
    assert_eq!(a_now.current_call, None);

    let untouched = rig.store.call(call.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, CallStatus::Pending);
    assert!(untouched.assigned_units.is_empty());
    assert!(untouched.dispatched_at.is_none());

    // Claim and compensating release are both on the record.
    let log = rig.store.log_for(a.id);
    let statuses: Vec<UnitStatus> = log.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![UnitStatus::Enroute, UnitStatus::Available]);
    assert_eq!(log[1].call_id, Some(call.id));
    assert!(rig.store.log_for(b.id).is_empty());
    assert_binding_invariant(&rig.store).await;
}

// =========================================================================
// Unit status machine
// =========================================================================

#[tokio::test]
async fn unknown_codes_are_rejected_per_department() {
    let rig = rig();
    let unit = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;

    let err = rig
        .core
        .status
        .report_code(unit.id, "10-99", None, "A-12")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownStatusCode { .. }));

    // A fire-service code means nothing on a police unit.
    let err = rig
        .core
        .status
        .report_code(unit.id, "MAYDAY", None, "A-12")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownStatusCode { .. }));

    let unchanged = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, UnitStatus::Available);
    assert_eq!(unchanged.version, 1);
    assert!(rig.store.log_for(unit.id).is_empty());
}

#[tokio::test]
async fn bound_statuses_require_a_held_call() {
    let rig = rig();
    let unit = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;

    for target in [UnitStatus::Enroute, UnitStatus::OnScene, UnitStatus::Busy] {
        let err = rig
            .core
            .status
            .report_status(unit.id, target, None, "A-12")
            .await
            .unwrap_err();
        assert!(
            matches!(err, DispatchError::NoActiveCall { .. }),
            "{target} without a call must be rejected"
        );
    }
    assert!(rig.store.log_for(unit.id).is_empty());
}

#[tokio::test]
async fn going_available_releases_the_binding_but_not_the_record() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;
    let unit = register(&rig, Department::Ems, "M-7", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(call.id, &[unit.id], "disp-1")
        .await
        .unwrap();

    let cleared = rig
        .core
        .status
        .report_code(unit.id, "10-8", None, "M-7")
        .await
        .unwrap();
    assert_eq!(cleared.status, UnitStatus::Available);
    assert_eq!(cleared.current_call, None);

    // The call keeps the historical assignment and stays dispatched.
    let call_now = rig.store.call(call.id).await.unwrap().unwrap();
    assert_eq!(call_now.assigned_units, vec![unit.id]);
    assert_eq!(call_now.status, CallStatus::Dispatched);

    let log = rig.store.log_for(unit.id);
    assert_eq!(log.last().unwrap().status, UnitStatus::Available);
    assert_eq!(log.last().unwrap().call_id, Some(call.id));
    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn busy_keeps_the_binding() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;
    let unit = register(&rig, Department::Ems, "M-7", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(call.id, &[unit.id], "disp-1")
        .await
        .unwrap();

    let busy = rig
        .core
        .status
        .report_code(unit.id, "TRANSPORTING", None, "M-7")
        .await
        .unwrap();
    assert_eq!(busy.status, UnitStatus::Busy);
    assert_eq!(busy.current_call, Some(call.id));
    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn arrival_outrunning_the_assignment_still_activates_the_call() {
    let rig = rig();
    let call = open_call(&rig, Priority::High).await;
    let unit = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;

    // The claim has landed but the assignment's call update has not: the
    // call is still pending when the arrival comes in, and the update lands
    // one read later.
    rig.store
        .try_claim(unit.id, call.id, "disp-1")
        .await
        .unwrap();
    rig.store.dispatch_after_reads(call.id, &[unit.id], 1);

    let arrived = rig
        .core
        .status
        .report_code(unit.id, "10-97", None, "A-12")
        .await
        .unwrap();
    assert_eq!(arrived.status, UnitStatus::OnScene);
    assert_eq!(arrived.current_call, Some(call.id));

    let call_now = rig.store.call(call.id).await.unwrap().unwrap();
    assert_eq!(call_now.status, CallStatus::Active);
    assert!(call_now.dispatched_at.is_some());
    assert_eq!(call_now.assigned_units, vec![unit.id]);
    assert_binding_invariant(&rig.store).await;
}

// =========================================================================
// Panic
// =========================================================================

#[tokio::test]
async fn panic_always_lands_and_clears_the_binding() {
    let rig = rig();

    // From an unbound state, via the radio code.
    let idle = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    let panicked = rig
        .core
        .status
        .report_code(idle.id, "10-33", None, "A-1")
        .await
        .unwrap();
    assert_eq!(panicked.status, UnitStatus::Panic);
    assert_eq!(panicked.current_call, None);
    assert_eq!(rig.store.alerts_for(idle.id).len(), 1);

    // From off shift, via the direct status.
    let off = register(&rig, Department::Police, "A-2", UnitStatus::OutOfService).await;
    rig.core
        .status
        .report_status(off.id, UnitStatus::Panic, None, "A-2")
        .await
        .unwrap();
    assert_eq!(rig.store.alerts_for(off.id).len(), 1);

    // From on scene, with a held call: the binding is cleared but captured.
    let call = open_call(&rig, Priority::High).await;
    let engaged = register(&rig, Department::Police, "A-3", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(call.id, &[engaged.id], "disp-1")
        .await
        .unwrap();
    rig.core
        .status
        .report_code(engaged.id, "10-97", None, "A-3")
        .await
        .unwrap();
    let panicked = rig
        .core
        .status
        .report_code(engaged.id, "10-33", None, "A-3")
        .await
        .unwrap();
    assert_eq!(panicked.status, UnitStatus::Panic);
    assert_eq!(panicked.current_call, None);

    let log = rig.store.log_for(engaged.id);
    let last = log.last().unwrap();
    assert_eq!(last.status, UnitStatus::Panic);
    assert_eq!(last.call_id, Some(call.id));

    // The broadcast is critical, unscoped, and carries the prior binding.
    let feed = rig.store.notifications();
    let panic_note = feed
        .iter()
        .rfind(|n| n.kind == NotificationKind::Panic)
        .unwrap();
    assert_eq!(panic_note.severity, Severity::Critical);
    assert_eq!(panic_note.department, None);
    assert_eq!(panic_note.payload["type"], "unit_panic");
    assert_eq!(panic_note.payload["prior_status"], "on_scene");
    assert_eq!(
        panic_note.payload["prior_call"],
        serde_json::json!(call.id)
    );

    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn panic_retrigger_creates_a_new_alert_each_time() {
    let rig = rig();
    let unit = register(&rig, Department::Fire, "E-7", UnitStatus::Available).await;

    let first = rig
        .core
        .status
        .panic_button(unit.id, Some("trapped".to_string()), "E-7")
        .await
        .unwrap();
    assert_eq!(first.status, AlertStatus::Active);
    assert_eq!(first.kind, AlertKind::Panic);
    assert_eq!(first.reason.as_deref(), Some("trapped"));

    // Re-triggering from Panic is not an error and raises a fresh alert.
    let second = rig
        .core
        .status
        .panic_button(unit.id, None, "E-7")
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(rig.store.alerts_for(unit.id).len(), 2);

    let criticals = rig
        .store
        .notifications()
        .iter()
        .filter(|n| n.severity == Severity::Critical)
        .count();
    assert_eq!(criticals, 2);
}

#[tokio::test]
async fn panic_transition_survives_a_failed_alert_insert() {
    let rig = rig();
    let unit = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;
    rig.store.fail_alert_inserts(true);

    // Code path: the committed transition is reported as success; the alert
    // failure stays in the log.
    let updated = rig
        .core
        .status
        .report_code(unit.id, "10-33", None, "A-12")
        .await
        .unwrap();
    assert_eq!(updated.status, UnitStatus::Panic);
    assert!(rig.store.alerts_for(unit.id).is_empty());

    // Button path: the caller asked for the alert, so the failure surfaces —
    // but the unit stays panicked.
    let err = rig
        .core
        .status
        .panic_button(unit.id, None, "A-12")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Other(_)));
    let unit_now = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unit_now.status, UnitStatus::Panic);
    assert!(rig.store.alerts_for(unit.id).is_empty());
}

#[tokio::test]
async fn publish_failure_after_the_alert_persisted_is_swallowed() {
    let rig = rig();
    let a = register(&rig, Department::Police, "A-12", UnitStatus::Available).await;
    let b = register(&rig, Department::Police, "A-13", UnitStatus::Available).await;
    rig.store.fail_ledger_appends(true);

    let alert = rig
        .core
        .status
        .panic_button(a.id, None, "A-12")
        .await
        .unwrap();
    assert_eq!(alert.status, AlertStatus::Active);

    let backup = rig
        .core
        .escalation
        .request_backup(b.id, "large crowd", "A-13")
        .await
        .unwrap();
    assert_eq!(backup.status, AlertStatus::Active);

    // Both alert rows exist; no notification made it to the ledger.
    assert_eq!(rig.store.alerts_for(a.id).len(), 1);
    assert_eq!(rig.store.alerts_for(b.id).len(), 1);
    assert!(rig.store.notifications().is_empty());
}

// =========================================================================
// Call lifecycle
// =========================================================================

#[tokio::test]
async fn close_releases_only_units_still_bound() {
    let rig = rig();
    let call1 = open_call(&rig, Priority::High).await;
    let call2 = open_call(&rig, Priority::Low).await;

    let a = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    let b = register(&rig, Department::Police, "A-2", UnitStatus::Available).await;
    let c = register(&rig, Department::Police, "A-3", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(call1.id, &[a.id, b.id], "disp-1")
        .await
        .unwrap();
    rig.core
        .assignment
        .assign(call2.id, &[c.id], "disp-1")
        .await
        .unwrap();

    // B leaves the call early and goes off shift.
    rig.core
        .status
        .report_code(b.id, "10-7", None, "A-2")
        .await
        .unwrap();
    rig.core
        .status
        .report_code(a.id, "10-97", None, "A-1")
        .await
        .unwrap();

    rig.core
        .lifecycle
        .close_call(call1.id, "ARRESTED", "disp-1")
        .await
        .unwrap();

    let a_now = rig.store.unit(a.id).await.unwrap().unwrap();
    assert_eq!(a_now.status, UnitStatus::Available);
    assert_eq!(a_now.current_call, None);

    // B's off-shift status wins; the close does not pull it back.
    let b_now = rig.store.unit(b.id).await.unwrap().unwrap();
    assert_eq!(b_now.status, UnitStatus::OutOfService);
    assert_eq!(b_now.current_call, None);

    // C is on an unrelated call and is untouched.
    let c_now = rig.store.unit(c.id).await.unwrap().unwrap();
    assert_eq!(c_now.status, UnitStatus::Enroute);
    assert_eq!(c_now.current_call, Some(call2.id));

    let closed = rig.store.call(call1.id).await.unwrap().unwrap();
    assert_eq!(closed.assigned_units, vec![a.id, b.id]);
    assert_binding_invariant(&rig.store).await;
}

#[tokio::test]
async fn close_requires_an_outcome_and_an_open_state() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;

    let err = rig
        .core
        .lifecycle
        .close_call(call.id, "  ", "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    // Pending calls are cancelled, not closed.
    let err = rig
        .core
        .lifecycle
        .close_call(call.id, "ARRESTED", "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::CallState {
            status: CallStatus::Pending,
            ..
        }
    ));

    let err = rig
        .core
        .lifecycle
        .close_call(Uuid::new_v4(), "ARRESTED", "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { kind: "call", .. }));
}

#[tokio::test]
async fn cancel_is_blocked_once_someone_is_on_scene() {
    let rig = rig();
    let call = open_call(&rig, Priority::High).await;
    let unit = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(call.id, &[unit.id], "disp-1")
        .await
        .unwrap();

    // Cancelling a dispatched call releases its units.
    let cancelled = rig
        .core
        .lifecycle
        .cancel_call(call.id, "caller called back, resolved", "disp-1")
        .await
        .unwrap();
    assert_eq!(cancelled.status, CallStatus::Cancelled);
    assert_eq!(
        cancelled.cancelled_reason.as_deref(),
        Some("caller called back, resolved")
    );
    assert!(cancelled.closed_at.is_some());
    let unit_now = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unit_now.status, UnitStatus::Available);

    // Second cancel is a state conflict.
    let err = rig
        .core
        .lifecycle
        .cancel_call(call.id, "again", "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::CallState { .. }));

    // An active call cannot be cancelled at all.
    let active = open_call(&rig, Priority::High).await;
    let medic = register(&rig, Department::Ems, "M-1", UnitStatus::Available).await;
    rig.core
        .assignment
        .assign(active.id, &[medic.id], "disp-1")
        .await
        .unwrap();
    rig.core
        .status
        .report_code(medic.id, "10-97", None, "M-1")
        .await
        .unwrap();
    let err = rig
        .core
        .lifecycle
        .cancel_call(active.id, "nevermind", "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::CallState {
            status: CallStatus::Active,
            ..
        }
    ));
}

#[tokio::test]
async fn priority_is_raise_only_and_broadcasts_at_emergency() {
    let rig = rig();
    let call = open_call(&rig, Priority::Medium).await;
    let opened_notes = rig.store.notifications().len();

    // A raise below the emergency threshold changes the call quietly.
    let raised = rig
        .core
        .lifecycle
        .escalate_priority(call.id, Priority::High, "disp-1")
        .await
        .unwrap();
    assert_eq!(raised.priority, Priority::High);
    assert_eq!(rig.store.notifications().len(), opened_notes);

    // Crossing the threshold broadcasts.
    let emergency = rig
        .core
        .lifecycle
        .escalate_priority(call.id, Priority::Emergency, "disp-1")
        .await
        .unwrap();
    assert_eq!(emergency.priority, Priority::Emergency);
    let feed = rig.store.notifications();
    assert_eq!(feed.len(), opened_notes + 1);
    let note = feed.last().unwrap();
    assert_eq!(note.severity, Severity::High);
    assert!(note.title.contains("EMERGENCY"));
    assert_eq!(note.department, None);

    // Lowering (or repeating) is rejected.
    for to in [Priority::Low, Priority::Emergency] {
        let err = rig
            .core
            .lifecycle
            .escalate_priority(call.id, to, "disp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }
}

#[tokio::test]
async fn create_call_validates_its_inputs() {
    let rig = rig();

    let err = rig
        .core
        .lifecycle
        .create_call(
            NewCall {
                call_type: "   ".to_string(),
                priority: Priority::Low,
                location: "Main St".to_string(),
                geo: None,
                description: None,
                caller_name: None,
                caller_phone: None,
            },
            "disp-1",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    let err = rig
        .core
        .lifecycle
        .create_call(
            NewCall {
                call_type: "MVA".to_string(),
                priority: Priority::Low,
                location: "".to_string(),
                geo: None,
                description: None,
                caller_name: None,
                caller_phone: None,
            },
            "disp-1",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
}

// =========================================================================
// Backup and alert lifecycle
// =========================================================================

#[tokio::test]
async fn backup_requires_a_reason_and_keeps_the_unit_status() {
    let rig = rig();
    let unit = register(&rig, Department::Fire, "E-1", UnitStatus::Available).await;

    let err = rig
        .core
        .escalation
        .request_backup(unit.id, "  ", "E-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    let alert = rig
        .core
        .escalation
        .request_backup(unit.id, "structure fully involved", "E-1")
        .await
        .unwrap();
    assert_eq!(alert.kind, AlertKind::Backup);
    assert_eq!(alert.status, AlertStatus::Active);

    // Backup is an alert, not a state transition.
    let unchanged = rig.store.unit(unit.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, UnitStatus::Available);

    let note = rig.store.notifications().pop().unwrap();
    assert_eq!(note.kind, NotificationKind::Backup);
    assert_eq!(note.severity, Severity::High);
    assert_eq!(note.department, Some(Department::Fire));

    let err = rig
        .core
        .escalation
        .request_backup(Uuid::new_v4(), "anyone", "E-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { kind: "unit", .. }));
}

#[tokio::test]
async fn alerts_resolve_exactly_once() {
    let rig = rig();
    let unit = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;
    let alert = rig
        .core
        .status
        .panic_button(unit.id, None, "A-1")
        .await
        .unwrap();

    let responded = rig
        .core
        .escalation
        .respond_alert(alert.id, "disp-1")
        .await
        .unwrap();
    assert_eq!(responded.status, AlertStatus::Responded);
    assert_eq!(responded.responded_by.as_deref(), Some("disp-1"));

    let err = rig
        .core
        .escalation
        .respond_alert(alert.id, "disp-2")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyResponded { .. }));

    let resolved = rig
        .core
        .escalation
        .resolve_alert(alert.id, "disp-2")
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    for err in [
        rig.core
            .escalation
            .resolve_alert(alert.id, "disp-3")
            .await
            .unwrap_err(),
        rig.core
            .escalation
            .respond_alert(alert.id, "disp-3")
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, DispatchError::AlreadyResolved { .. }));
    }

    // Panic raise + responded + resolved, all on the panic feed.
    let panic_notes: Vec<_> = rig
        .store
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Panic)
        .collect();
    assert_eq!(panic_notes.len(), 3);
    assert_eq!(panic_notes[1].severity, Severity::Low);
    assert_eq!(panic_notes[1].department, Some(Department::Police));

    // Resolving straight from Active also works (fresh alert).
    let direct = rig
        .core
        .status
        .panic_button(unit.id, None, "A-1")
        .await
        .unwrap();
    let resolved = rig
        .core
        .escalation
        .resolve_alert(direct.id, "disp-1")
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
}

// =========================================================================
// BOLO
// =========================================================================

#[tokio::test]
async fn bolo_routes_as_a_high_notification() {
    let rig = rig();

    let stored = rig
        .core
        .escalation
        .route_bolo(
            "blue sedan heading north on 5th",
            Some("plate ABC-123".to_string()),
            Some(Department::Police),
            "disp-1",
        )
        .await
        .unwrap();
    assert_eq!(stored.kind, NotificationKind::Bolo);
    assert_eq!(stored.severity, Severity::High);
    assert_eq!(stored.department, Some(Department::Police));
    assert_eq!(stored.title, "BOLO: blue sedan heading north on 5th");
    assert_eq!(stored.payload["detail"], "plate ABC-123");

    // Without a department it goes to everyone.
    let broadcast = rig
        .core
        .escalation
        .route_bolo("missing child, red jacket", None, None, "disp-1")
        .await
        .unwrap();
    assert_eq!(broadcast.department, None);

    let err = rig
        .core
        .escalation
        .route_bolo("   ", None, None, "disp-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
}

// =========================================================================
// Stale-panic sweep
// =========================================================================

#[tokio::test]
async fn sweep_reminds_once_per_window_and_never_resolves() {
    let rig = rig();
    let unit = register(&rig, Department::Police, "A-1", UnitStatus::Available).await;

    let stale = old_panic_alert(&unit, 600);
    rig.store.insert_alert(&stale).await.unwrap();
    let fresh = old_panic_alert(&unit, 5);
    rig.store.insert_alert(&fresh).await.unwrap();

    let watch = PanicWatch::new(rig.core.store.clone(), rig.core.escalation.clone(), 120, 30);

    assert_eq!(watch.sweep_once().await.unwrap(), 1);
    let note = rig.store.notifications().pop().unwrap();
    assert_eq!(note.severity, Severity::Critical);
    assert!(note.title.starts_with("PANIC unanswered"));
    assert_eq!(note.alert_id, Some(stale.id));

    // Same window: the reminder already happened.
    assert_eq!(watch.sweep_once().await.unwrap(), 0);

    // The alert is still active; the sweep never closes it out.
    let alert_now = rig.store.alert(stale.id).await.unwrap().unwrap();
    assert_eq!(alert_now.status, AlertStatus::Active);

    // A responded alert is off the stale list.
    rig.core
        .escalation
        .respond_alert(stale.id, "disp-1")
        .await
        .unwrap();
    assert_eq!(watch.sweep_once().await.unwrap(), 0);
}

// =========================================================================
// Notification feed
// =========================================================================

#[tokio::test]
async fn catch_up_is_gap_free_and_per_recipient() {
    let rig = rig();
    open_call(&rig, Priority::Low).await;
    open_call(&rig, Priority::Low).await;
    open_call(&rig, Priority::Low).await;

    let page = rig.core.hub.catch_up("disp-1", 0, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].notification.seq, 1);
    assert_eq!(page[1].notification.seq, 2);
    assert!(!page[0].read);

    assert!(rig.core.hub.mark_read("disp-1", 2).await.unwrap());
    assert!(rig.core.hub.mark_read("disp-1", 2).await.unwrap());
    assert!(!rig.core.hub.mark_read("disp-1", 99).await.unwrap());

    let page = rig.core.hub.catch_up("disp-1", 0, 10).await.unwrap();
    let flags: Vec<bool> = page.iter().map(|e| e.read).collect();
    assert_eq!(flags, vec![false, true, false]);

    // Another recipient's marks are invisible.
    let other = rig.core.hub.catch_up("disp-2", 0, 10).await.unwrap();
    assert!(other.iter().all(|e| !e.read));

    // A hole in the sequence stops the read instead of being skipped.
    rig.store.burn_seq();
    open_call(&rig, Priority::Low).await; // seq 5, behind the hole
    let page = rig.core.hub.catch_up("disp-1", 3, 10).await.unwrap();
    assert!(page.is_empty());
    assert_eq!(rig.store.latest_seq().await.unwrap(), 5);
}

#[tokio::test]
async fn live_subscribers_see_stored_notifications() {
    let rig = rig();
    let mut rx = rig.core.hub.subscribe();

    let call = open_call(&rig, Priority::Emergency).await;

    let pushed = rx.recv().await.unwrap();
    assert_eq!(pushed.seq, 1);
    assert_eq!(pushed.kind, NotificationKind::Call);
    assert_eq!(pushed.severity, Severity::High);
    assert_eq!(pushed.call_id, Some(call.id));
}
