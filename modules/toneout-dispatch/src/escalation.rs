//! Emergency escalation: which state changes must reach which dispatchers.
//!
//! The routing table is the pure function [`drafts_for`]; everything else is
//! the machinery to persist alert rows and push the drafts through the hub.
//! Alert rows and notifications are deliberately decoupled: once an alert row
//! is persisted, a failing publish is logged and the operation still
//! succeeds, so the emergency record is never lost to a delivery problem.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use toneout_common::{
    Alert, AlertKind, AlertStatus, Department, DispatchError, Priority, Result, Severity, Unit,
    UnitStatus,
};
use toneout_events::{NotificationDraft, NotificationKind, StoredNotification};

use crate::events::DispatchEvent;
use crate::hub::NotificationHub;
use crate::traits::DispatchStore;

pub struct EscalationEngine {
    store: Arc<dyn DispatchStore>,
    hub: Arc<NotificationHub>,
}

impl EscalationEngine {
    pub fn new(store: Arc<dyn DispatchStore>, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    /// Publish every notification the event calls for.
    pub async fn route(&self, event: &DispatchEvent) -> Result<Vec<StoredNotification>> {
        let mut stored = Vec::new();
        for draft in drafts_for(event) {
            stored.push(self.hub.publish(draft).await?);
        }
        Ok(stored)
    }

    /// Route an event whose state change already committed: a publish failure
    /// must not fail the operation, only leave an error in the log.
    pub async fn route_logged(&self, event: &DispatchEvent) {
        if let Err(e) = self.route(event).await {
            error!(
                error = %e,
                event = event.event_type(),
                "notification publish failed after state change committed"
            );
        }
    }

    /// Record a panic alert for a unit that just committed its `Panic`
    /// transition. Every trigger creates one new active alert, re-triggers
    /// included. The alert insert is the one failure the caller must see;
    /// the broadcast after it is best-effort.
    pub async fn trigger_panic(
        &self,
        unit: &Unit,
        prior_status: UnitStatus,
        prior_call: Option<Uuid>,
        reason: Option<String>,
        by: &str,
    ) -> Result<Alert> {
        let alert = new_alert(AlertKind::Panic, unit, reason);
        self.store.insert_alert(&alert).await?;
        info!(
            unit = %unit.callsign,
            department = %unit.department,
            alert = %alert.id,
            "panic alert raised"
        );

        self.route_logged(&DispatchEvent::UnitPanic {
            alert: alert.clone(),
            prior_status,
            prior_call,
            triggered_by: by.to_string(),
        })
        .await;
        Ok(alert)
    }

    /// Backup request: an alert without a unit state change. The reason is
    /// required; "send backup" with no context is not actionable.
    pub async fn request_backup(&self, unit_id: Uuid, reason: &str, by: &str) -> Result<Alert> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DispatchError::Validation(
                "a reason is required to request backup".to_string(),
            ));
        }
        let unit = self.store.unit(unit_id).await?.ok_or_else(|| {
            DispatchError::NotFound {
                kind: "unit",
                id: unit_id.to_string(),
            }
        })?;

        let alert = new_alert(AlertKind::Backup, &unit, Some(reason.to_string()));
        self.store.insert_alert(&alert).await?;
        info!(
            unit = %unit.callsign,
            department = %unit.department,
            alert = %alert.id,
            requested_by = by,
            "backup requested"
        );

        self.route_logged(&DispatchEvent::BackupRequested {
            alert: alert.clone(),
        })
        .await;
        Ok(alert)
    }

    /// `Active → Responded`. The store rejects anything else with the
    /// conflicting current state.
    pub async fn respond_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let alert = self.store.respond_alert(id, by).await?;
        self.route_logged(&DispatchEvent::AlertResponded {
            alert: alert.clone(),
        })
        .await;
        Ok(alert)
    }

    /// `Active | Responded → Resolved`, exactly once.
    pub async fn resolve_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let alert = self.store.resolve_alert(id, by).await?;
        self.route_logged(&DispatchEvent::AlertResolved {
            alert: alert.clone(),
        })
        .await;
        Ok(alert)
    }

    /// Route a pre-formed BOLO match. Nothing is persisted beyond the
    /// notification itself, so here a publish failure is the caller's.
    pub async fn route_bolo(
        &self,
        subject: &str,
        detail: Option<String>,
        department: Option<Department>,
        by: &str,
    ) -> Result<StoredNotification> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(DispatchError::Validation(
                "a BOLO subject is required".to_string(),
            ));
        }
        let event = DispatchEvent::BoloMatched {
            subject: subject.to_string(),
            detail,
            department,
            issued_by: by.to_string(),
        };
        let mut stored = self.route(&event).await?;
        stored
            .pop()
            .ok_or_else(|| anyhow::anyhow!("BOLO event routed to no notification").into())
    }
}

fn new_alert(kind: AlertKind, unit: &Unit, reason: Option<String>) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        kind,
        unit_id: unit.id,
        callsign: unit.callsign.clone(),
        department: unit.department,
        location: unit.location.clone(),
        reason,
        status: AlertStatus::Active,
        created_at: Utc::now(),
        responded_at: None,
        responded_by: None,
        resolved_at: None,
        resolved_by: None,
        last_reminded_at: None,
    }
}

// ---------------------------------------------------------------------------
// Routing table
// ---------------------------------------------------------------------------

/// The notification drafts an event fans out to. Pure: same event, same
/// drafts. `department: None` on a draft means every dispatcher sees it.
pub fn drafts_for(event: &DispatchEvent) -> Vec<NotificationDraft> {
    match event {
        DispatchEvent::CallOpened { call } => {
            let severity = match call.priority {
                Priority::Emergency => Severity::High,
                Priority::High => Severity::Medium,
                _ => Severity::Low,
            };
            vec![NotificationDraft::new(
                NotificationKind::Call,
                severity,
                format!("New call {}: {}", call.number, call.call_type),
            )
            .about_call(call.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::CallClosed { call } => {
            vec![NotificationDraft::new(
                NotificationKind::Call,
                Severity::Low,
                format!("Call {} closed", call.number),
            )
            .about_call(call.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::CallCancelled { call } => {
            vec![NotificationDraft::new(
                NotificationKind::Call,
                Severity::Low,
                format!("Call {} cancelled", call.number),
            )
            .about_call(call.id)
            .with_payload(event.to_payload())]
        }

        // Only crossing the emergency threshold is broadcast-worthy; smaller
        // raises stay on the call record.
        DispatchEvent::PriorityRaised { call, from } => {
            if call.priority == Priority::Emergency && *from < Priority::Emergency {
                vec![NotificationDraft::new(
                    NotificationKind::Call,
                    Severity::High,
                    format!("Call {} escalated to EMERGENCY", call.number),
                )
                .about_call(call.id)
                .with_payload(event.to_payload())]
            } else {
                Vec::new()
            }
        }

        DispatchEvent::UnitPanic { alert, .. } => {
            vec![NotificationDraft::new(
                NotificationKind::Panic,
                Severity::Critical,
                format!("PANIC: {} ({})", alert.callsign, alert.department),
            )
            .about_unit(alert.unit_id)
            .about_alert(alert.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::PanicStale { alert } => {
            vec![NotificationDraft::new(
                NotificationKind::Panic,
                Severity::Critical,
                format!("PANIC unanswered: {} ({})", alert.callsign, alert.department),
            )
            .about_unit(alert.unit_id)
            .about_alert(alert.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::BackupRequested { alert } => {
            vec![NotificationDraft::new(
                NotificationKind::Backup,
                Severity::High,
                format!("Backup requested: {}", alert.callsign),
            )
            .scoped_to(alert.department)
            .about_unit(alert.unit_id)
            .about_alert(alert.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::AlertResponded { alert } => {
            vec![NotificationDraft::new(
                kind_of(alert),
                Severity::Low,
                format!("Alert responded: {}", alert.callsign),
            )
            .scoped_to(alert.department)
            .about_unit(alert.unit_id)
            .about_alert(alert.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::AlertResolved { alert } => {
            vec![NotificationDraft::new(
                kind_of(alert),
                Severity::Low,
                format!("Alert resolved: {}", alert.callsign),
            )
            .scoped_to(alert.department)
            .about_unit(alert.unit_id)
            .about_alert(alert.id)
            .with_payload(event.to_payload())]
        }

        DispatchEvent::BoloMatched {
            subject, department, ..
        } => {
            let mut draft = NotificationDraft::new(
                NotificationKind::Bolo,
                Severity::High,
                format!("BOLO: {subject}"),
            )
            .with_payload(event.to_payload());
            if let Some(department) = department {
                draft = draft.scoped_to(*department);
            }
            vec![draft]
        }
    }
}

fn kind_of(alert: &Alert) -> NotificationKind {
    match alert.kind {
        AlertKind::Panic => NotificationKind::Panic,
        AlertKind::Backup => NotificationKind::Backup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use toneout_common::{Call, CallStatus};

    fn call(priority: Priority) -> Call {
        Call {
            id: Uuid::new_v4(),
            number: "2026-000001".to_string(),
            call_type: "ROBBERY".to_string(),
            priority,
            status: CallStatus::Pending,
            location: "Main St".to_string(),
            geo: None,
            description: String::new(),
            caller_name: None,
            caller_phone: None,
            outcome: None,
            cancelled_reason: None,
            opened_by: "disp-1".to_string(),
            assigned_units: Vec::new(),
            created_at: Utc::now(),
            dispatched_at: None,
            closed_at: None,
            version: 1,
        }
    }

    fn alert(kind: AlertKind, department: Department) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            kind,
            unit_id: Uuid::new_v4(),
            callsign: "A-12".to_string(),
            department,
            location: None,
            reason: None,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            responded_at: None,
            responded_by: None,
            resolved_at: None,
            resolved_by: None,
            last_reminded_at: None,
        }
    }

    #[test]
    fn panic_is_a_critical_broadcast() {
        let drafts = drafts_for(&DispatchEvent::UnitPanic {
            alert: alert(AlertKind::Panic, Department::Police),
            prior_status: UnitStatus::OnScene,
            prior_call: Some(Uuid::new_v4()),
            triggered_by: "A-12".to_string(),
        });
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::Critical);
        assert_eq!(drafts[0].kind, NotificationKind::Panic);
        assert_eq!(drafts[0].department, None);
    }

    #[test]
    fn backup_is_scoped_to_the_department() {
        let drafts = drafts_for(&DispatchEvent::BackupRequested {
            alert: alert(AlertKind::Backup, Department::Fire),
        });
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::High);
        assert_eq!(drafts[0].department, Some(Department::Fire));
    }

    #[test]
    fn only_the_emergency_threshold_broadcasts_a_raise() {
        let below = drafts_for(&DispatchEvent::PriorityRaised {
            call: call(Priority::High),
            from: Priority::Medium,
        });
        assert!(below.is_empty());

        let crossing = drafts_for(&DispatchEvent::PriorityRaised {
            call: call(Priority::Emergency),
            from: Priority::High,
        });
        assert_eq!(crossing.len(), 1);
        assert_eq!(crossing[0].severity, Severity::High);
    }

    #[test]
    fn call_opened_severity_follows_priority() {
        let emergency = drafts_for(&DispatchEvent::CallOpened {
            call: call(Priority::Emergency),
        });
        assert_eq!(emergency[0].severity, Severity::High);

        let high = drafts_for(&DispatchEvent::CallOpened {
            call: call(Priority::High),
        });
        assert_eq!(high[0].severity, Severity::Medium);

        let routine = drafts_for(&DispatchEvent::CallOpened {
            call: call(Priority::Low),
        });
        assert_eq!(routine[0].severity, Severity::Low);
    }

    #[test]
    fn resolution_notice_keeps_the_alert_kind() {
        let drafts = drafts_for(&DispatchEvent::AlertResolved {
            alert: alert(AlertKind::Panic, Department::Ems),
        });
        assert_eq!(drafts[0].kind, NotificationKind::Panic);
        assert_eq!(drafts[0].severity, Severity::Low);
        assert_eq!(drafts[0].department, Some(Department::Ems));
    }
}
