//! Dispatch events — every state change the escalation layer can react to.
//!
//! An event is emitted after its state change committed; the serialized event
//! becomes the notification payload, so a client can reconstruct what
//! happened without re-fetching.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use toneout_common::{Alert, Call, Department, Priority, UnitStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    // -----------------------------------------------------------------------
    // Call lifecycle
    // -----------------------------------------------------------------------
    CallOpened {
        call: Call,
    },

    CallClosed {
        call: Call,
    },

    CallCancelled {
        call: Call,
    },

    /// `from` is the pre-raise priority; the call carries the new one.
    PriorityRaised {
        call: Call,
        from: Priority,
    },

    // -----------------------------------------------------------------------
    // Unit emergencies
    // -----------------------------------------------------------------------
    /// The unit already committed its `Panic` transition; the alert row is
    /// persisted. `prior_*` capture where the unit was when it triggered.
    UnitPanic {
        alert: Alert,
        prior_status: UnitStatus,
        prior_call: Option<Uuid>,
        triggered_by: String,
    },

    /// An active panic alert nobody responded to within the stale window.
    PanicStale {
        alert: Alert,
    },

    BackupRequested {
        alert: Alert,
    },

    // -----------------------------------------------------------------------
    // Alert lifecycle
    // -----------------------------------------------------------------------
    AlertResponded {
        alert: Alert,
    },

    AlertResolved {
        alert: Alert,
    },

    // -----------------------------------------------------------------------
    // Externally matched lookouts, routed as-is
    // -----------------------------------------------------------------------
    BoloMatched {
        subject: String,
        detail: Option<String>,
        department: Option<Department>,
        issued_by: String,
    },
}

impl DispatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::CallOpened { .. } => "call_opened",
            DispatchEvent::CallClosed { .. } => "call_closed",
            DispatchEvent::CallCancelled { .. } => "call_cancelled",
            DispatchEvent::PriorityRaised { .. } => "priority_raised",
            DispatchEvent::UnitPanic { .. } => "unit_panic",
            DispatchEvent::PanicStale { .. } => "panic_stale",
            DispatchEvent::BackupRequested { .. } => "backup_requested",
            DispatchEvent::AlertResponded { .. } => "alert_responded",
            DispatchEvent::AlertResolved { .. } => "alert_resolved",
            DispatchEvent::BoloMatched { .. } => "bolo_matched",
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("DispatchEvent serialization should never fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_the_tag() {
        let event = DispatchEvent::BoloMatched {
            subject: "blue sedan".to_string(),
            detail: None,
            department: Some(Department::Police),
            issued_by: "disp-1".to_string(),
        };
        let payload = event.to_payload();
        assert_eq!(payload["type"], "bolo_matched");
        assert_eq!(payload["subject"], "blue sedan");
        assert_eq!(event.event_type(), "bolo_matched");
    }
}
