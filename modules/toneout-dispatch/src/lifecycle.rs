//! Call lifecycle: `Pending → Dispatched → Active → Closed`, with
//! `Cancelled` reachable while nobody is on scene.
//!
//! Every mutation is a version-checked update with a bounded reload-and-retry;
//! terminal transitions release still-bound units first, so no unit stays
//! attached to a finished call.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use toneout_common::{
    format_call_number, Call, CallStatus, DispatchError, GeoPoint, Priority, Result,
};

use crate::escalation::EscalationEngine;
use crate::events::DispatchEvent;
use crate::traits::DispatchStore;
use crate::MAX_CAS_ATTEMPTS;

/// What a dispatcher supplies to open a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCall {
    #[serde(alias = "type")]
    pub call_type: String,
    pub priority: Priority,
    pub location: String,
    #[serde(default)]
    pub geo: Option<GeoPoint>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub caller_phone: Option<String>,
}

pub struct CallLifecycle {
    store: Arc<dyn DispatchStore>,
    escalation: Arc<EscalationEngine>,
}

impl CallLifecycle {
    pub fn new(store: Arc<dyn DispatchStore>, escalation: Arc<EscalationEngine>) -> Self {
        Self { store, escalation }
    }

    /// Open a call in `Pending` with the next number in this year's sequence.
    pub async fn create_call(&self, new: NewCall, by: &str) -> Result<Call> {
        let call_type = new.call_type.trim().to_uppercase();
        if call_type.is_empty() {
            return Err(DispatchError::Validation(
                "a call type is required".to_string(),
            ));
        }
        let location = new.location.trim().to_string();
        if location.is_empty() {
            return Err(DispatchError::Validation(
                "a location is required".to_string(),
            ));
        }

        let now = Utc::now();
        let year = now.year();
        let seq = self.store.next_call_number(year).await?;

        let call = Call {
            id: Uuid::new_v4(),
            number: format_call_number(year, seq),
            call_type,
            priority: new.priority,
            status: CallStatus::Pending,
            location,
            geo: new.geo,
            description: new.description.unwrap_or_default(),
            caller_name: new.caller_name,
            caller_phone: new.caller_phone,
            outcome: None,
            cancelled_reason: None,
            opened_by: by.to_string(),
            assigned_units: Vec::new(),
            created_at: now,
            dispatched_at: None,
            closed_at: None,
            version: 1,
        };
        self.store.insert_call(&call).await?;
        info!(
            call = %call.number,
            call_type = %call.call_type,
            priority = %call.priority,
            opened_by = by,
            "call opened"
        );

        self.escalation
            .route_logged(&DispatchEvent::CallOpened { call: call.clone() })
            .await;
        Ok(call)
    }

    /// A unit arrived: `Dispatched → Active`. Already-active calls are a
    /// no-op. An arrival can outrun the assignment's own call update, so a
    /// still-`Pending` call is re-read a few times before the report is
    /// logged and ignored; terminal calls are logged and ignored outright,
    /// since the unit's own transition has already committed.
    pub async fn mark_active(&self, call_id: Uuid) -> Result<()> {
        let mut attempts = 0;
        loop {
            let call = self.load(call_id).await?;
            match call.status {
                CallStatus::Active => return Ok(()),
                CallStatus::Dispatched => {}
                CallStatus::Pending if attempts < MAX_CAS_ATTEMPTS => {
                    attempts += 1;
                    continue;
                }
                status => {
                    warn!(
                        call = %call.number,
                        status = %status,
                        "on-scene report for a call not awaiting arrival"
                    );
                    return Ok(());
                }
            }

            let mut next = call.clone();
            next.status = CallStatus::Active;
            match self.store.update_call(&next, call.version).await {
                Ok(updated) => {
                    info!(call = %updated.number, "call active");
                    return Ok(());
                }
                Err(e @ DispatchError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts >= MAX_CAS_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Close from `Dispatched` or `Active`. Bound units are released before
    /// the terminal update; the outcome is the disposition of record.
    pub async fn close_call(&self, call_id: Uuid, outcome: &str, by: &str) -> Result<Call> {
        let outcome = outcome.trim();
        if outcome.is_empty() {
            return Err(DispatchError::Validation(
                "an outcome is required to close a call".to_string(),
            ));
        }

        let mut attempts = 0;
        loop {
            let call = self.load(call_id).await?;
            match call.status {
                CallStatus::Dispatched | CallStatus::Active => {}
                status => {
                    return Err(DispatchError::CallState {
                        number: call.number,
                        status,
                    })
                }
            }

            self.release_bound(&call, by).await?;

            let mut next = call.clone();
            next.status = CallStatus::Closed;
            next.outcome = Some(outcome.to_string());
            next.closed_at = Some(Utc::now());
            match self.store.update_call(&next, call.version).await {
                Ok(updated) => {
                    info!(call = %updated.number, outcome, closed_by = by, "call closed");
                    self.escalation
                        .route_logged(&DispatchEvent::CallClosed {
                            call: updated.clone(),
                        })
                        .await;
                    return Ok(updated);
                }
                Err(e @ DispatchError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts >= MAX_CAS_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancel from `Pending` or `Dispatched` — once anyone is on scene the
    /// call must be closed with an outcome instead.
    pub async fn cancel_call(&self, call_id: Uuid, reason: &str, by: &str) -> Result<Call> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DispatchError::Validation(
                "a reason is required to cancel a call".to_string(),
            ));
        }

        let mut attempts = 0;
        loop {
            let call = self.load(call_id).await?;
            match call.status {
                CallStatus::Pending | CallStatus::Dispatched => {}
                status => {
                    return Err(DispatchError::CallState {
                        number: call.number,
                        status,
                    })
                }
            }

            self.release_bound(&call, by).await?;

            let mut next = call.clone();
            next.status = CallStatus::Cancelled;
            next.cancelled_reason = Some(reason.to_string());
            next.closed_at = Some(Utc::now());
            match self.store.update_call(&next, call.version).await {
                Ok(updated) => {
                    info!(call = %updated.number, reason, cancelled_by = by, "call cancelled");
                    self.escalation
                        .route_logged(&DispatchEvent::CallCancelled {
                            call: updated.clone(),
                        })
                        .await;
                    return Ok(updated);
                }
                Err(e @ DispatchError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts >= MAX_CAS_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Raise the priority in place. Lowering is rejected; raising to
    /// `Emergency` additionally broadcasts.
    pub async fn escalate_priority(&self, call_id: Uuid, to: Priority, by: &str) -> Result<Call> {
        let mut attempts = 0;
        loop {
            let call = self.load(call_id).await?;
            if call.status.is_terminal() {
                return Err(DispatchError::CallState {
                    number: call.number,
                    status: call.status,
                });
            }
            let from = call.priority;
            if to <= from {
                return Err(DispatchError::Validation(format!(
                    "priority can only be raised ({to} is not above {from})"
                )));
            }

            let mut next = call.clone();
            next.priority = to;
            match self.store.update_call(&next, call.version).await {
                Ok(updated) => {
                    info!(call = %updated.number, %from, %to, raised_by = by, "priority raised");
                    self.escalation
                        .route_logged(&DispatchEvent::PriorityRaised {
                            call: updated.clone(),
                            from,
                        })
                        .await;
                    return Ok(updated);
                }
                Err(e @ DispatchError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts >= MAX_CAS_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load(&self, call_id: Uuid) -> Result<Call> {
        self.store
            .call(call_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound {
                kind: "call",
                id: call_id.to_string(),
            })
    }

    /// Release every unit still bound to the call. The store release is
    /// conditional on the binding, so units already elsewhere are untouched
    /// and retries are no-ops.
    async fn release_bound(&self, call: &Call, by: &str) -> Result<()> {
        for unit_id in &call.assigned_units {
            self.store.release(*unit_id, call.id, by).await?;
        }
        Ok(())
    }
}
