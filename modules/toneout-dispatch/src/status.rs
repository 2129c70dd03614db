//! The unit status state machine.
//!
//! Two entry points — a raw radio code resolved through the department's
//! registry, or a direct canonical status — converge on one version-checked
//! transition that keeps the binding invariant: a unit holds a call iff it is
//! `Enroute`, `OnScene` or `Busy`. The status-log entry commits in the same
//! transaction as the unit row.
//!
//! Post-commit hooks run after the transition is durable: `OnScene` marks the
//! call active, `Panic` raises the alert. A hook failure never rolls back the
//! committed transition; it is logged at error level instead.

use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use toneout_common::{
    codes::StatusCodeRegistry, Alert, DispatchError, Result, StatusLogDraft, Unit, UnitStatus,
};

use crate::escalation::EscalationEngine;
use crate::lifecycle::CallLifecycle;
use crate::traits::DispatchStore;
use crate::MAX_CAS_ATTEMPTS;

pub struct UnitStatusMachine {
    store: Arc<dyn DispatchStore>,
    codes: Arc<StatusCodeRegistry>,
    lifecycle: Arc<CallLifecycle>,
    escalation: Arc<EscalationEngine>,
}

/// A committed transition plus where the unit was before it.
struct Transition {
    unit: Unit,
    prior_status: UnitStatus,
    prior_call: Option<Uuid>,
}

impl UnitStatusMachine {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        codes: Arc<StatusCodeRegistry>,
        lifecycle: Arc<CallLifecycle>,
        escalation: Arc<EscalationEngine>,
    ) -> Self {
        Self {
            store,
            codes,
            lifecycle,
            escalation,
        }
    }

    /// Apply a raw radio code ("10-97", "MAYDAY"). Unknown codes for the
    /// unit's department are rejected outright, never mapped to a default.
    pub async fn report_code(
        &self,
        unit_id: Uuid,
        code: &str,
        notes: Option<String>,
        by: &str,
    ) -> Result<Unit> {
        let unit = self.load(unit_id).await?;
        let resolution = self.codes.resolve(unit.department, code)?;
        self.report(unit_id, resolution.status, Some(resolution.code), notes, by)
            .await
    }

    /// Apply a canonical status directly (console button rather than radio).
    pub async fn report_status(
        &self,
        unit_id: Uuid,
        status: UnitStatus,
        notes: Option<String>,
        by: &str,
    ) -> Result<Unit> {
        self.report(unit_id, status, None, notes, by).await
    }

    /// The explicit panic button. Unlike a code-driven panic, the caller gets
    /// the alert back — and gets the failure if the alert row could not be
    /// persisted (the unit's `Panic` transition stays committed either way).
    pub async fn panic_button(
        &self,
        unit_id: Uuid,
        reason: Option<String>,
        by: &str,
    ) -> Result<Alert> {
        let t = self
            .commit(unit_id, UnitStatus::Panic, None, reason.clone(), by)
            .await?;
        self.escalation
            .trigger_panic(&t.unit, t.prior_status, t.prior_call, reason, by)
            .await
    }

    async fn report(
        &self,
        unit_id: Uuid,
        target: UnitStatus,
        code: Option<String>,
        notes: Option<String>,
        by: &str,
    ) -> Result<Unit> {
        let t = self.commit(unit_id, target, code, notes.clone(), by).await?;
        self.after_commit(&t, notes, by).await;
        Ok(t.unit)
    }

    /// The single transition path: validate against the current unit state,
    /// apply the version-checked mutation with its log entry, retry on a
    /// concurrent writer.
    async fn commit(
        &self,
        unit_id: Uuid,
        target: UnitStatus,
        code: Option<String>,
        notes: Option<String>,
        by: &str,
    ) -> Result<Transition> {
        let mut attempts = 0;
        loop {
            let unit = self.load(unit_id).await?;
            let prior_status = unit.status;
            let prior_call = unit.current_call;

            // Enroute/OnScene/Busy keep an existing binding; they never
            // create one — only the assignment claim does that.
            if target.requires_call() && prior_call.is_none() {
                return Err(DispatchError::NoActiveCall {
                    callsign: unit.callsign,
                });
            }

            let mut next = unit.clone();
            next.status = target;
            if !target.requires_call() {
                next.current_call = None;
            }

            let log = StatusLogDraft {
                code: code.clone(),
                status: target,
                call_id: prior_call,
                notes: notes.clone(),
                issued_by: by.to_string(),
            };

            match self.store.apply_status(&next, unit.version, &log).await {
                Ok(updated) => {
                    return Ok(Transition {
                        unit: updated,
                        prior_status,
                        prior_call,
                    })
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

    async fn after_commit(&self, t: &Transition, notes: Option<String>, by: &str) {
        match t.unit.status {
            UnitStatus::OnScene => {
                if let Some(call_id) = t.prior_call {
                    if let Err(e) = self.lifecycle.mark_active(call_id).await {
                        error!(
                            error = %e,
                            call = %call_id,
                            unit = %t.unit.callsign,
                            "failed to mark call active after on-scene report"
                        );
                    }
                }
            }
            UnitStatus::Panic => {
                if let Err(e) = self
                    .escalation
                    .trigger_panic(&t.unit, t.prior_status, t.prior_call, notes, by)
                    .await
                {
                    error!(
                        error = %e,
                        unit = %t.unit.callsign,
                        "panic alert could not be recorded; unit remains in panic"
                    );
                }
            }
            _ => {}
        }
    }

    async fn load(&self, unit_id: Uuid) -> Result<Unit> {
        self.store
            .unit(unit_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound {
                kind: "unit",
                id: unit_id.to_string(),
            })
    }
}
