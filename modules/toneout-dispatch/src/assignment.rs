//! Unit-to-call assignment under races.
//!
//! The per-unit claim is a store-level conditional swap, so two dispatchers
//! grabbing the same unit produce exactly one winner. The call update is a
//! separate version-checked step; if it cannot commit, or the batch dies on a
//! store error partway through, the landed claims are compensated so no unit
//! stays bound to a call that never dispatched.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use toneout_common::{Call, CallStatus, DispatchError, RejectedUnit, Result, Unit};
use toneout_store::ClaimOutcome;

use crate::traits::DispatchStore;
use crate::MAX_CAS_ATTEMPTS;

/// Per-unit result of an assignment request. Partial success is normal:
/// claimed units dispatch, the rest come back with their individual reasons.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub call: Call,
    pub assigned: Vec<Unit>,
    pub rejected: Vec<RejectedUnit>,
}

pub struct AssignmentEngine {
    store: Arc<dyn DispatchStore>,
}

impl AssignmentEngine {
    pub fn new(store: Arc<dyn DispatchStore>) -> Self {
        Self { store }
    }

    /// Bind the requested units to the call. At least one claim must land, or
    /// the whole request fails with the per-unit rejections; a `Pending` call
    /// with a landed claim becomes `Dispatched`.
    pub async fn assign(
        &self,
        call_id: Uuid,
        unit_ids: &[Uuid],
        by: &str,
    ) -> Result<AssignmentOutcome> {
        if unit_ids.is_empty() {
            return Err(DispatchError::Validation(
                "at least one unit id is required".to_string(),
            ));
        }

        let call = self.load(call_id).await?;
        if call.status.is_terminal() {
            return Err(DispatchError::CallState {
                number: call.number,
                status: call.status,
            });
        }

        let mut assigned: Vec<Unit> = Vec::new();
        let mut rejected: Vec<RejectedUnit> = Vec::new();
        let mut seen = HashSet::new();
        for unit_id in unit_ids {
            if !seen.insert(*unit_id) {
                continue;
            }
            match self.store.try_claim(*unit_id, call_id, by).await {
                Ok(ClaimOutcome::Claimed(unit)) => assigned.push(unit),
                Ok(ClaimOutcome::Rejected(rejection)) => {
                    warn!(
                        unit = %rejection.unit_id,
                        reason = %rejection.reason,
                        call = %call.number,
                        "unit claim rejected"
                    );
                    rejected.push(rejection);
                }
                Err(e) => {
                    self.release_claimed(&assigned, call_id, by).await;
                    return Err(e);
                }
            }
        }

        if assigned.is_empty() {
            return Err(DispatchError::NoUnitsAvailable { call_id, rejected });
        }

        let mut attempts = 0;
        let updated = loop {
            let call = match self.load(call_id).await {
                Ok(call) => call,
                Err(e) => {
                    self.release_claimed(&assigned, call_id, by).await;
                    return Err(e);
                }
            };
            if call.status.is_terminal() {
                self.release_claimed(&assigned, call_id, by).await;
                return Err(DispatchError::CallState {
                    number: call.number,
                    status: call.status,
                });
            }

            let mut next = call.clone();
            for unit in &assigned {
                if !next.assigned_units.contains(&unit.id) {
                    next.assigned_units.push(unit.id);
                }
            }
            if next.status == CallStatus::Pending {
                next.status = CallStatus::Dispatched;
                next.dispatched_at = Some(Utc::now());
            }

            match self.store.update_call(&next, call.version).await {
                Ok(updated) => break updated,
                Err(e @ DispatchError::VersionConflict { .. }) => {
                    attempts += 1;
                    if attempts >= MAX_CAS_ATTEMPTS {
                        self.release_claimed(&assigned, call_id, by).await;
                        return Err(e);
                    }
                }
                Err(e) => {
                    self.release_claimed(&assigned, call_id, by).await;
                    return Err(e);
                }
            }
        };

        info!(
            call = %updated.number,
            assigned = assigned.len(),
            rejected = rejected.len(),
            assigned_by = by,
            "units assigned"
        );
        Ok(AssignmentOutcome {
            call: updated,
            assigned,
            rejected,
        })
    }

    /// Detach a unit from a call iff the binding is still in place; a unit
    /// that already went `OutOfService` or moved on is left as it is.
    pub async fn release(&self, unit_id: Uuid, call_id: Uuid, by: &str) -> Result<Option<Unit>> {
        self.store.release(unit_id, call_id, by).await
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

    /// Compensation path: undo landed claims when the rest of the request
    /// cannot finish.
    async fn release_claimed(&self, claimed: &[Unit], call_id: Uuid, by: &str) {
        for unit in claimed {
            if let Err(e) = self.store.release(unit.id, call_id, by).await {
                error!(
                    error = %e,
                    unit = %unit.callsign,
                    call = %call_id,
                    "failed to release unit after aborted assignment"
                );
            }
        }
    }
}
