//! Wiring: one constructor for the whole engine stack.

use std::sync::Arc;

use toneout_common::codes::StatusCodeRegistry;

use crate::assignment::AssignmentEngine;
use crate::escalation::EscalationEngine;
use crate::hub::NotificationHub;
use crate::lifecycle::CallLifecycle;
use crate::status::UnitStatusMachine;
use crate::traits::{DispatchStore, NotificationLedger};

/// Every engine, wired over one store and one ledger. The API binary builds
/// this once at startup; tests build it over the in-memory store.
#[derive(Clone)]
pub struct DispatchCore {
    pub store: Arc<dyn DispatchStore>,
    pub hub: Arc<NotificationHub>,
    pub escalation: Arc<EscalationEngine>,
    pub lifecycle: Arc<CallLifecycle>,
    pub assignment: Arc<AssignmentEngine>,
    pub status: Arc<UnitStatusMachine>,
}

impl DispatchCore {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        ledger: Arc<dyn NotificationLedger>,
        codes: Arc<StatusCodeRegistry>,
    ) -> Self {
        let hub = Arc::new(NotificationHub::new(ledger));
        let escalation = Arc::new(EscalationEngine::new(store.clone(), hub.clone()));
        let lifecycle = Arc::new(CallLifecycle::new(store.clone(), escalation.clone()));
        let assignment = Arc::new(AssignmentEngine::new(store.clone()));
        let status = Arc::new(UnitStatusMachine::new(
            store.clone(),
            codes,
            lifecycle.clone(),
            escalation.clone(),
        ));
        Self {
            store,
            hub,
            escalation,
            lifecycle,
            assignment,
            status,
        }
    }
}
