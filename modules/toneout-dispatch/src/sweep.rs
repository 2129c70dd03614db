//! PanicWatch: the stale-panic sweep.
//!
//! An active panic alert nobody responded to within the stale window gets a
//! `Critical` reminder, once per window, no matter how many service instances
//! are sweeping — the conditional `last_reminded_at` touch picks one winner.
//! The sweep never responds to or resolves an alert on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use toneout_common::Result;

use crate::escalation::EscalationEngine;
use crate::events::DispatchEvent;
use crate::traits::DispatchStore;

pub struct PanicWatch {
    store: Arc<dyn DispatchStore>,
    escalation: Arc<EscalationEngine>,
    stale_after: chrono::Duration,
    interval: Duration,
}

impl PanicWatch {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        escalation: Arc<EscalationEngine>,
        stale_after_secs: u64,
        sweep_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            escalation,
            stale_after: chrono::Duration::seconds(stale_after_secs as i64),
            interval: Duration::from_secs(sweep_interval_secs),
        }
    }

    /// Sweep forever. Spawn this once at service start.
    pub async fn run(self) {
        info!(
            stale_after_secs = self.stale_after.num_seconds(),
            sweep_interval_secs = self.interval.as_secs(),
            "panic watch started"
        );
        loop {
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "panic sweep failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One pass: remind every active panic alert older than the stale window
    /// that was not already reminded within it. Returns how many reminders
    /// this instance won.
    pub async fn sweep_once(&self) -> Result<u32> {
        let cutoff = Utc::now() - self.stale_after;
        let stale = self.store.stale_panics(cutoff).await?;

        let mut reminded = 0;
        for alert in stale {
            // The same cutoff gates both staleness and re-reminder cadence:
            // at most one reminder per stale window per alert.
            if self.store.touch_reminder(alert.id, cutoff).await? {
                info!(
                    alert = %alert.id,
                    unit = %alert.callsign,
                    age_secs = (Utc::now() - alert.created_at).num_seconds(),
                    "panic alert unanswered, re-raising"
                );
                self.escalation
                    .route_logged(&DispatchEvent::PanicStale { alert })
                    .await;
                reminded += 1;
            }
        }
        Ok(reminded)
    }
}
