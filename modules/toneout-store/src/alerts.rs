//! Alert repository. The `Active → Responded → Resolved` machine is enforced
//! with conditional updates, so double-responds and double-resolves lose the
//! race and surface the conflicting state instead of overwriting.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use toneout_common::error::Result;
use toneout_common::{Alert, AlertFilter, AlertStatus, DispatchError};

use crate::rows::AlertRow;
use crate::store::PgDispatchStore;

impl PgDispatchStore {
    pub async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts
                (id, kind, unit_id, callsign, department, location, reason,
                 status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(alert.id)
        .bind(alert.kind.as_str())
        .bind(alert.unit_id)
        .bind(&alert.callsign)
        .bind(alert.department.as_str())
        .bind(&alert.location)
        .bind(&alert.reason)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn alert(&self, id: Uuid) -> Result<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(AlertRow::into_alert).transpose()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT * FROM alerts
            WHERE ($1::text IS NULL OR kind = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR department = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.department.map(|d| d.as_str()))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// `Active → Responded`, exactly once.
    pub async fn respond_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let row = sqlx::query_as::<_, AlertRow>(
            r#"
            UPDATE alerts
            SET status = 'responded', responded_at = now(), responded_by = $2
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(by)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_alert(),
            None => Err(self.alert_conflict(id).await?),
        }
    }

    /// `Active|Responded → Resolved`, exactly once. Resolved is terminal.
    pub async fn resolve_alert(&self, id: Uuid, by: &str) -> Result<Alert> {
        let row = sqlx::query_as::<_, AlertRow>(
            r#"
            UPDATE alerts
            SET status = 'resolved', resolved_at = now(), resolved_by = $2
            WHERE id = $1 AND status IN ('active', 'responded')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(by)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_alert(),
            None => Err(self.alert_conflict(id).await?),
        }
    }

    /// Panic alerts still active and created before the cutoff.
    pub async fn stale_panics(&self, created_before: DateTime<Utc>) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT * FROM alerts
            WHERE kind = 'panic' AND status = 'active' AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(created_before)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Stamp the reminder time iff nobody reminded since the threshold.
    /// Returns whether this caller won; losers must not publish a duplicate
    /// reminder. This is what keeps the sweep single-voiced across service
    /// instances.
    pub async fn touch_reminder(&self, id: Uuid, not_since: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET last_reminded_at = now()
            WHERE id = $1
              AND status = 'active'
              AND (last_reminded_at IS NULL OR last_reminded_at < $2)
            "#,
        )
        .bind(id)
        .bind(not_since)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// The precise conflict for a failed conditional alert update.
    async fn alert_conflict(&self, id: Uuid) -> Result<DispatchError> {
        match self.alert(id).await? {
            None => Ok(DispatchError::NotFound {
                kind: "alert",
                id: id.to_string(),
            }),
            Some(alert) => match alert.status {
                AlertStatus::Resolved => Ok(DispatchError::AlreadyResolved { id }),
                _ => Ok(DispatchError::AlreadyResponded { id }),
            },
        }
    }
}
