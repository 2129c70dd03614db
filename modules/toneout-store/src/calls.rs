//! Call repository: conditional inserts/updates on the call aggregate plus
//! the per-year number sequence.

use uuid::Uuid;

use toneout_common::error::Result;
use toneout_common::{Call, CallFilter, DispatchError};

use crate::rows::CallRow;
use crate::store::PgDispatchStore;

const DEFAULT_LIST_LIMIT: i64 = 200;

impl PgDispatchStore {
    pub async fn insert_call(&self, call: &Call) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO calls
                (id, number, call_type, priority, status, location, lat, lng,
                 description, caller_name, caller_phone, opened_by,
                 assigned_units, created_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(call.id)
        .bind(&call.number)
        .bind(&call.call_type)
        .bind(call.priority.as_str())
        .bind(call.status.as_str())
        .bind(&call.location)
        .bind(call.geo.map(|g| g.lat))
        .bind(call.geo.map(|g| g.lng))
        .bind(&call.description)
        .bind(&call.caller_name)
        .bind(&call.caller_phone)
        .bind(&call.opened_by)
        .bind(&call.assigned_units)
        .bind(call.created_at)
        .bind(call.version)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn call(&self, id: Uuid) -> Result<Option<Call>> {
        let row = sqlx::query_as::<_, CallRow>("SELECT * FROM calls WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(CallRow::into_call).transpose()
    }

    pub async fn list_calls(&self, filter: &CallFilter) -> Result<Vec<Call>> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT * FROM calls
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR priority = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.priority.map(|p| p.as_str()))
        .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(CallRow::into_call).collect()
    }

    /// Compare-and-swap on the call's version. The caller passes the desired
    /// row state; the update commits only if nobody else bumped the version
    /// since the caller read it.
    pub async fn update_call(&self, call: &Call, expected_version: i64) -> Result<Call> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            UPDATE calls
            SET priority = $3,
                status = $4,
                outcome = $5,
                cancelled_reason = $6,
                assigned_units = $7,
                dispatched_at = $8,
                closed_at = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(call.id)
        .bind(expected_version)
        .bind(call.priority.as_str())
        .bind(call.status.as_str())
        .bind(&call.outcome)
        .bind(&call.cancelled_reason)
        .bind(&call.assigned_units)
        .bind(call.dispatched_at)
        .bind(call.closed_at)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => row.into_call(),
            None => {
                // Distinguish a missing call from a lost CAS race.
                if self.call(call.id).await?.is_none() {
                    Err(DispatchError::NotFound {
                        kind: "call",
                        id: call.id.to_string(),
                    })
                } else {
                    Err(DispatchError::VersionConflict {
                        kind: "call",
                        id: call.id,
                    })
                }
            }
        }
    }

    /// Next value of the durable per-year call-number sequence. The upsert
    /// is atomic, so concurrent creators never see the same number.
    pub async fn next_call_number(&self, year: i32) -> Result<i64> {
        let seq = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO call_numbers (year, last_seq)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_seq = call_numbers.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(year)
        .fetch_one(self.pool())
        .await?;

        Ok(seq)
    }
}
