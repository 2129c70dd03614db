//! Unit repository.
//!
//! The claim/release pair carries the at-most-one-assignment invariant: both
//! are single conditional updates on `current_call`, so exactly one of any
//! set of racing writers wins and the rest observe the conflicting state.
//! Every unit mutation commits its status-log row in the same transaction.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use toneout_common::error::Result;
use toneout_common::{
    DispatchError, RejectedUnit, StatusLogDraft, StatusLogEntry, Unit, UnitFilter, UnitStatus,
};

use crate::rows::{StatusLogRow, UnitRow};
use crate::store::PgDispatchStore;

/// Result of an atomic claim attempt.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(Unit),
    Rejected(RejectedUnit),
}

impl PgDispatchStore {
    pub async fn insert_unit(&self, unit: &Unit) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO units
                (id, callsign, department, status, current_call, location,
                 roster, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(unit.id)
        .bind(&unit.callsign)
        .bind(unit.department.as_str())
        .bind(unit.status.as_str())
        .bind(unit.current_call)
        .bind(&unit.location)
        .bind(&unit.roster)
        .bind(unit.created_at)
        .bind(unit.updated_at)
        .bind(unit.version)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let sqlx::Error::Database(db) = &e {
                    if db.code().as_deref() == Some("23505") {
                        return Err(DispatchError::CallsignTaken {
                            department: unit.department,
                            callsign: unit.callsign.clone(),
                        });
                    }
                }
                Err(e.into())
            }
        }
    }

    pub async fn unit(&self, id: Uuid) -> Result<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>("SELECT * FROM units WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(UnitRow::into_unit).transpose()
    }

    pub async fn list_units(&self, filter: &UnitFilter) -> Result<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>(
            r#"
            SELECT * FROM units
            WHERE ($1::text IS NULL OR department = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY department, callsign
            "#,
        )
        .bind(filter.department.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(UnitRow::into_unit).collect()
    }

    /// Atomically claim an available, unbound unit for a call: swap it to
    /// `enroute` with `current_call` set, and log the transition, in one
    /// transaction. Racing claimers lose the conditional update and get a
    /// rejection naming the conflicting state.
    pub async fn try_claim(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<ClaimOutcome> {
        // Two attempts: a rejection whose loaded state looks claimable means
        // the unit was released between our update and our read, so one
        // retry resolves it.
        for _ in 0..2 {
            let mut tx = self.pool().begin().await?;

            let row = sqlx::query_as::<_, UnitRow>(
                r#"
                UPDATE units
                SET status = 'enroute',
                    current_call = $2,
                    updated_at = now(),
                    version = version + 1
                WHERE id = $1 AND current_call IS NULL AND status = 'available'
                RETURNING *
                "#,
            )
            .bind(unit_id)
            .bind(call_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                let log = StatusLogDraft {
                    code: None,
                    status: UnitStatus::Enroute,
                    call_id: Some(call_id),
                    notes: None,
                    issued_by: issued_by.to_string(),
                };
                insert_log(&mut tx, unit_id, &log).await?;
                tx.commit().await?;
                return Ok(ClaimOutcome::Claimed(row.into_unit()?));
            }
            tx.rollback().await?;

            let Some(unit) = self.unit(unit_id).await? else {
                return Ok(ClaimOutcome::Rejected(RejectedUnit::not_found(unit_id)));
            };
            if let Some(current) = unit.current_call {
                return Ok(ClaimOutcome::Rejected(RejectedUnit::already_assigned(
                    unit_id, current,
                )));
            }
            if unit.status != UnitStatus::Available {
                return Ok(ClaimOutcome::Rejected(RejectedUnit::not_available(
                    unit_id,
                    unit.status,
                )));
            }
        }

        // Still claimable on re-read twice in a row: give up and report the
        // contention; the caller can retry the batch.
        Ok(ClaimOutcome::Rejected(RejectedUnit::not_available(
            unit_id,
            UnitStatus::Available,
        )))
    }

    /// Compare-and-swap a unit's status/binding and append the log entry in
    /// the same transaction.
    pub async fn apply_status(
        &self,
        unit: &Unit,
        expected_version: i64,
        log: &StatusLogDraft,
    ) -> Result<Unit> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, UnitRow>(
            r#"
            UPDATE units
            SET status = $3,
                current_call = $4,
                location = $5,
                updated_at = now(),
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(unit.id)
        .bind(expected_version)
        .bind(unit.status.as_str())
        .bind(unit.current_call)
        .bind(&unit.location)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return if self.unit(unit.id).await?.is_none() {
                Err(DispatchError::NotFound {
                    kind: "unit",
                    id: unit.id.to_string(),
                })
            } else {
                Err(DispatchError::VersionConflict {
                    kind: "unit",
                    id: unit.id,
                })
            };
        };

        insert_log(&mut tx, unit.id, log).await?;
        tx.commit().await?;

        row.into_unit()
    }

    /// Release a unit from a call iff it is still bound to that call. The
    /// released unit becomes available; a unit that concurrently moved on
    /// (out of service, panic, another call) is left alone and `None` is
    /// returned. Releasing never touches `call.assigned_units`.
    pub async fn release(
        &self,
        unit_id: Uuid,
        call_id: Uuid,
        issued_by: &str,
    ) -> Result<Option<Unit>> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query_as::<_, UnitRow>(
            r#"
            UPDATE units
            SET current_call = NULL,
                status = 'available',
                updated_at = now(),
                version = version + 1
            WHERE id = $1 AND current_call = $2
            RETURNING *
            "#,
        )
        .bind(unit_id)
        .bind(call_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let log = StatusLogDraft {
            code: None,
            status: UnitStatus::Available,
            call_id: Some(call_id),
            notes: None,
            issued_by: issued_by.to_string(),
        };
        insert_log(&mut tx, unit_id, &log).await?;
        tx.commit().await?;

        Ok(Some(row.into_unit()?))
    }

    /// Status-log page for a unit, newest first.
    pub async fn status_log(&self, unit_id: Uuid, limit: i64) -> Result<Vec<StatusLogEntry>> {
        let rows = sqlx::query_as::<_, StatusLogRow>(
            r#"
            SELECT * FROM unit_status_log
            WHERE unit_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#,
        )
        .bind(unit_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(StatusLogRow::into_entry).collect()
    }
}

async fn insert_log(
    tx: &mut Transaction<'_, Postgres>,
    unit_id: Uuid,
    log: &StatusLogDraft,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO unit_status_log (unit_id, code, status, call_id, notes, issued_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(unit_id)
    .bind(&log.code)
    .bind(log.status.as_str())
    .bind(log.call_id)
    .bind(&log.notes)
    .bind(&log.issued_by)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
