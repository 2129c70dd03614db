//! NotificationStore — append-only notification ledger backed by Postgres.
//!
//! Gap-free reads are guaranteed internally. Consumers never see BIGSERIAL
//! gaps from rolled-back or in-flight transactions. This is the store's job.

use anyhow::Result;
use sqlx::PgPool;
use std::str::FromStr;

use crate::types::{InboxEntry, NotificationDraft, StoredNotification};

// ---------------------------------------------------------------------------
// NotificationStore
// ---------------------------------------------------------------------------

/// Append-only notification ledger plus the per-recipient read marks.
#[derive(Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a notification and return the stored row (with seq/ts from
    /// Postgres). The seq is the delivery cursor.
    pub async fn append(&self, draft: &NotificationDraft) -> Result<StoredNotification> {
        let stored = sqlx::query_as::<_, StoredNotification>(
            r#"
            INSERT INTO notifications
                (id, kind, severity, department, title, payload, call_id, unit_id, alert_id)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING seq, id, kind, severity, department, title, payload,
                      call_id, unit_id, alert_id, created_at
            "#,
        )
        .bind(draft.kind.as_str())
        .bind(draft.severity.as_str())
        .bind(draft.department.map(|d| d.as_str()))
        .bind(&draft.title)
        .bind(&draft.payload)
        .bind(draft.call_id)
        .bind(draft.unit_id)
        .bind(draft.alert_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Read notifications after cursor `since` (exclusive), in seq order,
    /// with the recipient's read mark on each row.
    ///
    /// **Gap-free guarantee:** if concurrent appends created a momentary gap,
    /// this returns rows only up to the gap boundary. The next call picks up
    /// where it left off once the gap closes. Consumers never see gaps, so a
    /// cursor poll gets no duplicate and no missing notification.
    pub async fn read_from(
        &self,
        recipient: &str,
        since: i64,
        limit: usize,
    ) -> Result<Vec<InboxEntry>> {
        let rows = sqlx::query_as::<_, InboxEntry>(
            r#"
            SELECT n.seq, n.id, n.kind, n.severity, n.department, n.title, n.payload,
                   n.call_id, n.unit_id, n.alert_id, n.created_at,
                   (r.seq IS NOT NULL) AS read
            FROM notifications n
            LEFT JOIN notification_reads r
                   ON r.seq = n.seq AND r.recipient = $2
            WHERE n.seq > $1
            ORDER BY n.seq ASC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(recipient)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Enforce gap-free: stop at the first gap in the sequence.
        let mut result = Vec::with_capacity(rows.len());
        let mut expected_seq = since + 1;

        for row in rows {
            if row.notification.seq != expected_seq {
                // Gap detected — an in-flight append hasn't committed yet.
                // Return what we have so far. Next call will pick up the rest.
                break;
            }
            expected_seq = row.notification.seq + 1;
            result.push(row);
        }

        Ok(result)
    }

    /// Read a single notification by sequence number.
    pub async fn read_one(&self, seq: i64) -> Result<Option<StoredNotification>> {
        let row = sqlx::query_as::<_, StoredNotification>(
            r#"
            SELECT seq, id, kind, severity, department, title, payload,
                   call_id, unit_id, alert_id, created_at
            FROM notifications
            WHERE seq = $1
            "#,
        )
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Mark a notification read for one recipient. Idempotent: marking twice
    /// is fine. Returns false when no such notification exists.
    pub async fn mark_read(&self, recipient: &str, seq: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM notifications WHERE seq = $1)",
        )
        .bind(seq)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO notification_reads (seq, recipient)
            VALUES ($1, $2)
            ON CONFLICT (seq, recipient) DO NOTHING
            "#,
        )
        .bind(seq)
        .bind(recipient)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// The latest committed sequence number, or 0 if the ledger is empty.
    pub async fn latest_seq(&self) -> Result<i64> {
        let row = sqlx::query_as::<_, (Option<i64>,)>("SELECT MAX(seq) FROM notifications")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0.unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// sqlx::FromRow impls — enum columns are TEXT, parsed on the way out
// ---------------------------------------------------------------------------

fn parse_col<T: FromStr>(value: &str, column: &str) -> std::result::Result<T, sqlx::Error> {
    value
        .parse()
        .map_err(|_| sqlx::Error::Decode(format!("bad {column} value: {value}").into()))
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredNotification {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let kind: String = row.try_get("kind")?;
        let severity: String = row.try_get("severity")?;
        let department: Option<String> = row.try_get("department")?;

        Ok(StoredNotification {
            seq: row.try_get("seq")?,
            id: row.try_get("id")?,
            kind: parse_col(&kind, "kind")?,
            severity: parse_col(&severity, "severity")?,
            department: department
                .map(|d| parse_col(&d, "department"))
                .transpose()?,
            title: row.try_get("title")?,
            payload: row.try_get("payload")?,
            call_id: row.try_get("call_id")?,
            unit_id: row.try_get("unit_id")?,
            alert_id: row.try_get("alert_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for InboxEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(InboxEntry {
            notification: StoredNotification::from_row(row)?,
            read: row.try_get("read")?,
        })
    }
}
