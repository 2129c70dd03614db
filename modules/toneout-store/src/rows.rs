// Raw table rows. Enum columns are TEXT; parsing happens on the way out so a
// corrupted row surfaces as a decode error instead of a silent default.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use toneout_common::error::Result;
use toneout_common::{Alert, Call, DispatchError, GeoPoint, StatusLogEntry, Unit};

pub(crate) fn bad_col(column: &str, value: &str) -> DispatchError {
    DispatchError::Database(sqlx::Error::Decode(
        format!("bad {column} value: {value}").into(),
    ))
}

fn parse_col<T: FromStr>(value: &str, column: &str) -> Result<T> {
    value.parse().map_err(|_| bad_col(column, value))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CallRow {
    pub id: Uuid,
    pub number: String,
    pub call_type: String,
    pub priority: String,
    pub status: String,
    pub location: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub description: String,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub outcome: Option<String>,
    pub cancelled_reason: Option<String>,
    pub opened_by: String,
    pub assigned_units: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl CallRow {
    pub(crate) fn into_call(self) -> Result<Call> {
        let geo = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        Ok(Call {
            id: self.id,
            number: self.number,
            call_type: self.call_type,
            priority: parse_col(&self.priority, "priority")?,
            status: parse_col(&self.status, "status")?,
            location: self.location,
            geo,
            description: self.description,
            caller_name: self.caller_name,
            caller_phone: self.caller_phone,
            outcome: self.outcome,
            cancelled_reason: self.cancelled_reason,
            opened_by: self.opened_by,
            assigned_units: self.assigned_units,
            created_at: self.created_at,
            dispatched_at: self.dispatched_at,
            closed_at: self.closed_at,
            version: self.version,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UnitRow {
    pub id: Uuid,
    pub callsign: String,
    pub department: String,
    pub status: String,
    pub current_call: Option<Uuid>,
    pub location: Option<String>,
    pub roster: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl UnitRow {
    pub(crate) fn into_unit(self) -> Result<Unit> {
        Ok(Unit {
            id: self.id,
            callsign: self.callsign,
            department: parse_col(&self.department, "department")?,
            status: parse_col(&self.status, "status")?,
            current_call: self.current_call,
            location: self.location,
            roster: self.roster,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AlertRow {
    pub id: Uuid,
    pub kind: String,
    pub unit_id: Uuid,
    pub callsign: String,
    pub department: String,
    pub location: Option<String>,
    pub reason: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub last_reminded_at: Option<DateTime<Utc>>,
}

impl AlertRow {
    pub(crate) fn into_alert(self) -> Result<Alert> {
        Ok(Alert {
            id: self.id,
            kind: parse_col(&self.kind, "kind")?,
            unit_id: self.unit_id,
            callsign: self.callsign,
            department: parse_col(&self.department, "department")?,
            location: self.location,
            reason: self.reason,
            status: parse_col(&self.status, "status")?,
            created_at: self.created_at,
            responded_at: self.responded_at,
            responded_by: self.responded_by,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
            last_reminded_at: self.last_reminded_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StatusLogRow {
    pub seq: i64,
    pub unit_id: Uuid,
    pub code: Option<String>,
    pub status: String,
    pub call_id: Option<Uuid>,
    pub notes: Option<String>,
    pub issued_by: String,
    pub ts: DateTime<Utc>,
}

impl StatusLogRow {
    pub(crate) fn into_entry(self) -> Result<StatusLogEntry> {
        Ok(StatusLogEntry {
            seq: self.seq,
            unit_id: self.unit_id,
            code: self.code,
            status: parse_col(&self.status, "status")?,
            call_id: self.call_id,
            notes: self.notes,
            issued_by: self.issued_by,
            ts: self.ts,
        })
    }
}
