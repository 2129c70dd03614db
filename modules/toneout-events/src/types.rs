//! Core types for the notification ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use toneout_common::{Department, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Call,
    Panic,
    Backup,
    Bolo,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Call => "call",
            NotificationKind::Panic => "panic",
            NotificationKind::Backup => "backup",
            NotificationKind::Bolo => "bolo",
            NotificationKind::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "call" => Ok(NotificationKind::Call),
            "panic" => Ok(NotificationKind::Panic),
            "backup" => Ok(NotificationKind::Backup),
            "bolo" => Ok(NotificationKind::Bolo),
            "system" => Ok(NotificationKind::System),
            _ => Err(()),
        }
    }
}

/// A notification as stored in Postgres. Returned by all read methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    /// Monotonic cursor assigned by the store.
    pub seq: i64,
    pub id: Uuid,
    pub kind: NotificationKind,
    pub severity: Severity,
    /// `None` = broadcast to every dispatcher; `Some` = scoped to one
    /// department's dispatchers.
    pub department: Option<Department>,
    pub title: String,
    pub payload: serde_json::Value,
    pub call_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A notification to be appended. The caller builds this; the store assigns
/// seq/id/created_at.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub severity: Severity,
    pub department: Option<Department>,
    pub title: String,
    pub payload: serde_json::Value,
    pub call_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            department: None,
            title: title.into(),
            payload: serde_json::Value::Null,
            call_id: None,
            unit_id: None,
            alert_id: None,
        }
    }

    /// Scope delivery to one department instead of broadcasting.
    pub fn scoped_to(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn about_call(mut self, call_id: Uuid) -> Self {
        self.call_id = Some(call_id);
        self
    }

    pub fn about_unit(mut self, unit_id: Uuid) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    pub fn about_alert(mut self, alert_id: Uuid) -> Self {
        self.alert_id = Some(alert_id);
        self
    }
}

/// A stored notification plus one recipient's read mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub notification: StoredNotification,
    pub read: bool,
}
