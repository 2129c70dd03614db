use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Police,
    Fire,
    Ems,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Police => "police",
            Department::Fire => "fire",
            Department::Ems => "ems",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Department {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "police" => Ok(Department::Police),
            "fire" => Ok(Department::Fire),
            "ems" => Ok(Department::Ems),
            _ => Err(()),
        }
    }
}

/// Call priority. Declaration order is the escalation order, so
/// `Priority::Low < Priority::Emergency` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Emergency,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "emergency" => Ok(Priority::Emergency),
            _ => Err(()),
        }
    }
}

/// Notification severity. Distinct from call priority: notifications use the
/// alerting scale, calls use the dispatch scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

// --- Call ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Dispatched,
    Active,
    Closed,
    Cancelled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Dispatched => "dispatched",
            CallStatus::Active => "active",
            CallStatus::Closed => "closed",
            CallStatus::Cancelled => "cancelled",
        }
    }

    /// Closed and cancelled calls accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Closed | CallStatus::Cancelled)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(CallStatus::Pending),
            "dispatched" => Ok(CallStatus::Dispatched),
            "active" => Ok(CallStatus::Active),
            "closed" => Ok(CallStatus::Closed),
            "cancelled" => Ok(CallStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// A dispatch incident, tracked from creation to closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: Uuid,
    /// Human call number, `{year}-{six digit sequence}`, unique.
    pub number: String,
    pub call_type: String,
    pub priority: Priority,
    pub status: CallStatus,
    pub location: String,
    pub geo: Option<GeoPoint>,
    pub description: String,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    /// Set when the call closes.
    pub outcome: Option<String>,
    /// Set when the call is cancelled.
    pub cancelled_reason: Option<String>,
    pub opened_by: String,
    /// Every unit ever bound to this call. Units are never removed here;
    /// release clears the unit-side reference only.
    pub assigned_units: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Terminal timestamp for both close and cancel.
    pub closed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by every committed update.
    pub version: i64,
}

/// Format a call number from the per-year sequence: `2026-000042`.
pub fn format_call_number(year: i32, seq: i64) -> String {
    format!("{year}-{seq:06}")
}

// --- Unit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    Enroute,
    OnScene,
    Busy,
    OutOfService,
    Panic,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::Enroute => "enroute",
            UnitStatus::OnScene => "on_scene",
            UnitStatus::Busy => "busy",
            UnitStatus::OutOfService => "out_of_service",
            UnitStatus::Panic => "panic",
        }
    }

    /// States that imply an active call binding. The unit invariant is
    /// `current_call != None` iff the status is one of these.
    pub fn requires_call(&self) -> bool {
        matches!(self, UnitStatus::Enroute | UnitStatus::OnScene | UnitStatus::Busy)
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "available" => Ok(UnitStatus::Available),
            "enroute" | "en_route" => Ok(UnitStatus::Enroute),
            "on_scene" | "onscene" => Ok(UnitStatus::OnScene),
            "busy" => Ok(UnitStatus::Busy),
            "out_of_service" => Ok(UnitStatus::OutOfService),
            "panic" => Ok(UnitStatus::Panic),
            _ => Err(()),
        }
    }
}

/// A field resource (vehicle/crew) with a department and a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    /// Unique per department.
    pub callsign: String,
    pub department: Department,
    pub status: UnitStatus,
    /// Exclusive binding to at most one open call.
    pub current_call: Option<Uuid>,
    pub location: Option<String>,
    /// Officer/member names riding on the unit.
    pub roster: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version, bumped by every committed update.
    pub version: i64,
}

// --- Status Log ---

/// Append-only audit record of a unit status broadcast. Never mutated or
/// deleted; the durable source of truth for what code went out when,
/// independent of the derived `Unit::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub seq: i64,
    pub unit_id: Uuid,
    /// The raw code as broadcast, absent for direct canonical-status requests.
    pub code: Option<String>,
    /// The resolved canonical status.
    pub status: UnitStatus,
    /// The call binding involved in the transition, if any.
    pub call_id: Option<Uuid>,
    pub notes: Option<String>,
    pub issued_by: String,
    pub ts: DateTime<Utc>,
}

// --- Alerts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Panic,
    Backup,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Panic => "panic",
            AlertKind::Backup => "backup",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "panic" => Ok(AlertKind::Panic),
            "backup" => Ok(AlertKind::Backup),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Responded,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Responded => "responded",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "responded" => Ok(AlertStatus::Responded),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(()),
        }
    }
}

/// A panic alert or backup request. `Resolved` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub unit_id: Uuid,
    pub callsign: String,
    pub department: Department,
    pub location: Option<String>,
    pub reason: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    /// Last time the stale sweep reminded dispatchers about this alert.
    pub last_reminded_at: Option<DateTime<Utc>>,
}

/// The log row written atomically with a unit mutation. The store assigns
/// seq/ts on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLogDraft {
    pub code: Option<String>,
    pub status: UnitStatus,
    pub call_id: Option<Uuid>,
    pub notes: Option<String>,
    pub issued_by: String,
}

// --- Assignment ---

/// A unit that failed the assignment check, with the reason and the
/// conflicting state so the caller can resynchronize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedUnit {
    pub unit_id: Uuid,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_call: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UnitStatus>,
}

impl RejectedUnit {
    pub fn not_found(unit_id: Uuid) -> Self {
        Self {
            unit_id,
            reason: "not_found".to_string(),
            current_call: None,
            status: None,
        }
    }

    pub fn already_assigned(unit_id: Uuid, current_call: Uuid) -> Self {
        Self {
            unit_id,
            reason: "already_assigned".to_string(),
            current_call: Some(current_call),
            status: None,
        }
    }

    pub fn not_available(unit_id: Uuid, status: UnitStatus) -> Self {
        Self {
            unit_id,
            reason: "not_available".to_string(),
            current_call: None,
            status: Some(status),
        }
    }
}

// --- Query Filters ---

#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    pub status: Option<CallStatus>,
    pub priority: Option<Priority>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub department: Option<Department>,
    pub status: Option<UnitStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub kind: Option<AlertKind>,
    pub status: Option<AlertStatus>,
    pub department: Option<Department>,
}
