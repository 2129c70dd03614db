use thiserror::Error;
use uuid::Uuid;

use crate::types::{CallStatus, Department, RejectedUnit, UnitStatus};

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unknown status code \"{code}\" for {department}")]
    UnknownStatusCode { department: Department, code: String },

    #[error("Unit {callsign} has no active call")]
    NoActiveCall { callsign: String },

    #[error("Unit {callsign} is already assigned to call {call_id}")]
    UnitAlreadyAssigned { callsign: String, call_id: Uuid },

    #[error("Unit {callsign} is not available (currently {status})")]
    UnitNotAvailable { callsign: String, status: UnitStatus },

    #[error("No units could be assigned to call {call_id}")]
    NoUnitsAvailable {
        call_id: Uuid,
        rejected: Vec<RejectedUnit>,
    },

    #[error("Callsign {callsign} is already registered for {department}")]
    CallsignTaken {
        department: Department,
        callsign: String,
    },

    #[error("Call {number} is {status}")]
    CallState { number: String, status: CallStatus },

    #[error("Alert {id} was already responded to")]
    AlreadyResponded { id: Uuid },

    #[error("Alert {id} is already resolved")]
    AlreadyResolved { id: Uuid },

    #[error("Concurrent modification of {kind} {id}, retries exhausted")]
    VersionConflict { kind: &'static str, id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispatchError {
    /// Stable snake_case tag for API responses and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::UnknownStatusCode { .. } => "unknown_status_code",
            DispatchError::NoActiveCall { .. } => "no_active_call",
            DispatchError::UnitAlreadyAssigned { .. } => "unit_already_assigned",
            DispatchError::UnitNotAvailable { .. } => "unit_not_available",
            DispatchError::NoUnitsAvailable { .. } => "no_units_available",
            DispatchError::CallsignTaken { .. } => "callsign_taken",
            DispatchError::CallState { .. } => "call_state",
            DispatchError::AlreadyResponded { .. } => "already_responded",
            DispatchError::AlreadyResolved { .. } => "already_resolved",
            DispatchError::VersionConflict { .. } => "version_conflict",
            DispatchError::Database(_) => "database",
            DispatchError::Other(_) => "internal",
        }
    }

    /// State conflicts are recoverable by resynchronizing; they map to 409
    /// rather than 4xx validation or 5xx persistence failures.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownStatusCode { .. }
                | DispatchError::NoActiveCall { .. }
                | DispatchError::UnitAlreadyAssigned { .. }
                | DispatchError::UnitNotAvailable { .. }
                | DispatchError::NoUnitsAvailable { .. }
                | DispatchError::CallsignTaken { .. }
                | DispatchError::CallState { .. }
                | DispatchError::AlreadyResponded { .. }
                | DispatchError::AlreadyResolved { .. }
                | DispatchError::VersionConflict { .. }
        )
    }
}
