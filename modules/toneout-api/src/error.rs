//! HTTP mapping for `DispatchError`.
//!
//! Conflicts carry the conflicting state inline so a console can resync
//! without a second round trip: the call's current status, the unit's current
//! status, the per-unit rejection list.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use toneout_common::DispatchError;

pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(DispatchError::Validation(message.into()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_conflict() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });

        let detail = match &self.0 {
            DispatchError::UnknownStatusCode { department, code } => json!({
                "department": department,
                "code": code,
            }),
            DispatchError::NoActiveCall { callsign } => json!({ "callsign": callsign }),
            DispatchError::UnitAlreadyAssigned { callsign, call_id } => json!({
                "callsign": callsign,
                "call_id": call_id,
            }),
            DispatchError::UnitNotAvailable { callsign, status } => json!({
                "callsign": callsign,
                "status": status,
            }),
            DispatchError::NoUnitsAvailable { call_id, rejected } => json!({
                "call_id": call_id,
                "rejected": rejected,
            }),
            DispatchError::CallsignTaken {
                department,
                callsign,
            } => json!({
                "department": department,
                "callsign": callsign,
            }),
            DispatchError::CallState { number, status } => json!({
                "number": number,
                "status": status,
            }),
            DispatchError::AlreadyResponded { id } | DispatchError::AlreadyResolved { id } => {
                json!({ "id": id })
            }
            DispatchError::VersionConflict { kind, id } => json!({
                "entity": kind,
                "id": id,
            }),
            _ => json!({}),
        };

        if let (Some(body), Some(detail)) = (body.as_object_mut(), detail.as_object()) {
            for (key, value) in detail {
                body.insert(key.clone(), value.clone());
            }
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
