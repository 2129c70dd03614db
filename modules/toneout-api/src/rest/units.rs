use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use toneout_common::{Department, DispatchError, Unit, UnitFilter, UnitStatus};

use crate::error::ApiError;
use crate::rest::{dispatcher, parse_id, parse_param};
use crate::AppState;

// --- Query and body structs ---

#[derive(Deserialize)]
pub struct RegisterBody {
    callsign: String,
    department: Department,
    #[serde(default)]
    roster: Vec<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
pub struct UnitsQuery {
    department: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    status: Option<UnitStatus>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct PanicBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
pub struct BackupBody {
    reason: String,
}

#[derive(Deserialize)]
pub struct LogQuery {
    limit: Option<i64>,
}

// --- Handlers ---

/// Register a unit. New units start out of service until they broadcast
/// themselves available.
pub async fn register_unit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    dispatcher(&headers)?;
    let callsign = body.callsign.trim().to_string();
    if callsign.is_empty() {
        return Err(ApiError::validation("a callsign is required"));
    }

    let now = Utc::now();
    let unit = Unit {
        id: Uuid::new_v4(),
        callsign,
        department: body.department,
        status: UnitStatus::OutOfService,
        current_call: None,
        location: body.location,
        roster: body.roster,
        created_at: now,
        updated_at: now,
        version: 1,
    };
    state.core.store.insert_unit(&unit).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

pub async fn list_units(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UnitsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = UnitFilter::default();
    if let Some(department) = &params.department {
        filter.department = Some(parse_param::<Department>(department, "department")?);
    }
    if let Some(status) = &params.status {
        filter.status = Some(parse_param::<UnitStatus>(status, "unit status")?);
    }

    let units = state.core.store.list_units(&filter).await?;
    Ok(Json(serde_json::json!({ "units": units })))
}

pub async fn get_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "unit")?;
    match state.core.store.unit(id).await? {
        Some(unit) => Ok(Json(unit)),
        None => Err(DispatchError::NotFound {
            kind: "unit",
            id: id.to_string(),
        }
        .into()),
    }
}

/// Status broadcast: either a department radio `code` or a canonical
/// `status`, never both.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "unit")?;

    let unit = match (body.code, body.status) {
        (Some(code), None) => {
            state
                .core
                .status
                .report_code(id, &code, body.notes, &by)
                .await?
        }
        (None, Some(status)) => {
            state
                .core
                .status
                .report_status(id, status, body.notes, &by)
                .await?
        }
        (Some(_), Some(_)) => {
            return Err(ApiError::validation(
                "provide either a code or a status, not both",
            ))
        }
        (None, None) => return Err(ApiError::validation("a code or a status is required")),
    };
    Ok(Json(unit))
}

/// The unit's broadcast history, newest first.
pub async fn unit_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "unit")?;
    if state.core.store.unit(id).await?.is_none() {
        return Err(DispatchError::NotFound {
            kind: "unit",
            id: id.to_string(),
        }
        .into());
    }

    let limit = params.limit.unwrap_or(50).min(200);
    let log = state.core.store.status_log(id, limit).await?;
    Ok(Json(serde_json::json!({ "log": log })))
}

/// The panic button. The body is optional; nobody types a reason while
/// pressing it.
pub async fn panic_button(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<PanicBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "unit")?;
    let reason = body.and_then(|Json(b)| b.reason);
    let alert = state.core.status.panic_button(id, reason, &by).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn request_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<BackupBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "unit")?;
    let alert = state
        .core
        .escalation
        .request_backup(id, &body.reason, &by)
        .await?;
    Ok((StatusCode::CREATED, Json(alert)))
}
