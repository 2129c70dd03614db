use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use toneout_common::{CallFilter, CallStatus, DispatchError, Priority};
use toneout_dispatch::NewCall;

use crate::error::ApiError;
use crate::rest::{dispatcher, parse_id, parse_param};
use crate::AppState;

// --- Query and body structs ---

#[derive(Deserialize)]
pub struct CallsQuery {
    status: Option<String>,
    priority: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignBody {
    unit_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct CloseBody {
    outcome: String,
}

#[derive(Deserialize)]
pub struct CancelBody {
    reason: String,
}

#[derive(Deserialize)]
pub struct PriorityBody {
    priority: Priority,
}

// --- Handlers ---

pub async fn create_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewCall>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let call = state.core.lifecycle.create_call(body, &by).await?;
    Ok((StatusCode::CREATED, Json(call)))
}

pub async fn list_calls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = CallFilter {
        limit: params.limit,
        ..CallFilter::default()
    };
    if let Some(status) = &params.status {
        filter.status = Some(parse_param::<CallStatus>(status, "call status")?);
    }
    if let Some(priority) = &params.priority {
        filter.priority = Some(parse_param::<Priority>(priority, "priority")?);
    }

    let calls = state.core.store.list_calls(&filter).await?;
    Ok(Json(serde_json::json!({ "calls": calls })))
}

pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "call")?;
    match state.core.store.call(id).await? {
        Some(call) => Ok(Json(call)),
        None => Err(DispatchError::NotFound {
            kind: "call",
            id: id.to_string(),
        }
        .into()),
    }
}

pub async fn assign_units(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "call")?;
    let outcome = state.core.assignment.assign(id, &body.unit_ids, &by).await?;
    Ok(Json(outcome))
}

pub async fn close_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CloseBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "call")?;
    let call = state.core.lifecycle.close_call(id, &body.outcome, &by).await?;
    Ok(Json(call))
}

pub async fn cancel_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "call")?;
    let call = state.core.lifecycle.cancel_call(id, &body.reason, &by).await?;
    Ok(Json(call))
}

pub async fn escalate_priority(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PriorityBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "call")?;
    let call = state
        .core
        .lifecycle
        .escalate_priority(id, body.priority, &by)
        .await?;
    Ok(Json(call))
}
