use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use toneout_common::{AlertFilter, AlertKind, AlertStatus, Department, DispatchError};

use crate::error::ApiError;
use crate::rest::{dispatcher, parse_id, parse_param};
use crate::AppState;

#[derive(Deserialize)]
pub struct AlertsQuery {
    kind: Option<String>,
    status: Option<String>,
    department: Option<String>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = AlertFilter::default();
    if let Some(kind) = &params.kind {
        filter.kind = Some(parse_param::<AlertKind>(kind, "alert kind")?);
    }
    if let Some(status) = &params.status {
        filter.status = Some(parse_param::<AlertStatus>(status, "alert status")?);
    }
    if let Some(department) = &params.department {
        filter.department = Some(parse_param::<Department>(department, "department")?);
    }

    let alerts = state.core.store.list_alerts(&filter).await?;
    Ok(Json(serde_json::json!({ "alerts": alerts })))
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "alert")?;
    match state.core.store.alert(id).await? {
        Some(alert) => Ok(Json(alert)),
        None => Err(DispatchError::NotFound {
            kind: "alert",
            id: id.to_string(),
        }
        .into()),
    }
}

pub async fn respond_alert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "alert")?;
    let alert = state.core.escalation.respond_alert(id, &by).await?;
    Ok(Json(alert))
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let id = parse_id(&id, "alert")?;
    let alert = state.core.escalation.resolve_alert(id, &by).await?;
    Ok(Json(alert))
}
