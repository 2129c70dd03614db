use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use toneout_common::{Department, DispatchError};

use crate::error::ApiError;
use crate::rest::dispatcher;
use crate::AppState;

#[derive(Deserialize)]
pub struct FeedQuery {
    since: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct BoloBody {
    subject: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    department: Option<Department>,
}

/// Cursor catch-up. `next_cursor` is the last seq in the page; feed it back
/// as `since` to continue. The read flags are the calling dispatcher's.
pub async fn notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = dispatcher(&headers)?;
    let since = params.since.unwrap_or(0);
    let limit = params.limit.unwrap_or(50).min(200);

    let entries = state.core.hub.catch_up(&recipient, since, limit).await?;
    let next_cursor = entries
        .last()
        .map(|e| e.notification.seq)
        .unwrap_or(since);
    Ok(Json(serde_json::json!({
        "notifications": entries,
        "next_cursor": next_cursor,
    })))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(seq): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = dispatcher(&headers)?;
    let seq: i64 = seq
        .parse()
        .map_err(|_| ApiError::validation(format!("malformed cursor: {seq}")))?;

    if state.core.hub.mark_read(&recipient, seq).await? {
        Ok(Json(serde_json::json!({ "seq": seq, "read": true })))
    } else {
        Err(DispatchError::NotFound {
            kind: "notification",
            id: seq.to_string(),
        }
        .into())
    }
}

pub async fn route_bolo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BoloBody>,
) -> Result<impl IntoResponse, ApiError> {
    let by = dispatcher(&headers)?;
    let stored = state
        .core
        .escalation
        .route_bolo(&body.subject, body.detail, body.department, &by)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}
