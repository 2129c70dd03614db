pub mod alerts;
pub mod calls;
pub mod notifications;
pub mod stream;
pub mod units;

use std::str::FromStr;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the opaque dispatcher identity on mutating requests.
pub const DISPATCHER_HEADER: &str = "x-dispatcher";

/// Pull the dispatcher identity out of the headers. The core records it
/// verbatim; here it only has to be present and non-blank.
pub fn dispatcher(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(DISPATCHER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    if value.is_empty() {
        return Err(ApiError::validation("the X-Dispatcher header is required"));
    }
    Ok(value.to_string())
}

pub fn parse_id(raw: &str, kind: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation(format!("malformed {kind} id: {raw}")))
}

/// Parse a query-string enum value, rejecting unknowns as validation errors
/// instead of axum's opaque 400.
pub fn parse_param<T: FromStr>(value: &str, what: &str) -> Result<T, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::validation(format!("unknown {what}: {value}")))
}
