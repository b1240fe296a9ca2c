//! Maps the §7 error taxonomy onto HTTP status codes for the Control API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use sqlcheck_types::error::CoreError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: String,
    message: String,
}

/// A thin wrapper so handlers can return `Result<Json<T>, ApiError>` and get
/// the §7 status-code mapping for free via `IntoResponse`.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            kind: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// §7's taxonomy table, condensed to the subset the Control API surfaces.
fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::FileNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::InvalidTransition(_) => StatusCode::CONFLICT,
        CoreError::FileAccess(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Encoding(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::ArchiveCorrupt(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::ArchiveLimit(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Analyzer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        CoreError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Lock(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::InvalidSqlSkip(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Small helper for handlers that want to reject a malformed request before
/// ever reaching a `CoreError`-returning service call.
pub fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "VALIDATION", "kind": "VALIDATION", "message": message.into() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_for(&CoreError::NotFound("x".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_transition_maps_to_409() {
        assert_eq!(status_for(&CoreError::InvalidTransition("x".into())), StatusCode::CONFLICT);
    }

    #[test]
    fn timeout_maps_to_408() {
        assert_eq!(status_for(&CoreError::Timeout("x".into())), StatusCode::REQUEST_TIMEOUT);
    }
}
