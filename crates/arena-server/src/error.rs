//! Maps [`ArenaError`] onto the HTTP boundary.
//!
//! Handlers return `Result<Json<T>, ApiError>`; axum converts the error arm
//! into a `{"error": {"kind": ..., "message": ...}}` body with the matching
//! status code, per the error-kind table in the server's contract.

use arena_types::ArenaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Thin wrapper so a foreign type ([`ArenaError`]) can implement
/// [`IntoResponse`] without violating the orphan rule.
pub struct ApiError(pub ArenaError);

impl From<ArenaError> for ApiError {
    fn from(err: ArenaError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            ArenaError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ArenaError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ArenaError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn validation_error_maps_to_400() {
        let response = ApiError(ArenaError::Validation("bad json".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn not_found_error_maps_to_404() {
        let response = ApiError(ArenaError::NotFound("agent-1".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_error_maps_to_500() {
        let response = ApiError(ArenaError::Internal("oops".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
