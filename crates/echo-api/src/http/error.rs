//! Application error type mapping to HTTP status codes.
//!
//! Every error renders as `{"success": false, "error": ..., "code": ...}`.
//! Internal and provider details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use echo_types::error::{AnalysisError, SessionError};

#[derive(Debug)]
pub enum AppError {
    /// Malformed body or missing field.
    Validation(String),
    /// Unknown session or route.
    NotFound(String),
    /// The analysis provider failed or timed out.
    Provider(String),
    /// Anything else. The message is only logged.
    Internal(String),
}

impl From<AnalysisError> for AppError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Validation(msg) => AppError::Validation(msg),
            AnalysisError::Provider(msg) => AppError::Provider(msg),
            AnalysisError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => AppError::NotFound("Session not found".to_string()),
            SessionError::Validation(msg) => AppError::Validation(msg),
            SessionError::Ended(id) => AppError::Validation(format!("Session '{id}' has ended")),
            SessionError::Store(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Provider(_) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "Analysis service unavailable".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Provider(detail) => tracing::warn!(error = %detail, "Analysis provider error"),
            AppError::Internal(detail) => tracing::error!(error = %detail, "Internal error"),
            _ => {}
        }

        let (status, code, message) = self.parts();
        let body = json!({
            "success": false,
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_types::error::StoreError;

    #[test]
    fn analysis_errors_map_to_status_codes() {
        let cases = [
            (AnalysisError::Validation("text is required".into()), StatusCode::BAD_REQUEST),
            (AnalysisError::Provider("HTTP 503".into()), StatusCode::BAD_GATEWAY),
            (AnalysisError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn session_errors_map_to_status_codes() {
        assert_eq!(
            AppError::from(SessionError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(SessionError::Validation("sessionId is required".into()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SessionError::Store(StoreError::Serialization("x".into())))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let (_, code, message) = AppError::Internal("redis password rejected".into()).parts();
        assert_eq!(code, "INTERNAL_ERROR");
        assert_eq!(message, "Internal server error");
    }
}
