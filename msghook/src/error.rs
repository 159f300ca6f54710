//! API error type.
//!
//! Every handler returns `Result<T, ApiError>`. Client errors carry their
//! message through to the response body; database errors are
//! logged in full and reported to the caller with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// A single rejected field in a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Request validation failure listing every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn with_fields(fields: Vec<FieldError>) -> Self {
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        Self {
            message: format!("invalid fields: {}", names.join(", ")),
            fields,
        }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_fields(vec![FieldError::new(field, message)])
    }
}

/// All errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed or mismatched signature.
    #[error("invalid signature")]
    Authentication,

    /// Body or query parameters failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Authentication => "invalid_signature",
            ApiError::Validation(_) => "validation_error",
            ApiError::Database(_) => "internal_error",
            ApiError::Timeout => "request_timeout",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Authentication => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, fields) = match self {
            ApiError::Authentication => ("invalid signature".to_string(), Vec::new()),
            ApiError::Validation(v) => (v.message, v.fields),
            ApiError::Database(e) => {
                error!(error = %e, "database_error");
                ("internal server error".to_string(), Vec::new())
            }
            ApiError::Timeout => ("request timed out".to_string(), Vec::new()),
        };

        (
            status,
            Json(ErrorBody {
                code,
                message,
                fields,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Authentication.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(ValidationError::single("limit", "bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = ValidationError::with_fields(vec![
            FieldError::new("from", "required"),
            FieldError::new("ts", "required"),
        ]);
        assert_eq!(err.message, "invalid fields: from, ts");
        assert_eq!(ApiError::from(err).code(), "validation_error");
    }

    #[tokio::test]
    async fn test_database_error_response_is_generic() {
        let response = ApiError::from(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"code":"internal_error","message":"internal server error"}"#
        );
    }

    #[tokio::test]
    async fn test_request_timeout_response() {
        let response = ApiError::Timeout.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "request_timeout");
        assert_eq!(json["message"], "request timed out");
    }
}
