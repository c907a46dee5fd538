// src/error.rs
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Database(sqlx::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Validation(String),
    InvalidState(String),
    Internal(String),
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", "Database error occurred".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!(%msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error".to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, "invalid_state", msg),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

/// True for storage-level failures worth another attempt: serialization
/// failures (40001) and deadlocks (40P01). Business errors are never transient.
pub fn is_transient_conflict(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db_err)) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_not_transient() {
        assert!(!is_transient_conflict(&AppError::invalid_state("Sale already paid")));
        assert!(!is_transient_conflict(&AppError::validation("Quantity must be at least 1")));
        assert!(!is_transient_conflict(&AppError::Database(sqlx::Error::RowNotFound)));
    }
}
