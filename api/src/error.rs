//! Error-to-response mapping.
//!
//! Validation and conflict errors surface their message with a 400;
//! missing or foreign resources are a 404 that never distinguishes the
//! two; infrastructure failures log server-side and return the generic
//! internal message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use errors::{ApprovalError, IdentityError, RiskError};

pub struct ApiError {
    pub status: StatusCode,
    pub message: String
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!("internal error: {detail}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match &err {
            IdentityError::NotFound { .. } => ApiError::not_found(err.to_string()),
            IdentityError::Database { reason } => ApiError::internal(reason),
            _ => ApiError::bad_request(err.to_string())
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match &err {
            ApprovalError::NotFound => ApiError::not_found(err.to_string()),
            ApprovalError::Database { reason } => ApiError::internal(reason),
            ApprovalError::Internal => ApiError::internal("approval execution"),
            _ => ApiError::bad_request(err.to_string())
        }
    }
}

impl From<RiskError> for ApiError {
    fn from(err: RiskError) -> Self {
        match &err {
            RiskError::PolicyNotFound { .. } => ApiError::not_found(err.to_string()),
            RiskError::Database { reason } => ApiError::internal(reason),
            RiskError::InvalidPolicy { .. } => ApiError::bad_request(err.to_string())
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err)
    }
}
