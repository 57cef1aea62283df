//! Error types and handling for the relay.
//!
//! This module provides a unified error type [`AppError`] for every rejection
//! the HTTP boundary can produce. Upstream failures are deliberately absent:
//! they are folded into reply payloads by the upstream client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Detail for a missing or malformed `Authorization` header.
pub const DETAIL_INVALID_HEADER: &str = "Missing or invalid Authorization header";

/// Detail for a well-formed header carrying an unknown token.
pub const DETAIL_INVALID_TOKEN: &str = "Invalid client token";

/// Detail for an origin outside the allow-list.
pub const DETAIL_FORBIDDEN_ORIGIN: &str = "Domain not allowed";

/// Detail for an unknown, deleted, or evicted session handle.
pub const DETAIL_SESSION_NOT_FOUND: &str = "Session not found or expired";

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Missing, malformed, or unknown bearer credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the request origin is not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown session handle
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Session registry is at capacity
    #[error("Session limit reached: at most {0} concurrent sessions")]
    SessionLimit(usize),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short client-facing detail. Internal errors are not echoed back.
    fn detail(&self) -> String {
        match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::SessionLimit(_) => "Too many active sessions".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
