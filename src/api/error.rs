//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::auth::{AuthError, CookieSettings};

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
    /// Authentication failure in the shared taxonomy
    Auth(AuthError),
    /// Refresh rejected; the refresh cookie is cleared alongside the error
    SessionEnded(AuthError, CookieSettings),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Internal("Database error".into())
    }

    /// A refresh rejection. Rejections that leave the client without a usable
    /// session also expire its refresh cookie.
    pub fn refresh_rejected(err: AuthError, cookies: CookieSettings) -> Self {
        if err.ends_session() {
            Self::SessionEnded(err, cookies)
        } else {
            Self::Auth(err)
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "conflict"),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, "internal"),
            ApiError::Auth(err) => return err.into_response(),
            ApiError::SessionEnded(err, cookies) => {
                return (
                    AppendHeaders([(SET_COOKIE, cookies.clear_refresh_cookie())]),
                    err,
                )
                    .into_response();
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}
