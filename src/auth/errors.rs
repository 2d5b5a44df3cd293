//! Authentication error taxonomy and its HTTP form.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::session::RejectReason;

/// Every way a caller can fail to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown e-mail or wrong password
    InvalidCredentials,
    /// No bearer token, or the access token failed validation
    NotAuthenticated,
    /// Refresh cookie absent, or the store holds no active session
    NoSession,
    /// Refresh token failed signature or expiry checks
    InvalidRefreshToken,
    /// Refresh token does not match the stored session (reused or stolen)
    SessionMismatch,
    /// Double-submit CSRF check failed
    CsrfMismatch,
    /// Storage or signing failure
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::NotAuthenticated
            | AuthError::NoSession
            | AuthError::InvalidRefreshToken
            | AuthError::SessionMismatch => StatusCode::UNAUTHORIZED,
            AuthError::CsrfMismatch => StatusCode::FORBIDDEN,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, sent as `code` in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::NoSession => "no_session",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::SessionMismatch => "session_mismatch",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::Internal => "internal",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::NotAuthenticated => "Not authenticated",
            AuthError::NoSession => "No active session",
            AuthError::InvalidRefreshToken => "Invalid or expired refresh token",
            AuthError::SessionMismatch => "Session is no longer valid",
            AuthError::CsrfMismatch => "CSRF token mismatch",
            AuthError::Internal => "Internal error",
        }
    }

    /// Whether the client's stored session cookies are dead after this error.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            AuthError::NoSession | AuthError::InvalidRefreshToken | AuthError::SessionMismatch
        )
    }
}

impl From<RejectReason> for AuthError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidRefreshToken => AuthError::InvalidRefreshToken,
            RejectReason::NoSession => AuthError::NoSession,
            RejectReason::SessionMismatch | RejectReason::TokenVersionMismatch => {
                AuthError::SessionMismatch
            }
        }
    }
}

/// JSON body of an authentication failure.
#[derive(Debug, Serialize)]
pub struct AuthErrorBody {
    pub error: &'static str,
    pub code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(AuthErrorBody {
                error: self.message(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::SessionMismatch.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::CsrfMismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_reject_reasons_map_to_taxonomy() {
        assert_eq!(
            AuthError::from(RejectReason::TokenVersionMismatch),
            AuthError::SessionMismatch
        );
        assert_eq!(AuthError::from(RejectReason::NoSession), AuthError::NoSession);
        assert_eq!(
            AuthError::from(RejectReason::InvalidRefreshToken),
            AuthError::InvalidRefreshToken
        );
    }

    #[test]
    fn test_csrf_failure_keeps_session() {
        assert!(!AuthError::CsrfMismatch.ends_session());
        assert!(AuthError::SessionMismatch.ends_session());
    }
}
