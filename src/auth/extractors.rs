//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::cookie::{CSRF_COOKIE_NAME, get_cookie};
use super::csrf::check_double_submit;
use super::errors::AuthError;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Pull the bearer credential out of the Authorization header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for endpoints that require a valid access token.
///
/// Validation is stateless: signature and expiry only, no store lookup.
/// An expired or forged token yields 401 so the client can rotate.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::NotAuthenticated)?;

        let claims = state.issuer().validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            AuthError::NotAuthenticated
        })?;

        Ok(Auth(AuthenticatedUser { claims }))
    }
}

/// Extractor enforcing the double-submit CSRF check on state-changing routes.
pub struct CsrfGuard;

impl<S> FromRequestParts<S> for CsrfGuard
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(state.csrf_header())
            .and_then(|v| v.to_str().ok());
        let cookie_value = get_cookie(&parts.headers, CSRF_COOKIE_NAME);

        check_double_submit(header_value, cookie_value).map_err(|rejection| {
            tracing::warn!(?rejection, path = %parts.uri.path(), "CSRF check failed");
            AuthError::CsrfMismatch
        })?;

        Ok(CsrfGuard)
    }
}
