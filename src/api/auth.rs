//! Session API endpoints.
//!
//! - POST `/register` - Create an account and open a session
//! - POST `/login` - Check credentials and open a session
//! - POST `/refresh` - Rotate the refresh token (CSRF protected)
//! - POST `/logout` - Revoke every session of the caller (CSRF protected)
//! - GET `/me` - Identity of the bearer

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use super::types::{CredentialsRequest, MeResponse, SessionResponse, SuccessResponse, UserView};
use crate::auth::{Auth, AuthError, CookieSettings, CsrfGuard, REFRESH_COOKIE_NAME, get_cookie};
use crate::db::{Database, NewUser, is_unique_violation};
use crate::impl_has_auth_backend;
use crate::jwt::TokenIssuer;
use crate::password::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, hash_password, verify_login};
use crate::rate_limit::{RateLimitConfig, rate_limit_credentials};
use crate::session::{IssuedSession, RotationOutcome, SessionService};

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub sessions: SessionService,
    pub issuer: Arc<TokenIssuer>,
    pub cookies: CookieSettings,
    pub csrf_header: HeaderName,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state.clone());

    let credentials_router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config,
            rate_limit_credentials,
        ));

    Router::new()
        .merge(session_router)
        .merge(credentials_router)
}

/// Trim and lowercase an e-mail address and check its shape.
fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::bad_request("Email is too long"));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password cannot be longer than {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Set the refresh and CSRF cookies and return the new access token.
fn session_response(state: &AuthState, status: StatusCode, session: IssuedSession) -> Response {
    let refresh_cookie = state
        .cookies
        .refresh_cookie(&session.refresh.token, session.refresh.duration);
    let csrf_cookie = state
        .cookies
        .csrf_cookie(&session.csrf_token, state.issuer.lifetimes().csrf_secs);

    (
        status,
        AppendHeaders([(SET_COOKIE, refresh_cookie), (SET_COOKIE, csrf_cookie)]),
        Json(SessionResponse {
            user: UserView::from(&session.user),
            access_token: session.access.token,
        }),
    )
        .into_response()
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&payload.email)?;
    validate_password(&payload.password)?;

    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if display_name.is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME_LENGTH) {
        return Err(ApiError::bad_request(format!(
            "Display name cannot be longer than {} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }

    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::db_error("Password hashing task failed", e))?
        .map_err(|e| ApiError::db_error("Failed to hash password", e))?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let id = match state
        .db
        .users()
        .create(NewUser {
            uuid: &uuid,
            email: &email,
            display_name,
            password_hash: &password_hash,
        })
        .await
    {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::internal("User vanished after creation"))?;

    let session = state
        .sessions
        .open_session(user)
        .await
        .db_err("Failed to open session")?;

    info!(user_id = id, "User registered");

    Ok(session_response(&state, StatusCode::CREATED, session))
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let email = payload.email.trim().to_lowercase();

    let user = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to look up user")?;

    let password = payload.password;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let valid =
        tokio::task::spawn_blocking(move || verify_login(&password, stored_hash.as_deref()))
            .await
            .map_err(|e| ApiError::db_error("Password verification task failed", e))?
            .map_err(|e| ApiError::db_error("Stored password hash is unreadable", e))?;

    let user = match user {
        Some(user) if valid => user,
        Some(user) => {
            warn!(user_id = user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        None => {
            warn!("Login failed: unknown email");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let user_id = user.id;
    let session = state
        .sessions
        .open_session(user)
        .await
        .db_err("Failed to open session")?;

    info!(user_id, "User logged in");

    Ok(session_response(&state, StatusCode::OK, session))
}

/// Exchange the refresh cookie for a new token pair.
/// The presented refresh token stops working as soon as this succeeds.
async fn refresh(
    State(state): State<AuthState>,
    _csrf: CsrfGuard,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(presented) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        return Err(ApiError::refresh_rejected(
            AuthError::NoSession,
            state.cookies,
        ));
    };

    match state
        .sessions
        .rotate(presented)
        .await
        .db_err("Failed to rotate session")?
    {
        RotationOutcome::Verified(session) => {
            Ok(session_response(&state, StatusCode::OK, *session))
        }
        RotationOutcome::Rejected(reason) => Err(ApiError::refresh_rejected(
            AuthError::from(reason),
            state.cookies,
        )),
    }
}

/// Revoke every session of the caller and clear both cookies.
async fn logout(
    State(state): State<AuthState>,
    Auth(auth): Auth,
    _csrf: CsrfGuard,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_uuid())
        .await
        .db_err("Failed to look up user")?
        .ok_or(AuthError::NotAuthenticated)?;

    state
        .sessions
        .revoke(user.id)
        .await
        .db_err("Failed to revoke sessions")?;

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, state.cookies.clear_refresh_cookie()),
            (SET_COOKIE, state.cookies.clear_csrf_cookie()),
        ]),
        Json(SuccessResponse { success: true }),
    ))
}

async fn me(
    State(state): State<AuthState>,
    Auth(auth): Auth,
) -> Result<Json<MeResponse>, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_uuid())
        .await
        .db_err("Failed to look up user")?
        .ok_or(AuthError::NotAuthenticated)?;

    Ok(Json(MeResponse {
        id: user.uuid,
        email: user.email,
        role: user.role,
    }))
}
