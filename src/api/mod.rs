mod auth;
mod error;
pub mod types;

use axum::{Router, http::HeaderName};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::auth::CookieSettings;
use crate::cli::ClientIpHeader;
use crate::db::Database;
use crate::jwt::TokenIssuer;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionService;

pub use auth::AuthState;
pub use error::{ApiError, ResultExt};

/// Everything the auth routes need from the server configuration.
pub struct ApiConfig {
    pub db: Database,
    pub sessions: SessionService,
    pub issuer: Arc<TokenIssuer>,
    pub cookies: CookieSettings,
    pub csrf_header: HeaderName,
    pub ip_header: Option<ClientIpHeader>,
    pub auth_rate_per_minute: u32,
}

/// Create the router for the `/auth` routes.
pub fn create_api_router(config: ApiConfig) -> Router {
    let per_minute = NonZeroU32::new(config.auth_rate_per_minute).unwrap_or(NonZeroU32::MIN);

    let state = AuthState {
        db: config.db,
        sessions: config.sessions,
        issuer: config.issuer,
        cookies: config.cookies,
        csrf_header: config.csrf_header,
        rate_limit_config: Arc::new(RateLimitConfig::new(per_minute, config.ip_header)),
    };

    auth::router(state)
}
