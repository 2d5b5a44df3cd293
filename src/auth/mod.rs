//! Request authentication for the auth routes.
//!
//! Access tokens travel as bearer credentials and are validated statelessly.
//! Refresh tokens live in an HTTP-only cookie scoped to `/auth`, and every
//! state-changing call carries a double-submit CSRF token.

mod cookie;
mod csrf;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    CSRF_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, find_cookie,
    get_cookie,
};
pub use csrf::{CsrfRejection, DEFAULT_CSRF_HEADER, check_double_submit, generate_csrf_token};
pub use errors::{AuthError, AuthErrorBody};
pub use extractors::{Auth, CsrfGuard};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
