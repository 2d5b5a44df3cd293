//! Cookie parsing and `Set-Cookie` construction for session credentials.

use axum::http::header;

/// Cookie name for the refresh token (HTTP-only, scoped to the auth routes).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the CSRF token (readable by client code).
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Path the refresh cookie is scoped to.
pub const REFRESH_COOKIE_PATH: &str = "/auth";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    find_cookie(cookie_header, name)
}

/// Find a cookie value in a raw `Cookie` header value.
pub fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Flags shared by every cookie the server sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieSettings {
    /// Add the `Secure` attribute (HTTPS deployments)
    pub secure: bool,
}

impl CookieSettings {
    fn secure_attr(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }

    /// HTTP-only refresh cookie, only sent to the auth routes.
    pub fn refresh_cookie(&self, token: &str, max_age: u64) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path={}; Max-Age={}{}",
            REFRESH_COOKIE_NAME,
            token,
            REFRESH_COOKIE_PATH,
            max_age,
            self.secure_attr()
        )
    }

    /// CSRF cookie; deliberately not HTTP-only so client code can echo it.
    pub fn csrf_cookie(&self, token: &str, max_age: u64) -> String {
        format!(
            "{}={}; SameSite=Lax; Path=/; Max-Age={}{}",
            CSRF_COOKIE_NAME,
            token,
            max_age,
            self.secure_attr()
        )
    }

    pub fn clear_refresh_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Lax; Path={}; Max-Age=0{}",
            REFRESH_COOKIE_NAME,
            REFRESH_COOKIE_PATH,
            self.secure_attr()
        )
    }

    pub fn clear_csrf_cookie(&self) -> String {
        format!(
            "{}=; SameSite=Lax; Path=/; Max-Age=0{}",
            CSRF_COOKIE_NAME,
            self.secure_attr()
        )
    }
}
