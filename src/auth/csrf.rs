//! Double-submit CSRF protection.
//!
//! The server hands out a random token in a readable cookie; state-changing
//! requests must echo it in a header. Nothing is stored server side.

use base64::Engine;
use subtle::ConstantTimeEq;

/// Default header the CSRF token is re-submitted in.
pub const DEFAULT_CSRF_HEADER: &str = "x-csrf-token";

const CSRF_TOKEN_BYTES: usize = 32;

/// Generate a fresh random CSRF token (base64url, no padding).
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Why a double-submit check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    MissingHeader,
    MissingCookie,
    Mismatch,
}

/// Compare the submitted header against the cookie.
///
/// Both must be present, non-empty and byte-for-byte equal.
pub fn check_double_submit(
    header_value: Option<&str>,
    cookie_value: Option<&str>,
) -> Result<(), CsrfRejection> {
    let header_value = header_value
        .filter(|v| !v.is_empty())
        .ok_or(CsrfRejection::MissingHeader)?;
    let cookie_value = cookie_value
        .filter(|v| !v.is_empty())
        .ok_or(CsrfRejection::MissingCookie)?;

    if bool::from(header_value.as_bytes().ct_eq(cookie_value.as_bytes())) {
        Ok(())
    } else {
        Err(CsrfRejection::Mismatch)
    }
}
