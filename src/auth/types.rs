//! Authentication user types.

use crate::jwt::TokenClaims;

/// Caller identity taken from a validated access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Claims from the access token
    pub claims: TokenClaims,
}

impl AuthenticatedUser {
    /// User UUID the token was issued for.
    pub fn user_uuid(&self) -> &str {
        &self.claims.sub
    }
}
