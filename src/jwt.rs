//! JWT token generation and validation.
//!
//! Access and refresh tokens share one claim shape but are signed with
//! distinct secrets, so a token of one kind never validates as the other.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived, sent as a bearer credential on every request
    Access,
    /// Long-lived, only accepted by the rotation endpoint
    Refresh,
}

/// JWT claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// E-mail address of the subject
    pub email: String,
    /// Token version of the credential record at issue time
    #[serde(rename = "tv")]
    pub token_version: i64,
    /// Unique token identifier
    pub jti: String,
    /// Token type
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Identity a token pair is issued for.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_uuid: &'a str,
    pub email: &'a str,
    pub token_version: i64,
}

/// Default access token lifetime: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Default CSRF cookie lifetime: 24 hours
pub const CSRF_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Longest configurable lifetime for any token or cookie: 10 years
pub const MAX_TOKEN_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Lifetimes of the credentials handed out at login and on every rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
    pub csrf_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_secs: REFRESH_TOKEN_DURATION_SECS,
            csrf_secs: CSRF_TOKEN_DURATION_SECS,
        }
    }
}

/// A signed token together with its timing information.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signing keys for one token kind.
#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Issues and validates access and refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    /// Create an issuer with one secret per token kind.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self {
            access: KeyPair::new(access_secret),
            refresh: KeyPair::new(refresh_secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Generate a short-lived access token.
    pub fn issue_access_token(&self, subject: TokenSubject<'_>) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenKind::Access, now()?)
    }

    /// Generate a long-lived refresh token.
    pub fn issue_refresh_token(&self, subject: TokenSubject<'_>) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenKind::Refresh, now()?)
    }

    fn issue(
        &self,
        subject: TokenSubject<'_>,
        kind: TokenKind,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let (keys, duration) = match kind {
            TokenKind::Access => (&self.access, self.lifetimes.access_secs),
            TokenKind::Refresh => (&self.refresh, self.lifetimes.refresh_secs),
        };
        // Expiry is stored as a signed SQLite integer
        let exp = now
            .checked_add(duration)
            .filter(|exp| i64::try_from(*exp).is_ok())
            .ok_or(JwtError::LifetimeOverflow)?;

        let claims = TokenClaims {
            sub: subject.user_uuid.to_string(),
            email: subject.email.to_string(),
            token_version: subject.token_version,
            jti: uuid::Uuid::new_v4().to_string(),
            kind,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token. Needs no database lookup.
    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims, JwtError> {
        decode(token, &self.access, TokenKind::Access)
    }

    /// Validate and decode a refresh token (signature and expiry only).
    pub fn validate_refresh_token(&self, token: &str) -> Result<TokenClaims, JwtError> {
        decode(token, &self.refresh, TokenKind::Refresh)
    }
}

fn decode(token: &str, keys: &KeyPair, expected: TokenKind) -> Result<TokenClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data = jsonwebtoken::decode::<TokenClaims>(token, &keys.decoding, &validation)
        .map_err(JwtError::Decoding)?;

    if token_data.claims.kind != expected {
        return Err(JwtError::WrongTokenType);
    }

    Ok(token_data.claims)
}

fn now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("system time error")]
    TimeError,
    #[error("token lifetime overflows the expiry timestamp")]
    LifetimeOverflow,
    /// Wrong token type (e.g., using a refresh token as an access token)
    #[error("wrong token type")]
    WrongTokenType,
}
