//! Server-side session lifecycle: opening, rotating and revoking sessions.
//!
//! The user record is the only source of truth. A refresh token is accepted
//! only while its digest equals the stored one, and every successful rotation
//! replaces that digest, so each refresh token works exactly once.

mod hash;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::auth::generate_csrf_token;
use crate::db::{Database, User};
use crate::jwt::{IssuedToken, JwtError, TokenIssuer, TokenSubject};

pub use hash::{hash_refresh_token, refresh_token_matches};

/// Credentials handed to the client at login and on every rotation.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The user as stored when the session was issued
    pub user: User,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    /// Fresh double-submit CSRF token
    pub csrf_token: String,
}

/// Why a presented refresh token was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Bad signature, wrong kind, or expired
    InvalidRefreshToken,
    /// Unknown subject, or no live session stored
    NoSession,
    /// Digest differs from the stored one (already rotated, or stolen)
    SessionMismatch,
    /// Digest matched but the token predates a revocation
    TokenVersionMismatch,
}

/// Result of presenting a refresh token.
#[derive(Debug)]
pub enum RotationOutcome {
    Verified(Box<IssuedSession>),
    Rejected(RejectReason),
}

/// Infrastructure failures. Rejections are not errors; see [`RotationOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("token error: {0}")]
    Token(#[from] JwtError),
    #[error("user {0} disappeared while opening a session")]
    UserVanished(i64),
}

/// Opens, rotates and revokes sessions against the credential store.
#[derive(Clone)]
pub struct SessionService {
    db: Database,
    issuer: Arc<TokenIssuer>,
    enforce_token_version: bool,
}

impl SessionService {
    pub fn new(db: Database, issuer: Arc<TokenIssuer>, enforce_token_version: bool) -> Self {
        Self {
            db,
            issuer,
            enforce_token_version,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Issue a token pair for `user` and store the new refresh digest,
    /// replacing whatever session the user had before.
    pub async fn open_session(&self, user: User) -> Result<IssuedSession, SessionError> {
        let (access, refresh) = self.issue_pair(&user)?;

        let stored = self
            .db
            .users()
            .start_session(
                user.id,
                &hash_refresh_token(&refresh.token),
                refresh.expires_at as i64,
            )
            .await?;
        if !stored {
            return Err(SessionError::UserVanished(user.id));
        }

        info!(user_id = user.id, "Session opened");

        Ok(IssuedSession {
            user,
            access,
            refresh,
            csrf_token: generate_csrf_token(),
        })
    }

    /// Validate a presented refresh token and, if it is the current one,
    /// swap in a brand-new pair.
    ///
    /// The swap is conditional on the stored digest being unchanged, so of two
    /// concurrent rotations with the same token exactly one succeeds.
    pub async fn rotate(&self, presented: &str) -> Result<RotationOutcome, SessionError> {
        let claims = match self.issuer.validate_refresh_token(presented) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Refresh token failed validation");
                return Ok(self.reject(None, RejectReason::InvalidRefreshToken));
            }
        };

        let Some(user) = self.db.users().get_by_uuid(&claims.sub).await? else {
            return Ok(self.reject(None, RejectReason::NoSession));
        };

        let Some(stored_hash) = user.refresh_token_hash.clone() else {
            return Ok(self.reject(Some(user.id), RejectReason::NoSession));
        };

        if !refresh_token_matches(presented, &stored_hash) {
            return Ok(self.reject(Some(user.id), RejectReason::SessionMismatch));
        }

        if self.enforce_token_version && claims.token_version != user.token_version {
            return Ok(self.reject(Some(user.id), RejectReason::TokenVersionMismatch));
        }

        let (access, refresh) = self.issue_pair(&user)?;
        let expected_version = self.enforce_token_version.then_some(user.token_version);

        let swapped = self
            .db
            .users()
            .rotate_session(
                user.id,
                &stored_hash,
                expected_version,
                &hash_refresh_token(&refresh.token),
                refresh.expires_at as i64,
            )
            .await?;

        if !swapped {
            // Another rotation or a logout landed between the read and the write
            return Ok(self.reject(Some(user.id), RejectReason::SessionMismatch));
        }

        debug!(user_id = user.id, "Refresh token rotated");

        let mut user = user;
        user.refresh_token_hash = Some(hash_refresh_token(&refresh.token));
        user.refresh_expires_at = Some(refresh.expires_at as i64);

        Ok(RotationOutcome::Verified(Box::new(IssuedSession {
            user,
            access,
            refresh,
            csrf_token: generate_csrf_token(),
        })))
    }

    /// Clear the stored session and bump the token version, so every refresh
    /// token issued so far becomes unusable. Returns the new version.
    pub async fn revoke(&self, user_id: i64) -> Result<Option<i64>, SessionError> {
        let version = self.db.users().revoke_sessions(user_id).await?;
        if let Some(version) = version {
            info!(user_id, token_version = version, "Sessions revoked");
        }
        Ok(version)
    }

    /// Forget sessions whose refresh token has expired.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs() as i64;
        Ok(self.db.users().clear_expired_sessions(now).await?)
    }

    fn issue_pair(&self, user: &User) -> Result<(IssuedToken, IssuedToken), JwtError> {
        let subject = TokenSubject {
            user_uuid: &user.uuid,
            email: &user.email,
            token_version: user.token_version,
        };
        Ok((
            self.issuer.issue_access_token(subject)?,
            self.issuer.issue_refresh_token(subject)?,
        ))
    }

    fn reject(&self, user_id: Option<i64>, reason: RejectReason) -> RotationOutcome {
        warn!(?user_id, ?reason, "Refresh rejected");
        RotationOutcome::Rejected(reason)
    }
}
