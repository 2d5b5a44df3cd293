//! Client-side error types.

/// Terminal authentication failure, broadcast to every subscriber of the
/// coordinator and handed to every request waiting on the refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The server turned the refresh token away
    #[error("refresh rejected ({status}): {code}")]
    RefreshRejected { status: u16, code: String },
    /// The refresh call never got an answer
    #[error("refresh request failed: {0}")]
    Transport(String),
    /// A request was still unauthorized after replaying with a fresh token
    #[error("request rejected again after refresh")]
    RetryRejected,
    /// No access token is held; sign in first
    #[error("not signed in")]
    SignedOut,
    /// The refresh this request was waiting on was cancelled
    #[error("refresh was interrupted")]
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 401 from the server
    #[error("unauthorized ({})", .code.as_deref().unwrap_or("no code"))]
    Unauthorized { code: Option<String> },
    #[error("authentication failed: {0}")]
    AuthFailed(#[from] AuthFailure),
    #[error("server returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    /// Machine-readable error code sent by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Unauthorized { code } | ClientError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
