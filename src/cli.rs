//! CLI argument parsing, validation, and startup helpers.

use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::auth::{CookieSettings, DEFAULT_CSRF_HEADER};
use crate::db::{Database, UserRole};
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, CSRF_TOKEN_DURATION_SECS, MAX_TOKEN_DURATION_SECS,
    REFRESH_TOKEN_DURATION_SECS, TokenLifetimes,
};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Header a reverse proxy puts the client address in.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`, first entry
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
        }
    }

    /// Select the client entry from the raw header value.
    pub fn pick<'a>(&self, value: &'a str) -> &'a str {
        match self {
            ClientIpHeader::XForwardedFor => value.split(',').next().unwrap_or(value),
            ClientIpHeader::XRealIp => value,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "askgate",
    about = "Session and token service for the Q&A content platform"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7300", env = "ASKGATE_PORT")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "askgate.db", env = "ASKGATE_DATABASE")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub refresh_ttl_secs: u64,

    /// CSRF cookie lifetime in seconds
    #[arg(
        long,
        default_value_t = CSRF_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub csrf_ttl_secs: u64,

    /// Header state-changing requests must echo the CSRF token in
    #[arg(long, default_value = DEFAULT_CSRF_HEADER, value_parser = parse_header_name)]
    pub csrf_header: HeaderName,

    /// Set the Secure flag on cookies (enable behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Accept refresh tokens issued before the last logout as long as their digest matches
    #[arg(long)]
    pub skip_token_version_check: bool,

    /// Take the client IP from this proxy header instead of the socket address
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Login/registration attempts allowed per client IP per minute
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub auth_rate_per_minute: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Give the registered user with this e-mail the admin role, then start normally
    #[arg(long, value_name = "EMAIL")]
    pub promote_admin: Option<String>,
}

fn parse_header_name(s: &str) -> Result<HeaderName, String> {
    HeaderName::try_from(s.to_ascii_lowercase())
        .map_err(|_| format!("Invalid header name: {}", s))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env_var,
            "Secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must differ so the token kinds stay separate.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret("ACCESS_TOKEN_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_secret("REFRESH_TOKEN_SECRET", args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        lifetimes: TokenLifetimes {
            access_secs: args.access_ttl_secs,
            refresh_secs: args.refresh_ttl_secs,
            csrf_secs: args.csrf_ttl_secs,
        },
        cookies: CookieSettings {
            secure: args.secure_cookies,
        },
        csrf_header: args.csrf_header.clone(),
        enforce_token_version: !args.skip_token_version_check,
        ip_header: args.ip_header,
        auth_rate_per_minute: args.auth_rate_per_minute,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Promote a registered user to admin. Returns false if nothing was promoted.
pub async fn handle_promote_admin(db: &Database, email: &str) -> bool {
    let email = email.trim().to_lowercase();
    let user = match db.users().get_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(email = %email, "No user registered with this e-mail");
            return false;
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            return false;
        }
    };

    report_promotion(user.id, db.users().set_role(user.id, UserRole::Admin).await)
}

fn report_promotion(user_id: i64, result: Result<bool, sqlx::Error>) -> bool {
    match result {
        Ok(true) => {
            info!(user_id, "User promoted to admin");
            true
        }
        Ok(false) => {
            error!(user_id, "User disappeared before promotion");
            false
        }
        Err(e) => {
            error!(error = %e, "Failed to promote user");
            false
        }
    }
}
