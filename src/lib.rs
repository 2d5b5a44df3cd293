pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::{ApiConfig, create_api_router};
use auth::CookieSettings;
use axum::{Router, http::HeaderName};
use db::Database;
use jwt::{TokenIssuer, TokenLifetimes};
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens (must differ from the access secret)
    pub refresh_secret: Vec<u8>,
    /// Access, refresh and CSRF cookie lifetimes
    pub lifetimes: TokenLifetimes,
    /// Cookie flags (Secure should be on in production with HTTPS)
    pub cookies: CookieSettings,
    /// Header the CSRF token is echoed in
    pub csrf_header: HeaderName,
    /// Reject refresh tokens whose version predates the last revocation
    pub enforce_token_version: bool,
    /// IP extraction strategy (requires running behind a proxy)
    pub ip_header: Option<cli::ClientIpHeader>,
    /// Login/registration attempts allowed per client IP per minute
    pub auth_rate_per_minute: u32,
}

impl ServerConfig {
    /// Configuration with default lifetimes and cookie flags.
    pub fn new(db: Database, access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            db,
            access_secret: access_secret.to_vec(),
            refresh_secret: refresh_secret.to_vec(),
            lifetimes: TokenLifetimes::default(),
            cookies: CookieSettings::default(),
            csrf_header: HeaderName::from_static(auth::DEFAULT_CSRF_HEADER),
            enforce_token_version: true,
            ip_header: None,
            auth_rate_per_minute: 10,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let issuer = Arc::new(TokenIssuer::new(
        &config.access_secret,
        &config.refresh_secret,
        config.lifetimes,
    ));

    let sessions = SessionService::new(
        config.db.clone(),
        issuer.clone(),
        config.enforce_token_version,
    );

    let api_router = create_api_router(ApiConfig {
        db: config.db.clone(),
        sessions,
        issuer,
        cookies: config.cookies,
        csrf_header: config.csrf_header.clone(),
        ip_header: config.ip_header,
        auth_rate_per_minute: config.auth_rate_per_minute,
    });

    Router::new().nest("/auth", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let issuer = Arc::new(TokenIssuer::new(
        &config.access_secret,
        &config.refresh_secret,
        config.lifetimes,
    ));
    let sessions = SessionService::new(config.db.clone(), issuer, config.enforce_token_version);

    cleanup::run_cleanup(&sessions).await;
    cleanup::spawn_cleanup_scheduler(sessions);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
