#![allow(dead_code)]

use askgate::cli::ClientIpHeader;
use askgate::jwt::{TokenClaims, TokenKind};
use askgate::{ServerConfig, create_app, db::Database};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery";

/// Config for router tests: client IPs come from X-Forwarded-For.
pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = ServerConfig::new(db, ACCESS_SECRET, REFRESH_SECRET);
    config.ip_header = Some(ClientIpHeader::XForwardedFor);
    config.auth_rate_per_minute = 1000;
    config
}

pub async fn create_test_app() -> Router {
    create_app(&test_config().await)
}

/// Response with its body already read.
pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookies: Vec<String>,
    pub json: serde_json::Value,
}

impl TestResponse {
    /// Value of the named cookie in a `Set-Cookie` header, if set.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.set_cookie_line(name)?
            .split(';')
            .next()?
            .split_once('=')
            .map(|(_, value)| value)
    }

    /// Whole `Set-Cookie` line for the named cookie.
    pub fn set_cookie_line(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}=", name);
        self.set_cookies
            .iter()
            .find(|line| line.starts_with(&prefix))
            .map(String::as_str)
    }

    pub fn code(&self) -> &str {
        self.json["code"].as_str().unwrap_or("")
    }
}

/// Builder for a request against the test router.
pub struct Call {
    builder: axum::http::request::Builder,
    ip: String,
    cookies: Vec<String>,
    body: Body,
}

impl Call {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
            ip: "203.0.113.7".to_string(),
            cookies: Vec::new(),
            body: Body::empty(),
        }
    }

    /// Client address reported through X-Forwarded-For.
    pub fn ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.builder = self.builder.header(header::CONTENT_TYPE, "application/json");
        self.body = Body::from(body.to_string());
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.builder = self
            .builder
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(format!("{}={}", name, value));
        self
    }

    /// Attach the CSRF cookie and the matching header.
    pub fn csrf(self, token: &str) -> Self {
        self.cookie("csrf_token", token).header("x-csrf-token", token)
    }

    pub async fn send(self, app: &Router) -> TestResponse {
        let mut builder = self.builder.header("x-forwarded-for", self.ip);
        if !self.cookies.is_empty() {
            builder = builder.header(header::COOKIE, self.cookies.join("; "));
        }
        let response = app
            .clone()
            .oneshot(builder.body(self.body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

        TestResponse {
            status,
            set_cookies,
            json,
        }
    }
}

/// Credentials a client holds after login or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub access: String,
    pub refresh: String,
    pub csrf: String,
}

impl Session {
    pub fn from_response(response: &TestResponse) -> Self {
        Self {
            user_id: response.json["user"]["id"].as_str().unwrap().to_string(),
            access: response.json["accessToken"].as_str().unwrap().to_string(),
            refresh: response.cookie("refresh_token").unwrap().to_string(),
            csrf: response.cookie("csrf_token").unwrap().to_string(),
        }
    }
}

pub async fn register(app: &Router, email: &str) -> Session {
    let response = Call::new("POST", "/auth/register")
        .json(serde_json::json!({ "email": email, "password": PASSWORD }))
        .send(app)
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.json);
    Session::from_response(&response)
}

pub async fn login(app: &Router, email: &str) -> Session {
    let response = Call::new("POST", "/auth/login")
        .json(serde_json::json!({ "email": email, "password": PASSWORD }))
        .send(app)
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.json);
    Session::from_response(&response)
}

/// Present `session`'s refresh token with a valid CSRF pair.
pub async fn refresh(app: &Router, session: &Session) -> TestResponse {
    Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.refresh)
        .csrf(&session.csrf)
        .send(app)
        .await
}

/// Access token for `user_id` that expired a minute ago.
pub fn expired_access_token(user_id: &str, email: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        token_version: 0,
        jti: uuid::Uuid::new_v4().to_string(),
        kind: TokenKind::Access,
        iat: now - 960,
        exp: now - 60,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET),
    )
    .unwrap()
}
