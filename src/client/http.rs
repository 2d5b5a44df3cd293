//! HTTP client for the auth routes.
//!
//! Cookies (refresh token, CSRF token) live in a reqwest cookie jar; the access
//! token is held by the [`SessionCoordinator`], which every authenticated call
//! goes through.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderName;
use reqwest::{Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use url::Url;

use super::coordinator::{Refresher, SessionCoordinator};
use super::error::{AuthFailure, ClientError};
use crate::api::types::{CredentialsRequest, MeResponse, SessionResponse, SuccessResponse, UserView};
use crate::auth::{CSRF_COOKIE_NAME, DEFAULT_CSRF_HEADER, find_cookie};

/// Error body sent by the server.
#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

/// Connection details shared by the client and its refresher.
#[derive(Clone)]
struct Endpoint {
    http: reqwest::Client,
    base: Url,
    jar: Arc<Jar>,
    csrf_header: HeaderName,
}

impl Endpoint {
    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }

    /// Current CSRF cookie value, as the server last set it.
    fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.base)?;
        let cookies = cookies.to_str().ok()?;
        find_cookie(cookies, CSRF_COOKIE_NAME).map(str::to_string)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> reqwest::RequestBuilder {
        let state_changing = !matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if state_changing {
            if let Some(csrf) = self.csrf_token() {
                request = request.header(self.csrf_header.clone(), csrf);
            }
        }
        request
    }
}

/// Turn a response into `T`, or the matching [`ClientError`].
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.json::<ErrorBody>().await.ok();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized {
            code: body.and_then(|b| b.code),
        });
    }

    let (message, code) = match body {
        Some(body) => (body.error, body.code),
        None => (status.to_string(), None),
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Calls `/auth/refresh` with the cookies in the jar.
pub struct HttpRefresher {
    endpoint: Endpoint,
}

impl HttpRefresher {
    async fn rotate(&self) -> Result<String, AuthFailure> {
        let url = self
            .endpoint
            .url("auth/refresh")
            .map_err(|e| AuthFailure::Transport(e.to_string()))?;
        let response = self
            .endpoint
            .request(Method::POST, url, None)
            .send()
            .await
            .map_err(|e| AuthFailure::Transport(e.to_string()))?;

        match decode::<SessionResponse>(response).await {
            Ok(session) => Ok(session.access_token),
            Err(ClientError::Unauthorized { code }) => Err(AuthFailure::RefreshRejected {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                code: code.unwrap_or_default(),
            }),
            Err(ClientError::Status { status, code, .. }) => Err(AuthFailure::RefreshRejected {
                status,
                code: code.unwrap_or_default(),
            }),
            Err(e) => Err(AuthFailure::Transport(e.to_string())),
        }
    }
}

impl Refresher for HttpRefresher {
    fn refresh(&self) -> impl std::future::Future<Output = Result<String, AuthFailure>> + Send {
        self.rotate()
    }
}

/// Client for a server exposing the `/auth` routes.
#[derive(Clone)]
pub struct AuthClient {
    endpoint: Endpoint,
    coordinator: Arc<SessionCoordinator<HttpRefresher>>,
}

impl AuthClient {
    /// Client using the default CSRF header.
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Self::with_csrf_header(base, HeaderName::from_static(DEFAULT_CSRF_HEADER))
    }

    pub fn with_csrf_header(base: &str, csrf_header: HeaderName) -> Result<Self, ClientError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()?;

        let endpoint = Endpoint {
            http,
            base,
            jar,
            csrf_header,
        };

        Ok(Self {
            coordinator: Arc::new(SessionCoordinator::new(HttpRefresher {
                endpoint: endpoint.clone(),
            })),
            endpoint,
        })
    }

    /// The coordinator holding this client's access token.
    pub fn coordinator(&self) -> &SessionCoordinator<HttpRefresher> {
        &self.coordinator
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<UserView, ClientError> {
        let body = CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        };
        self.open_session("auth/register", &body).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserView, ClientError> {
        let body = CredentialsRequest {
            email: email.to_string(),
            password: password.to_string(),
            display_name: None,
        };
        self.open_session("auth/login", &body).await
    }

    async fn open_session(
        &self,
        path: &str,
        body: &CredentialsRequest,
    ) -> Result<UserView, ClientError> {
        let url = self.endpoint.url(path)?;
        let response = self
            .endpoint
            .request(Method::POST, url, None)
            .json(body)
            .send()
            .await?;
        let session: SessionResponse = decode(response).await?;
        self.coordinator.set_access_token(session.access_token);
        debug!(user = %session.user.id, "Session opened");
        Ok(session.user)
    }

    /// Pick up an existing session from the refresh cookie alone.
    pub async fn resume(&self) -> Result<(), ClientError> {
        self.coordinator.refresh_now().await?;
        Ok(())
    }

    /// Revoke the session server-side and forget the access token.
    /// The token is dropped locally even if the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result: Result<SuccessResponse, _> = self.post_json("auth/logout", &()).await;
        self.coordinator.clear();
        result.map(|_| ())
    }

    pub async fn me(&self) -> Result<MeResponse, ClientError> {
        self.get_json("auth/me").await
    }

    /// Authenticated GET.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.coordinator
            .execute(|token| self.send(Method::GET, path, token, None::<&()>))
            .await
    }

    /// Authenticated POST with a JSON body and the CSRF header.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.coordinator
            .execute(|token| self.send(Method::POST, path, token, Some(body)))
            .await
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        token: Option<String>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint.url(path)?;
        let mut request = self.endpoint.request(method, url, token.as_deref());
        if let Some(body) = body {
            request = request.json(body);
        }
        decode(request.send().await?).await
    }

    /// Raw cookie header the jar would send to `path`, for inspection.
    pub fn cookies_for(&self, path: &str) -> Option<String> {
        let url = self.endpoint.url(path).ok()?;
        let cookies = self.endpoint.jar.cookies(&url)?;
        cookies.to_str().ok().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_gets_trailing_slash() {
        let client = AuthClient::new("http://127.0.0.1:7300/prefix").unwrap();
        assert_eq!(
            client.endpoint.url("/auth/me").unwrap().as_str(),
            "http://127.0.0.1:7300/prefix/auth/me"
        );
    }

    #[test]
    fn test_csrf_token_read_from_jar() {
        let client = AuthClient::new("http://127.0.0.1:7300").unwrap();
        assert_eq!(client.endpoint.csrf_token(), None);

        let url = Url::parse("http://127.0.0.1:7300/auth/login").unwrap();
        client
            .endpoint
            .jar
            .add_cookie_str("csrf_token=abc123; SameSite=Lax; Path=/", &url);
        assert_eq!(client.endpoint.csrf_token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_csrf_header_only_on_state_changing_requests() {
        let client = AuthClient::new("http://127.0.0.1:7300").unwrap();
        let url = Url::parse("http://127.0.0.1:7300/").unwrap();
        client
            .endpoint
            .jar
            .add_cookie_str("csrf_token=abc123; Path=/", &url);

        let get = client
            .endpoint
            .request(Method::GET, url.clone(), Some("tok"))
            .build()
            .unwrap();
        assert!(get.headers().get(DEFAULT_CSRF_HEADER).is_none());
        assert_eq!(
            get.headers().get("authorization").unwrap(),
            "Bearer tok"
        );

        let post = client
            .endpoint
            .request(Method::POST, url, None)
            .build()
            .unwrap();
        assert_eq!(post.headers().get(DEFAULT_CSRF_HEADER).unwrap(), "abc123");
    }
}
