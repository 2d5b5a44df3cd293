mod common;

use axum::http::StatusCode;
use common::{Call, Session, create_test_app, refresh, register, test_config};

#[tokio::test]
async fn test_refresh_rotates_both_cookies() {
    let app = create_test_app().await;
    let session = register(&app, "alice@example.com").await;

    let response = refresh(&app, &session).await;
    assert_eq!(response.status, StatusCode::OK);

    let rotated = Session::from_response(&response);
    assert_eq!(rotated.user_id, session.user_id);
    assert_ne!(rotated.access, session.access);
    assert_ne!(rotated.refresh, session.refresh);
    assert_ne!(rotated.csrf, session.csrf);

    let me = Call::new("GET", "/auth/me")
        .bearer(&rotated.access)
        .send(&app)
        .await;
    assert_eq!(me.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = create_test_app().await;
    let session = register(&app, "bob@example.com").await;

    assert_eq!(refresh(&app, &session).await.status, StatusCode::OK);

    let replay = refresh(&app, &session).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.code(), "session_mismatch");

    let cleared = replay.set_cookie_line("refresh_token").unwrap();
    assert!(cleared.starts_with("refresh_token=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert!(cleared.contains("Path=/auth"));
}

#[tokio::test]
async fn test_rotation_chain() {
    let app = create_test_app().await;
    let mut session = register(&app, "carol@example.com").await;

    for _ in 0..5 {
        let response = refresh(&app, &session).await;
        assert_eq!(response.status, StatusCode::OK);
        session = Session::from_response(&response);
    }
}

#[tokio::test]
async fn test_refresh_requires_csrf_pair() {
    let app = create_test_app().await;
    let session = register(&app, "dave@example.com").await;

    let no_header = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.refresh)
        .cookie("csrf_token", &session.csrf)
        .send(&app)
        .await;
    assert_eq!(no_header.status, StatusCode::FORBIDDEN);
    assert_eq!(no_header.code(), "csrf_mismatch");

    let no_cookie = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.refresh)
        .header("x-csrf-token", &session.csrf)
        .send(&app)
        .await;
    assert_eq!(no_cookie.status, StatusCode::FORBIDDEN);

    let mismatch = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.refresh)
        .cookie("csrf_token", &session.csrf)
        .header("x-csrf-token", "forged-value")
        .send(&app)
        .await;
    assert_eq!(mismatch.status, StatusCode::FORBIDDEN);
    // A CSRF failure must not burn the session
    assert!(mismatch.set_cookies.is_empty());

    assert_eq!(refresh(&app, &session).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_custom_csrf_header_name() {
    let mut config = test_config().await;
    config.csrf_header = axum::http::HeaderName::from_static("x-xsrf-token");
    let app = askgate::create_app(&config);
    let session = register(&app, "erin@example.com").await;

    let default_header = refresh(&app, &session).await;
    assert_eq!(default_header.status, StatusCode::FORBIDDEN);

    let custom_header = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.refresh)
        .cookie("csrf_token", &session.csrf)
        .header("X-XSRF-Token", &session.csrf)
        .send(&app)
        .await;
    assert_eq!(custom_header.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_cookie_is_no_session() {
    let app = create_test_app().await;

    let response = Call::new("POST", "/auth/refresh")
        .csrf("some-token")
        .send(&app)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "no_session");
}

#[tokio::test]
async fn test_refresh_with_forged_token() {
    let app = create_test_app().await;
    let session = register(&app, "frank@example.com").await;

    // An access token is signed with the other secret
    let response = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", &session.access)
        .csrf(&session.csrf)
        .send(&app)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "invalid_refresh_token");

    let garbage = Call::new("POST", "/auth/refresh")
        .cookie("refresh_token", "not.a.jwt")
        .csrf(&session.csrf)
        .send(&app)
        .await;
    assert_eq!(garbage.code(), "invalid_refresh_token");
}

async fn logout(app: &axum::Router, session: &Session) -> common::TestResponse {
    Call::new("POST", "/auth/logout")
        .bearer(&session.access)
        .csrf(&session.csrf)
        .send(app)
        .await
}

#[tokio::test]
async fn test_logout_clears_cookies_and_revokes() {
    let app = create_test_app().await;
    let session = register(&app, "grace@example.com").await;

    let response = logout(&app, &session).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["success"], true);
    assert!(response.set_cookie_line("refresh_token").unwrap().contains("Max-Age=0"));
    assert!(response.set_cookie_line("csrf_token").unwrap().contains("Max-Age=0"));

    let after = refresh(&app, &session).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.code(), "no_session");
}

#[tokio::test]
async fn test_logout_revokes_without_version_check_too() {
    let mut config = test_config().await;
    config.enforce_token_version = false;
    let app = askgate::create_app(&config);
    let session = register(&app, "heidi@example.com").await;

    assert_eq!(logout(&app, &session).await.status, StatusCode::OK);

    // Clearing the stored hash alone already blocks the old refresh token
    let after = refresh(&app, &session).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.code(), "no_session");
}

#[tokio::test]
async fn test_new_login_after_logout_works() {
    let app = create_test_app().await;
    let session = register(&app, "ivan@example.com").await;
    logout(&app, &session).await;

    let fresh = common::login(&app, "ivan@example.com").await;
    assert_eq!(refresh(&app, &fresh).await.status, StatusCode::OK);
    // The pre-logout token stays dead
    assert_eq!(
        refresh(&app, &session).await.code(),
        "session_mismatch"
    );
}

#[tokio::test]
async fn test_logout_requires_bearer_and_csrf() {
    let app = create_test_app().await;
    let session = register(&app, "judy@example.com").await;

    let no_bearer = Call::new("POST", "/auth/logout")
        .csrf(&session.csrf)
        .send(&app)
        .await;
    assert_eq!(no_bearer.status, StatusCode::UNAUTHORIZED);

    let no_csrf = Call::new("POST", "/auth/logout")
        .bearer(&session.access)
        .send(&app)
        .await;
    assert_eq!(no_csrf.status, StatusCode::FORBIDDEN);

    // Neither attempt touched the session
    assert_eq!(refresh(&app, &session).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_access_token_stays_valid_until_expiry_after_logout() {
    let app = create_test_app().await;
    let session = register(&app, "ken@example.com").await;
    logout(&app, &session).await;

    // Access tokens are validated statelessly
    let me = Call::new("GET", "/auth/me")
        .bearer(&session.access)
        .send(&app)
        .await;
    assert_eq!(me.status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_rotation_same_token_has_one_winner() {
    let app = create_test_app().await;
    let session = register(&app, "laura@example.com").await;

    let (a, b) = tokio::join!(refresh(&app, &session), refresh(&app, &session));

    let mut statuses = [a.status.as_u16(), b.status.as_u16()];
    statuses.sort();
    // The loser of the race is logged out; this is the accepted cost of single-use tokens
    assert_eq!(statuses, [200, 401]);
    let loser = if a.status == StatusCode::OK { &b } else { &a };
    assert_eq!(loser.code(), "session_mismatch");
}
