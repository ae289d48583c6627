mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;
use serde_json::json;
use social_poster::error::PosterError;
use social_poster::models::{PendingAuthorization, SessionKey, TokenRecord};
use social_poster::services::{CallbackParams, SessionStore};
use social_poster::utils::{generate_code_challenge, CodeVerifier};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_app, CLIENT_ID, CLIENT_SECRET};
use social_poster::utils::Clock;

fn verifier() -> CodeVerifier {
    // "xyz" padded to the minimum PKCE length.
    CodeVerifier::parse("xyz".repeat(15)).unwrap()
}

async fn stash(app: &common::TestApp, key: &SessionKey, state: &str) {
    app.sessions
        .stash_pending(
            key,
            PendingAuthorization {
                code_verifier: verifier(),
                state: state.to_string(),
                created_at: app.clock.now(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn exchange_stores_token_and_consumes_verifier() {
    let server = MockServer::start().await;
    let basic = format!("Basic {}", STANDARD.encode(format!("{}:{}", CLIENT_ID, CLIENT_SECRET)));

    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(header("authorization", basic.as_str()))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains(format!("code_verifier={}", "xyz".repeat(15))))
        .and(body_string_contains(format!("client_id={}", CLIENT_ID)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok1", "token_type": "bearer"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let token = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("st-1"))
        .await
        .unwrap();

    assert_eq!(token.access_token, "tok1");
    assert_eq!(app.sessions.get(&key).await.unwrap().unwrap().access_token, "tok1");
    assert!(app.sessions.take_pending(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn callback_without_verifier_never_calls_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(0)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();

    let err = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("st-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PosterError::MissingCodeVerifier));
}

#[tokio::test]
async fn replayed_callback_fails_with_missing_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let params = CallbackParams {
        code: Some("abc".to_string()),
        state: Some("st-1".to_string()),
        ..Default::default()
    };

    app.state.auth_flow.complete(&key, &params).await.unwrap();
    let err = app.state.auth_flow.complete(&key, &params).await.unwrap_err();
    assert!(matches!(err, PosterError::MissingCodeVerifier));
}

#[tokio::test]
async fn missing_code_and_state_mismatch_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(0)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let err = app
        .state
        .auth_flow
        .exchange(&key, None, Some("st-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::MissingAuthorizationCode));

    let err = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("forged"))
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::StateMismatch));

    // The mismatching attempt consumed the verifier.
    assert!(app.sessions.take_pending(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_verifier_is_treated_as_missing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(0)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;
    app.clock.advance(Duration::minutes(11));

    let err = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("st-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, PosterError::MissingCodeVerifier));
}

#[tokio::test]
async fn provider_error_keeps_upstream_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let err = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("st-1"))
        .await
        .unwrap_err();

    match err {
        PosterError::TokenExchangeFailed { status, body } => {
            assert_eq!(status, Some(400));
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(app.sessions.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn denied_authorization_clears_pending_state() {
    let server = MockServer::start().await;
    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let params = CallbackParams {
        error: Some("access_denied".to_string()),
        state: Some("st-1".to_string()),
        ..Default::default()
    };
    let err = app.state.auth_flow.complete(&key, &params).await.unwrap_err();

    assert!(matches!(err, PosterError::AuthorizationDenied(_)));
    assert!(app.sessions.take_pending(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn start_stores_verifier_matching_challenge_in_url() {
    let server = MockServer::start().await;
    let app = test_app(&server.uri());
    let key = SessionKey::generate();

    let url = app.state.auth_flow.start(&key).await.unwrap();
    let pending = app.sessions.take_pending(&key).await.unwrap().unwrap();

    let challenge = generate_code_challenge(pending.code_verifier.as_str());
    assert!(url.starts_with(&format!("{}/i/oauth2/authorize?", server.uri())));
    assert!(url.contains(&format!("code_challenge={}", challenge)));
    assert!(url.contains("code_challenge_method=S256"));
    assert!(url.contains(&format!("state={}", pending.state)));
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok2",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    let mut record = TokenRecord::bearer("tok1");
    record.refresh_token = Some("r1".to_string());
    record.expires_at = Some(app.clock.now() - Duration::minutes(1));
    app.sessions.put(&key, record).await.unwrap();

    let token = app.state.auth_flow.access_token(&key).await.unwrap();
    assert_eq!(token.access_token, "tok2");
    // The provider did not rotate the refresh token, so the old one is kept.
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert_eq!(app.sessions.get(&key).await.unwrap().unwrap().access_token, "tok2");
}

#[tokio::test]
async fn expired_token_without_refresh_requires_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    let mut record = TokenRecord::bearer("tok1");
    record.expires_at = Some(app.clock.now() - Duration::minutes(1));
    app.sessions.put(&key, record).await.unwrap();

    let err = app.state.auth_flow.access_token(&key).await.unwrap_err();
    assert!(matches!(err, PosterError::NotAuthenticated));
    assert!(app.sessions.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn out_of_range_expiry_fails_exchange_without_storing_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "expires_in": 9_000_000_000_000_000_i64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    stash(&app, &key, "st-1").await;

    let err = app
        .state
        .auth_flow
        .exchange(&key, Some("abc"), Some("st-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PosterError::TokenExchangeFailed { .. }));
    assert_eq!(err.kind(), "token_exchange_failed");
    assert!(app.sessions.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn out_of_range_expiry_on_refresh_requires_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok2",
            "expires_in": 9_000_000_000_000_000_i64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let key = SessionKey::generate();
    let mut record = TokenRecord::bearer("tok1");
    record.refresh_token = Some("r1".to_string());
    record.expires_at = Some(app.clock.now() - Duration::minutes(1));
    app.sessions.put(&key, record).await.unwrap();

    let err = app.state.auth_flow.access_token(&key).await.unwrap_err();
    assert!(matches!(err, PosterError::NotAuthenticated));
    assert!(app.sessions.get(&key).await.unwrap().is_none());
}
