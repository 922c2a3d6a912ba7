//! End-to-end verification against a key set served over HTTP.

use std::time::Duration;

use scopegate_auth::testutil::{MockKeySet, TEST_AUDIENCE, TEST_ISSUER, TestKey, valid_claims};
use scopegate_auth::{AuthConfig, AuthErrorKind, AuthGuard, PermissionRequirement};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

fn config_for(server: &MockServer) -> AuthConfig {
    AuthConfig::builder()
        .jwks_url(format!("{}{JWKS_PATH}", server.uri()))
        .issuer(TEST_ISSUER)
        .audience(TEST_AUDIENCE)
        .fetch_timeout_secs(1)
        .build()
}

fn bearer(key: TestKey, permissions: &[&str]) -> String {
    format!("Bearer {}", key.sign(&valid_claims(permissions)))
}

#[tokio::test]
async fn test_verifies_against_served_key_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(MockKeySet::new(vec![TestKey::A]).document()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let guard = AuthGuard::from_config(&config_for(&server)).unwrap();
    let required = PermissionRequirement::new("get:drinks");
    let header = bearer(TestKey::A, &["get:drinks"]);

    let first = guard.authorize(Some(&header), &required).await.unwrap();
    let second = guard.authorize(Some(&header), &required).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.subject(), "auth0|user-1");
}

#[tokio::test]
async fn test_server_error_is_key_set_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let guard = AuthGuard::from_config(&config_for(&server)).unwrap();
    let err = guard
        .authorize(Some(&bearer(TestKey::A, &["get:drinks"])), &"get:drinks".into())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_garbage_body_is_key_set_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let guard = AuthGuard::from_config(&config_for(&server)).unwrap();
    let err = guard
        .authorize(Some(&bearer(TestKey::A, &[])), &"get:drinks".into())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(MockKeySet::new(vec![TestKey::A]).document())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let guard = AuthGuard::from_config(&config_for(&server)).unwrap();
    let started = std::time::Instant::now();
    let err = guard
        .authorize(Some(&bearer(TestKey::A, &["get:drinks"])), &"get:drinks".into())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_missing_config_fails_at_startup() {
    let err = AuthGuard::from_config(&AuthConfig::default()).unwrap_err();
    assert!(err.to_string().contains("jwksUrl"));
}
