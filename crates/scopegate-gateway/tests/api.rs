//! Router-level tests: every route behind its scope, plus the error body.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use scopegate_auth::testutil::{
    MockKeySet, TestKey, claims_without_permissions, test_guard, valid_claims,
};
use scopegate_gateway::{GatewayConfig, GatewayState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const ALL_SCOPES: &[&str] = &[
    "get:drinks",
    "get:drinks-detail",
    "post:drinks",
    "patch:drinks",
    "delete:drinks",
];

fn app(keys: &MockKeySet) -> Router {
    build_router(GatewayState::new(test_guard(keys)), &GatewayConfig::default())
}

fn bearer(scopes: &[&str]) -> String {
    format!("Bearer {}", TestKey::A.sign(&valid_claims(scopes)))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        request = request.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn mojito() -> Value {
    json!({
        "title": "Mojito",
        "recipe": [
            { "name": "rum", "color": "white", "parts": 2 },
            { "name": "lime", "color": "green", "parts": 1 },
        ],
    })
}

#[tokio::test]
async fn health_is_public() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let (status, body) = send(&app(&keys), "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(keys.fetches(), 0);
}

#[tokio::test]
async fn missing_header_is_401_with_error_body() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let (status, body) = send(&app(&keys), "GET", "/drinks", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({
            "success": false,
            "error": 401,
            "message": "Authorization header is expected.",
        })
    );
}

#[tokio::test]
async fn wrong_scope_is_403() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let auth = bearer(&["get:drinks"]);

    let (status, body) = send(&app(&keys), "DELETE", "/drinks/1", Some(&auth), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], 403);
    assert_eq!(body["message"], "Permission 'delete:drinks' not found.");
}

#[tokio::test]
async fn missing_permissions_claim_is_403() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let auth = format!("Bearer {}", TestKey::A.sign(&claims_without_permissions()));

    let (status, body) = send(&app(&keys), "GET", "/drinks", Some(&auth), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Permissions not included in token.");
}

#[tokio::test]
async fn key_set_outage_is_500() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    keys.set_failing(true);
    let auth = bearer(&["get:drinks"]);

    let (status, body) = send(&app(&keys), "GET", "/drinks", Some(&auth), None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], 500);
}

#[tokio::test]
async fn unauthorized_post_does_not_create() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let app = app(&keys);
    let reader = bearer(&["get:drinks", "get:drinks-detail"]);

    let (status, _) = send(&app, "POST", "/drinks", Some(&reader), Some(mojito())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", "/drinks-detail", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drinks"], json!([]));
}

#[tokio::test]
async fn drinks_lifecycle() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let app = app(&keys);
    let auth = bearer(ALL_SCOPES);

    let (status, body) = send(&app, "POST", "/drinks", Some(&auth), Some(mojito())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["drinks"][0]["id"].as_u64().unwrap();

    let (status, body) = send(&app, "GET", "/drinks", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["drinks"][0]["recipe"],
        json!([
            { "color": "white", "parts": 2 },
            { "color": "green", "parts": 1 },
        ])
    );

    let (status, body) = send(&app, "GET", "/drinks-detail", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drinks"][0]["recipe"][0]["name"], "rum");

    let uri = format!("/drinks/{id}");
    let patch = json!({ "title": "Virgin Mojito" });
    let (status, body) = send(&app, "PATCH", &uri, Some(&auth), Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drinks"][0]["title"], "Virgin Mojito");
    assert_eq!(body["drinks"][0]["recipe"][1]["name"], "lime");

    let (status, body) = send(&app, "DELETE", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "delete": id }));

    let (status, body) = send(&app, "DELETE", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "resource not found");

    assert_eq!(keys.fetches(), 1);
}

#[tokio::test]
async fn invalid_bodies_are_rejected_after_auth() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let app = app(&keys);
    let auth = bearer(&["post:drinks"]);

    let (status, body) = send(
        &app,
        "POST",
        "/drinks",
        Some(&auth),
        Some(json!({ "title": "Nothing", "recipe": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], 422);
    assert_eq!(body["message"], "unprocessable");

    let (status, _) = send(&app, "POST", "/drinks", Some(&auth), Some(mojito())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", "/drinks", Some(&auth), Some(mojito())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        "POST",
        "/drinks",
        None,
        Some(json!({ "title": "Nothing", "recipe": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_routes_and_ids_are_404() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let app = app(&keys);
    let auth = bearer(ALL_SCOPES);

    let (status, body) = send(&app, "GET", "/cocktails", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "success": false, "error": 404, "message": "resource not found" })
    );

    let (status, _) = send(&app, "DELETE", "/drinks/not-a-number", Some(&auth), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let patch = json!({ "title": "Ghost" });
    let (status, _) = send(&app, "PATCH", "/drinks/42", Some(&auth), Some(patch)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rotated_key_accepted_over_http() {
    let keys = MockKeySet::new(vec![TestKey::A]);
    let app = app(&keys);

    let (status, _) = send(&app, "GET", "/drinks", Some(&bearer(&["get:drinks"])), None).await;
    assert_eq!(status, StatusCode::OK);

    keys.publish(vec![TestKey::A, TestKey::B]);
    let rotated = format!("Bearer {}", TestKey::B.sign(&valid_claims(&["get:drinks"])));
    let (status, _) = send(&app, "GET", "/drinks", Some(&rotated), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys.fetches(), 2);
}
