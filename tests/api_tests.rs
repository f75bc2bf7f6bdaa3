use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use factura::api::AppState;
use factura::config::Config;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

/// Default admin seeded by the initial migration.
const ADMIN_EMAIL: &str = "admin@factura.local";
const ADMIN_PASSWORD: &str = "admin123";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();

    let scratch = std::env::temp_dir().join(format!("factura-test-{}", uuid::Uuid::new_v4()));
    config.storage.uploads_path = scratch.join("uploads").to_string_lossy().into_owned();
    config.storage.export_json_path = scratch.join("json").to_string_lossy().into_owned();
    config.storage.export_xml_path = scratch.join("xml").to_string_lossy().into_owned();

    let state = factura::api::create_app_state_from_config(config)
        .await
        .expect("Failed to create app state");
    let router = factura::api::router(state.clone()).await;
    (router, state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            &serde_json::json!({"email": email, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "login failed for {email}");

    let body = body_json(response).await;
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(get_request("/api/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "OK");
    assert!(body["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get_request("/api/invoices", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request("/api/auth/me", Some("not-a-real-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_login_and_me() {
    let (app, _state) = spawn_app().await;
    let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .oneshot(get_request("/api/auth/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    assert_eq!(body["data"]["role"], "admin");
    assert!(body["data"]["password"].is_null());
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            &serde_json::json!({"email": ADMIN_EMAIL, "password": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_starts_pending() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({
                "email": "clerk@example.com",
                "password": "secret99",
                "full_name": "Invoice Clerk"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Duplicate registration is rejected.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({
                "email": "clerk@example.com",
                "password": "secret99"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Pending accounts can log in but cannot reach privileged routes.
    let token = login(&app, "clerk@example.com", "secret99").await;
    let response = app
        .oneshot(get_request("/api/users", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_registration_validation() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({"email": "not-an-email", "password": "secret99"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({"email": "short@example.com", "password": "abc"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_manages_user_accounts() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({
                "email": "newhire@example.com",
                "password": "secret99",
                "full_name": "New Hire"
            }),
        ))
        .await
        .unwrap();

    // Shows up in the pending queue.
    let response = app
        .clone()
        .oneshot(get_request("/api/users/pending", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let pending = body["data"].as_array().unwrap();
    assert!(pending.iter().any(|u| u["email"] == "newhire@example.com"));

    let user_id = pending
        .iter()
        .find(|u| u["email"] == "newhire@example.com")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    // Promote to a regular user.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{user_id}/role"),
            Some(&admin_token),
            &serde_json::json!({"role": "user"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["role"], "user");

    // Unknown role is rejected.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{user_id}/role"),
            Some(&admin_token),
            &serde_json::json!({"role": "overlord"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Deactivated accounts cannot log in.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{user_id}/status"),
            Some(&admin_token),
            &serde_json::json!({"status": "inactive"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            &serde_json::json!({"email": "newhire@example.com", "password": "secret99"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_prompt_activation_is_exclusive() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Migration seeds a default active prompt.
    let response = app
        .clone()
        .oneshot(get_request("/api/prompts/active", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let seeded_id = body["data"]["id"].as_i64().unwrap();

    // Creating a prompt makes it the active one.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/prompts",
            Some(&admin_token),
            &serde_json::json!({
                "name": "Tightened Extraction",
                "prompt_text": {"instructions": "Extract every field as a string."}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let new_id = body["data"]["id"].as_i64().unwrap();
    assert!(body["data"]["is_active"].as_bool().unwrap());
    assert_ne!(new_id, seeded_id);

    // Exactly one prompt stays active.
    let response = app
        .clone()
        .oneshot(get_request("/api/prompts", Some(&admin_token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let prompts = body["data"].as_array().unwrap();
    let active: Vec<_> = prompts
        .iter()
        .filter(|p| p["is_active"].as_bool().unwrap())
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"].as_i64().unwrap(), new_id);

    // Re-activating the seeded prompt flips the active flag back.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/prompts/{seeded_id}"),
            Some(&admin_token),
            &serde_json::json!({"is_active": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/api/prompts/active", Some(&admin_token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"].as_i64().unwrap(), seeded_id);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (app, state) = spawn_app().await;

    // Unknown addresses get the same neutral answer as known ones.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            &serde_json::json!({"email": "ghost@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let neutral = body_json(response).await["data"]["message"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            &serde_json::json!({"email": ADMIN_EMAIL}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"]["message"].as_str().unwrap(),
        neutral
    );

    // Redeem a token issued for the admin account.
    let admin = state
        .store()
        .get_user_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    let token = state.store().issue_reset_token(admin.id).await.unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            &serde_json::json!({"token": &token, "password": "brand-new-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Tokens are single use.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            &serde_json::json!({"token": &token, "password": "another-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Old password no longer works, new one does.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            &serde_json::json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, ADMIN_EMAIL, "brand-new-pass").await;
}

#[tokio::test]
async fn test_issuing_new_reset_token_invalidates_prior() {
    let (app, state) = spawn_app().await;

    let admin = state
        .store()
        .get_user_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    let first = state.store().issue_reset_token(admin.id).await.unwrap();
    let second = state.store().issue_reset_token(admin.id).await.unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            &serde_json::json!({"token": first, "password": "brand-new-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            &serde_json::json!({"token": second, "password": "brand-new-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
