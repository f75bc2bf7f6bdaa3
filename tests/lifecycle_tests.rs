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

fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
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

fn multipart_upload(
    uri: &str,
    token: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let boundary = "factura-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap()
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

/// Registers an account and promotes it to a regular user.
async fn provision_user(app: &Router, admin_token: &str, email: &str) -> String {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            &serde_json::json!({"email": email, "password": "secret99", "full_name": "Clerk"}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/api/users/pending", Some(admin_token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let user_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == email)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    app.clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{user_id}/role"),
            Some(admin_token),
            &serde_json::json!({"role": "user"}),
        ))
        .await
        .unwrap();

    login(app, email, "secret99").await
}

#[tokio::test]
async fn test_manual_invoice_full_lifecycle() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Create.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/invoices/manual",
            Some(&admin_token),
            &serde_json::json!({
                "invoice_number": "INV-1001",
                "currency": "EUR",
                "net_total": "1,250.50",
                "received_by_signature": "Yes"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["invoice_number"], "INV-1001");
    assert_eq!(body["data"]["extracted_data"]["has_signatures"], "Yes");
    let invoice_id = body["data"]["invoice_id"].as_i64().unwrap();

    // Starts pending; net total parsed from the grouped string.
    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["file_type"], "manual");
    assert_eq!(body["data"]["net_total"].as_f64().unwrap(), 1250.5);
    assert_eq!(body["data"]["user_email"], ADMIN_EMAIL);
    assert!(body["data"]["reviewed_by"].is_null());

    // Editing sends it back to review.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
            &serde_json::json!({"currency": "USD", "delivered_by_signature": "No"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "review");
    assert_eq!(body["data"]["currency"], "USD");
    // Signatures are recomputed from the edited values.
    assert_eq!(body["data"]["has_signatures"], "No");

    // Approve.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/invoices/{invoice_id}/review"),
            Some(&admin_token),
            &serde_json::json!({"action": "approve"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["reviewer_email"], ADMIN_EMAIL);
    assert!(body["data"]["reviewed_at"].is_string());
}

#[tokio::test]
async fn test_duplicate_number_conflict_and_cancel_reuse() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let create = |number: &str| {
        json_request(
            "POST",
            "/api/invoices/manual",
            Some(&admin_token),
            &serde_json::json!({"invoice_number": number}),
        )
    };

    let response = app.clone().oneshot(create("INV-2001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let invoice_id = body_json(response).await["data"]["invoice_id"]
        .as_i64()
        .unwrap();

    let response = app.clone().oneshot(create("INV-2001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Cancelling frees the number for a fresh invoice.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/invoices/{invoice_id}/cancel"),
            Some(&admin_token),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(create("INV-2001")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Cancelled invoices stay immutable.
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
            &serde_json::json!({"currency": "EUR"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_review_requires_supervisor_or_admin() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user_token = provision_user(&app, &admin_token, "clerk@example.com").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/invoices/manual",
            Some(&user_token),
            &serde_json::json!({"invoice_number": "INV-3001"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let invoice_id = body_json(response).await["data"]["invoice_id"]
        .as_i64()
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/invoices/{invoice_id}/review"),
            Some(&user_token),
            &serde_json::json!({"action": "reject"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/invoices/{invoice_id}/review"),
            Some(&admin_token),
            &serde_json::json!({"action": "reject"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invoice_list_pagination_and_filter() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    for n in 1..=3 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/invoices/manual",
                Some(&admin_token),
                &serde_json::json!({"invoice_number": format!("INV-40{n:02}")}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/invoices?limit=2", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["invoices"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pagination"]["total"], 3);
    assert_eq!(body["data"]["pagination"]["total_pages"], 2);

    let response = app
        .clone()
        .oneshot(get_request(
            "/api/invoices?status=approved",
            Some(&admin_token),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 0);

    let response = app
        .oneshot(get_request("/api/invoices?status=bogus", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_extension() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .oneshot(multipart_upload(
            "/api/invoices/upload",
            &admin_token,
            "notes.txt",
            mime::TEXT_PLAIN.as_ref(),
            b"not an invoice",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pdf_upload_persists_failed_extraction() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(multipart_upload(
            "/api/invoices/upload",
            &admin_token,
            "scan.pdf",
            mime::APPLICATION_PDF.as_ref(),
            b"%PDF-1.4 fake",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let failure = body_json(response).await;
    assert_eq!(failure["success"], false);
    assert!(failure["error"].as_str().unwrap().contains("manual"));
    let failed_id = failure["data"]["invoice_id"].as_i64().unwrap();

    // The upload is still recorded for manual follow-up, and the failure
    // response points at the persisted row.
    let response = app
        .oneshot(get_request("/api/invoices", Some(&admin_token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let invoices = body["data"]["invoices"].as_array().unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["id"].as_i64().unwrap(), failed_id);
    assert!(invoices[0]["invoice_number"]
        .as_str()
        .unwrap()
        .starts_with("ERROR_"));
    assert_eq!(invoices[0]["file_type"], "pdf");
}

#[tokio::test]
async fn test_file_download_roundtrip() {
    let (app, state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // PDF uploads keep their bytes even though extraction fails.
    app.clone()
        .oneshot(multipart_upload(
            "/api/invoices/upload",
            &admin_token,
            "scan.pdf",
            mime::APPLICATION_PDF.as_ref(),
            b"%PDF-1.4 fake",
        ))
        .await
        .unwrap();

    let (invoices, _) = state
        .store()
        .list_invoices(&factura::db::ListFilter {
            status: None,
            only_user: None,
            page: 1,
            per_page: 10,
        })
        .await
        .unwrap();
    let invoice_id = invoices[0].id;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/api/invoices/{invoice_id}/file"),
            Some(&admin_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["Content-Type"].to_str().unwrap(),
        "application/pdf"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"%PDF-1.4 fake");

    // Manual entries carry no file.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/invoices/manual",
            Some(&admin_token),
            &serde_json::json!({"invoice_number": "INV-5001"}),
        ))
        .await
        .unwrap();
    let manual_id = body_json(response).await["data"]["invoice_id"]
        .as_i64()
        .unwrap();

    let response = app
        .oneshot(get_request(
            &format!("/api/invoices/{manual_id}/file"),
            Some(&admin_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_stats_scoped_by_role() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user_token = provision_user(&app, &admin_token, "clerk@example.com").await;

    // One invoice from each account.
    for (token, number) in [(&admin_token, "INV-6001"), (&user_token, "INV-6002")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/invoices/manual",
                Some(token),
                &serde_json::json!({"invoice_number": number}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Admin sees everything.
    let response = app
        .clone()
        .oneshot(get_request("/api/dashboard/stats", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_invoices"], 2);
    assert_eq!(body["data"]["pending_invoices"], 2);
    assert_eq!(body["data"]["recent_invoices"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["monthly_stats"].as_array().unwrap().len(), 6);
    let this_month = &body["data"]["monthly_stats"].as_array().unwrap()[5];
    assert_eq!(this_month["count"], 2);

    // Regular users only see their own numbers.
    let response = app
        .oneshot(get_request("/api/dashboard/stats", Some(&user_token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_invoices"], 1);
    assert_eq!(
        body["data"]["recent_invoices"][0]["invoice_number"],
        "INV-6002"
    );
}

#[tokio::test]
async fn test_export_files_written_on_create_and_edit() {
    let (app, state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/invoices/manual",
            Some(&admin_token),
            &serde_json::json!({"invoice_number": "INV-7001", "currency": "EUR"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let invoice_id = body["data"]["invoice_id"].as_i64().unwrap();

    let json_path = state.exporter().json_path("INV-7001");
    let xml_path = state.exporter().xml_path("INV-7001");
    assert!(json_path.exists());
    assert!(xml_path.exists());

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(exported["currency"], "EUR");

    // Edits rewrite both files.
    app.clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/invoices/{invoice_id}"),
            Some(&admin_token),
            &serde_json::json!({"currency": "USD"}),
        ))
        .await
        .unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(exported["currency"], "USD");

    let xml = std::fs::read_to_string(&xml_path).unwrap();
    assert!(xml.contains("<currency>USD</currency>"));
}

#[tokio::test]
async fn test_get_unknown_invoice_is_404() {
    let (app, _state) = spawn_app().await;
    let admin_token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .oneshot(get_request("/api/invoices/9999", Some(&admin_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
