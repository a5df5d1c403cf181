//! Mail identity and dispatch integration tests.

mod common;

use common::{sample_document, TestApp, TEST_SENDER};
use invoicing_service::models::DocumentKind;
use invoicing_service::services::DocumentRepository;
use reqwest::StatusCode;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECOND_SENDER: &str = "billing@example.com";

/// Token exchange for `code` yields `access_token`, whose userinfo is `email`.
async fn mount_identity(server: &MockServer, code: &str, access_token: &str, email: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={}&", code)))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "refresh_token": format!("refresh-{}", access_token),
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.send openid email profile",
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", format!("Bearer {}", access_token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "email": email })))
        .mount(server)
        .await;
}

async fn google_server() -> MockServer {
    let server = MockServer::start().await;
    mount_identity(&server, "auth-code", "access-1", TEST_SENDER).await;
    mount_identity(&server, "second-code", "access-2", SECOND_SENDER).await;
    server
}

/// Run one consent round trip, exchanging `code` at the callback.
async fn authorize_identity(app: &TestApp, server: &MockServer, code: &str) {
    let response = app.get("/mail/authorize").await;
    assert!(response.status().is_redirection());
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with(&format!("{}/o/oauth2/v2/auth", server.uri())));

    let consent = reqwest::Url::parse(&location).unwrap();
    let params: std::collections::HashMap<String, String> =
        consent.query_pairs().into_owned().collect();
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["access_type"], "offline");
    assert!(params["scope"].contains("gmail.send"));

    let callback = app
        .get(&format!(
            "/mail/oauth2callback?code={}&state={}",
            code, params["state"]
        ))
        .await;
    assert!(callback.status().is_redirection());
    assert_eq!(callback.headers()["location"], "/");
}

/// App with one authorized identity, `TEST_SENDER`.
async fn authorized_app(server: &MockServer) -> TestApp {
    let app = TestApp::spawn_with_google(&server.uri()).await;
    authorize_identity(&app, server, "auth-code").await;
    app
}

#[tokio::test]
async fn zero_recipients_is_rejected_before_dispatch() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/mail/send",
            &serde_json::json!({"recipients": [], "subject": "Invoice", "sender": TEST_SENDER}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.mail.send_count(), 0);
}

#[tokio::test]
async fn zero_recipients_on_document_email_saves_nothing() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/invoices/email",
            &serde_json::json!({
                "document": sample_document("invoiceNumber", "INV-1"),
                "recipients": []
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count(DocumentKind::Invoice).await, 0);
    assert_eq!(app.pdf.render_count(), 0);
}

#[tokio::test]
async fn sending_without_identity_requires_authorization() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/mail/send",
            &serde_json::json!({"recipients": ["client@example.com"], "message": "Hello"}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.mail.send_count(), 0);
}

#[tokio::test]
async fn authorize_without_google_credentials_is_config_error() {
    let app = TestApp::spawn().await;

    let response = app.get("/mail/authorize").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Configuration error");
}

#[tokio::test]
async fn callback_with_wrong_state_is_rejected() {
    let server = google_server().await;
    let app = TestApp::spawn_with_google(&server.uri()).await;

    app.get("/mail/authorize").await;
    let response = app
        .get("/mail/oauth2callback?code=auth-code&state=forged")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let accounts: serde_json::Value = app.get("/mail/accounts").await.json().await.unwrap();
    assert_eq!(accounts["accounts"], serde_json::json!([]));
}

#[tokio::test]
async fn declined_consent_is_bad_request() {
    let server = google_server().await;
    let app = TestApp::spawn_with_google(&server.uri()).await;

    let response = app.get("/mail/oauth2callback?error=access_denied").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authorized_identity_is_listed_and_sends_mail() {
    let server = google_server().await;
    let app = authorized_app(&server).await;

    let accounts: serde_json::Value = app.get("/mail/accounts").await.json().await.unwrap();
    assert_eq!(accounts["accounts"], serde_json::json!([TEST_SENDER]));

    let response = app
        .post_json(
            "/mail/send",
            &serde_json::json!({
                "recipients": ["client@example.com"],
                "subject": "Invoice INV-1",
                "message": "Attached.",
                "filename": "INV-1.pdf",
                "attachmentBase64": "JVBERi0xLjQK"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["sender"], TEST_SENDER);
    assert_eq!(body["result"]["id"], "mock-mail-1");
    assert_eq!(app.mail.send_count(), 1);

    let raw = String::from_utf8(app.mail.last_message().unwrap()).unwrap();
    assert!(raw.contains(&format!("From: {}", TEST_SENDER)));
    assert!(raw.contains("To: client@example.com"));
    assert!(raw.contains("INV-1.pdf"));
}

#[tokio::test]
async fn unknown_sender_falls_back_to_first_identity() {
    let server = google_server().await;
    let app = authorized_app(&server).await;

    let response = app
        .post_json(
            "/mail/send?sender=someone-else@example.com",
            &serde_json::json!({"recipients": ["client@example.com"]}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["sender"], TEST_SENDER);
    assert_eq!(app.mail.send_count(), 1);
}

#[tokio::test]
async fn send_without_json_content_type_is_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/mail/send"))
        .body(r#"{"recipients": ["client@example.com"]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Content-Type"));
    assert_eq!(app.mail.send_count(), 0);
}

#[tokio::test]
async fn query_sender_overrides_body_sender_on_document_email() {
    let server = google_server().await;
    let app = authorized_app(&server).await;
    authorize_identity(&app, &server, "second-code").await;

    let accounts: serde_json::Value = app.get("/mail/accounts").await.json().await.unwrap();
    assert_eq!(accounts["accounts"], serde_json::json!([TEST_SENDER, SECOND_SENDER]));

    let response = app
        .post_json(
            &format!("/quotations/email?sender={}", SECOND_SENDER),
            &serde_json::json!({
                "document": sample_document("quotationNumber", "QT-9"),
                "recipients": ["jane@acme.test"],
                "sender": TEST_SENDER
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["sender"], SECOND_SENDER);

    let raw = String::from_utf8(app.mail.last_message().unwrap()).unwrap();
    assert!(raw.contains(&format!("From: {}", SECOND_SENDER)));
}

#[tokio::test]
async fn emailing_invoice_saves_renders_and_attaches_pdf() {
    let server = google_server().await;
    let app = authorized_app(&server).await;

    let response = app
        .post_json(
            "/invoices/email",
            &serde_json::json!({
                "document": sample_document("invoiceNumber", "INV-1001"),
                "recipients": ["jane@acme.test"],
                "sender": TEST_SENDER
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.pdf.render_count(), 1);
    assert_eq!(app.mail.send_count(), 1);

    let stored = app
        .store
        .find_by_number(DocumentKind::Invoice, "INV-1001")
        .await
        .unwrap()
        .expect("invoice saved before sending");
    assert_eq!(stored.status, "sent");

    let raw = String::from_utf8(app.mail.last_message().unwrap()).unwrap();
    assert!(raw.contains("Subject: Invoice INV-1001"));
    assert!(raw.contains("INV-1001.pdf"));
    assert!(raw.contains("application/pdf"));
}

#[tokio::test]
async fn removing_last_identity_requires_authorization_again() {
    let server = google_server().await;
    let app = authorized_app(&server).await;

    let response = app
        .client
        .delete(app.url(&format!("/mail/accounts/{}", TEST_SENDER)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);

    let accounts: serde_json::Value = app.get("/mail/accounts").await.json().await.unwrap();
    assert_eq!(accounts["accounts"], serde_json::json!([]));

    let response = app
        .post_json(
            "/mail/send",
            &serde_json::json!({"recipients": ["client@example.com"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
