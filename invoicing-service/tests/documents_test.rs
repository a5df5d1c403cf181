//! Document save, amend, preview, PDF and activity integration tests.

mod common;

use chrono::{DateTime, Utc};
use common::{sample_document, TestApp};
use invoicing_service::models::DocumentKind;
use invoicing_service::services::DocumentRepository;
use reqwest::StatusCode;

#[tokio::test]
async fn saving_invoice_snapshots_server_side_totals() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/invoices", &sample_document("invoiceNumber", "INV-1001"))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["action"], "inserted");
    assert_eq!(body["kind"], "invoice");
    assert_eq!(body["documentNumber"], "INV-1001");
    assert_eq!(body["subtotalCents"], 280000);
    assert_eq!(body["taxCents"], 23800);
    assert_eq!(body["totalCents"], 303800);
    assert_eq!(body["status"], "draft");
}

#[tokio::test]
async fn quotation_resave_updates_in_place() {
    let app = TestApp::spawn().await;
    let mut quotation = sample_document("quotationNumber", "QT-7");

    let first = app.post_json("/quotations", &quotation).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: serde_json::Value = first.json().await.unwrap();

    quotation["project"] = serde_json::json!("Website rebuild, phase 2");
    quotation["items"] = serde_json::json!([{"title": "Phase 2", "quantity": 1, "unitPrice": 1000}]);
    let second = app.post_json("/quotations", &quotation).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: serde_json::Value = second.json().await.unwrap();

    assert_eq!(second["action"], "updated");
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["createdAt"], first["createdAt"]);
    assert_ne!(second["updatedAt"], first["updatedAt"]);
    assert_eq!(second["subtotalCents"], 100000);
    assert_eq!(second["totalCents"], 108500);

    assert_eq!(app.store.count(DocumentKind::Quotation).await, 1);
    let stored = app
        .store
        .find_by_number(DocumentKind::Quotation, "QT-7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.project.as_deref(), Some("Website rebuild, phase 2"));
    assert_eq!(stored.line_item_count, 1);
}

#[tokio::test]
async fn duplicate_invoice_number_is_conflict_and_keeps_original() {
    let app = TestApp::spawn().await;
    let original = sample_document("invoiceNumber", "INV-2002");

    let response = app.post_json("/invoices", &original).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let mut changed = original.clone();
    changed["items"] = serde_json::json!([{"title": "Other", "quantity": 1, "unitPrice": 1}]);
    let response = app.post_json("/invoices", &changed).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = app
        .store
        .find_by_number(DocumentKind::Invoice, "INV-2002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_cents, 303800);
    assert_eq!(app.store.count(DocumentKind::Invoice).await, 1);
}

#[tokio::test]
async fn amending_invoice_overwrites_existing_row() {
    let app = TestApp::spawn().await;
    let mut invoice = sample_document("invoiceNumber", "INV-3003");

    let missing = app.put_json("/invoices/INV-3003", &invoice).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let created = app.post_json("/invoices", &invoice).await;
    let created: serde_json::Value = created.json().await.unwrap();

    invoice["status"] = serde_json::json!("paid");
    let amended = app.put_json("/invoices/INV-3003", &invoice).await;
    assert_eq!(amended.status(), StatusCode::OK);
    let amended: serde_json::Value = amended.json().await.unwrap();
    assert_eq!(amended["action"], "updated");
    assert_eq!(amended["id"], created["id"]);
    assert_eq!(amended["status"], "paid");

    let mismatched = app.put_json("/invoices/INV-9999", &invoice).await;
    assert_eq!(mismatched.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_line_items_are_rejected() {
    let app = TestApp::spawn().await;
    let mut invoice = sample_document("invoiceNumber", "INV-4004");
    invoice["items"] = serde_json::json!([{"title": "Build", "quantity": 0, "unitPrice": 10}]);

    let response = app.post_json("/invoices", &invoice).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count(DocumentKind::Invoice).await, 0);
}

#[tokio::test]
async fn malformed_body_is_json_bad_request() {
    let app = TestApp::spawn().await;
    let mut invoice = sample_document("invoiceNumber", "INV-4005");
    invoice["taxRate"] = serde_json::json!("abc");

    let response = app.post_json("/invoices", &invoice).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    assert_eq!(app.store.count(DocumentKind::Invoice).await, 0);
}

#[tokio::test]
async fn action_names_cannot_be_document_numbers() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/invoices", &sample_document("invoiceNumber", "pdf"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count(DocumentKind::Invoice).await, 0);
}

#[tokio::test]
async fn preview_renders_escaped_html() {
    let app = TestApp::spawn().await;
    let mut invoice = sample_document("invoiceNumber", "INV-5005");
    invoice["billTo"]["name"] = serde_json::json!("<script>alert(1)</script>");

    let response = app.post_json("/invoices/preview", &invoice).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let html = response.text().await.unwrap();
    assert!(html.contains("INVOICE"));
    assert!(html.contains("INV-5005"));
    assert!(html.contains("$3,038.00"));
    assert!(html.contains("Tax (8.50%)"));
    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn preview_is_deterministic() {
    let app = TestApp::spawn().await;
    let quotation = sample_document("quotationNumber", "QT-6006");

    let first = app.post_json("/quotations/preview", &quotation).await.text().await.unwrap();
    let second = app.post_json("/quotations/preview", &quotation).await.text().await.unwrap();

    assert_eq!(first, second);
    assert!(first.contains("QUOTATION"));
    assert!(first.contains("Valid Until") || first.contains("Quote Date"));
}

#[tokio::test]
async fn pdf_of_minimal_document_is_attachment() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/quotations/pdf",
            &serde_json::json!({"items": [{"title": "Consulting", "qty": 1, "unitPrice": 0}]}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"quotation.pdf\""
    );
    let bytes = response.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert_eq!(app.pdf.render_count(), 1);
    assert_eq!(app.store.count(DocumentKind::Quotation).await, 0);
}

#[tokio::test]
async fn pdf_filename_is_sanitized_and_save_is_optional() {
    let app = TestApp::spawn().await;
    let invoice = sample_document("invoiceNumber", "INV 7/007");

    let response = app.post_json("/invoices/pdf?save=true&format=Letter", &invoice).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"INV_7_007.pdf\""
    );
    let stored = app
        .store
        .find_by_number(DocumentKind::Invoice, "INV 7/007")
        .await
        .unwrap()
        .expect("document saved before download");
    assert_eq!(stored.status, "draft");

    // Re-downloading an already saved invoice still succeeds.
    let again = app.post_json("/invoices/pdf?save=true", &invoice).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn pdf_rejects_out_of_range_scale() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/invoices/pdf?scale=5", &sample_document("invoiceNumber", "INV-8"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.pdf.render_count(), 0);
}

#[tokio::test]
async fn activity_merges_both_kinds_oldest_first() {
    let app = TestApp::spawn().await;
    for number in ["INV-A1", "INV-A2", "INV-A3"] {
        app.post_json("/invoices", &sample_document("invoiceNumber", number)).await;
    }
    for number in ["QT-A1", "QT-A2"] {
        app.post_json("/quotations", &sample_document("quotationNumber", number)).await;
    }

    let response = app.get("/activity?limit=4").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 4);

    let created: Vec<DateTime<Utc>> = items
        .iter()
        .map(|i| i["createdAt"].as_str().unwrap().parse().unwrap())
        .collect();
    let mut sorted = created.clone();
    sorted.sort();
    assert_eq!(created, sorted);

    let numbers: Vec<&str> = items.iter().map(|i| i["number"].as_str().unwrap()).collect();
    assert!(!numbers.contains(&"INV-A1"));
    assert!(numbers.contains(&"QT-A2"));

    let entry = &items[0];
    assert_eq!(entry["clientName"], "Jane Client");
    assert_eq!(entry["clientCompany"], "Acme Corp");
    assert_eq!(entry["amountCents"], 303800);
}
