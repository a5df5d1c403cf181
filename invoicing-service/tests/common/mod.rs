//! Test helper module for invoicing-service integration tests.
//!
//! Spawns the HTTP app on a random port with the in-memory store and mock
//! PDF and mail backends.

#![allow(dead_code)]

use invoicing_service::config::{
    DocumentDefaults, GoogleConfig, InvoicingConfig, MailConfig, MailProviderKind, PdfConfig,
    PdfEngine, SessionConfig,
};
use invoicing_service::services::pdf::PageFormat;
use invoicing_service::services::{init_metrics, MemoryStore, MockMailProvider, MockPdfRenderer};
use invoicing_service::startup::{Application, Providers};
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;

pub const TEST_SENDER: &str = "owner@example.com";

pub fn test_config(google: Option<GoogleConfig>) -> InvoicingConfig {
    InvoicingConfig {
        common: CoreConfig {
            port: 0,
            environment: "test".to_string(),
        },
        service_name: "invoicing-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: None,
        google,
        mail: MailConfig {
            provider: MailProviderKind::Mock,
            gmail_api_url: "http://127.0.0.1:1".to_string(),
            token_encryption_key: None,
        },
        session: SessionConfig {
            secure_cookie: false,
        },
        pdf: PdfConfig {
            engine: PdfEngine::Mock,
            chromium_path: "chromium".to_string(),
            timeout_secs: 5,
            default_format: PageFormat::A4,
            default_scale: 1.0,
        },
        documents: DocumentDefaults {
            logo_url: None,
            currency: "USD".to_string(),
        },
    }
}

/// Google endpoints served by a wiremock server at `base_url`.
pub fn google_config(base_url: &str) -> GoogleConfig {
    GoogleConfig {
        client_id: "test-client".to_string(),
        client_secret: Secret::new("test-secret".to_string()),
        redirect_uri: "http://localhost/mail/oauth2callback".to_string(),
        auth_url: format!("{}/o/oauth2/v2/auth", base_url),
        token_url: format!("{}/token", base_url),
        userinfo_url: format!("{}/userinfo", base_url),
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<MemoryStore>,
    pub pdf: Arc<MockPdfRenderer>,
    pub mail: Arc<MockMailProvider>,
    /// Keeps the session cookie between requests; never follows redirects.
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(None)).await
    }

    pub async fn spawn_with_google(base_url: &str) -> Self {
        Self::spawn_with(test_config(Some(google_config(base_url)))).await
    }

    pub async fn spawn_with(config: InvoicingConfig) -> Self {
        init_metrics();

        let store = Arc::new(MemoryStore::new());
        let pdf = Arc::new(MockPdfRenderer::new());
        let mail = Arc::new(MockMailProvider::new());

        let providers = Providers {
            repository: store.clone(),
            pdf: pdf.clone(),
            mail: mail.clone(),
        };

        let app = Application::build_with_providers(config, providers)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        // Wait for HTTP server to be ready by polling health endpoint
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            pdf,
            mail,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// The two-line example document: 2500 + 2 x 150 at 8.5% tax.
pub fn sample_document(number_field: &str, number: &str) -> serde_json::Value {
    let mut document = serde_json::json!({
        "billTo": {
            "name": "Jane Client",
            "company": "Acme Corp",
            "addressLine1": "1 Main St",
            "email": "jane@acme.test",
            "phone": "555-0101"
        },
        "from": {
            "name": "Studio Owner",
            "company": "Studio LLC",
            "email": "billing@studio.test"
        },
        "project": "Website rebuild",
        "items": [
            {"title": "Build", "description": "Design and build", "quantity": 1, "unitPrice": 2500},
            {"title": "Training", "qty": 2, "unitPrice": 150}
        ],
        "taxRate": 0.085,
        "terms": ["Net 30"]
    });
    document[number_field] = serde_json::json!(number);
    document
}
