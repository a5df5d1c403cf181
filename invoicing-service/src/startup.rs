//! Application startup and lifecycle management.

use crate::config::{InvoicingConfig, MailProviderKind, PdfEngine};
use crate::handlers::{self, activity, documents, mail};
use crate::services::{
    ChromiumRenderer, Database, DocumentRepository, GmailProvider, GoogleOAuthClient,
    IdentityVault, MailDispatcher, MailProvider, MemoryStore, MockMailProvider, MockPdfRenderer,
    PdfRenderer, TokenCipher,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::{install_http_recorder, metrics_middleware},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore as SessionStore, SessionManagerLayer};

/// Request bodies carry logos and base64 attachments.
const BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;
const SESSION_COOKIE: &str = "invoicing.sid";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InvoicingConfig>,
    pub repository: Arc<dyn DocumentRepository>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub mailer: Arc<MailDispatcher>,
}

/// Backends behind the handlers.
pub struct Providers {
    pub repository: Arc<dyn DocumentRepository>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub mail: Arc<dyn MailProvider>,
}

impl Providers {
    /// Pick backends from configuration. Connects to PostgreSQL and runs
    /// migrations when a database is configured.
    pub async fn from_config(config: &InvoicingConfig) -> Result<Self, AppError> {
        let repository: Arc<dyn DocumentRepository> = match &config.database {
            Some(db_config) => {
                let db = Database::new(
                    &db_config.url,
                    db_config.max_connections,
                    db_config.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                db.run_migrations().await?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, documents are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let pdf: Arc<dyn PdfRenderer> = match config.pdf.engine {
            PdfEngine::Chromium => {
                tracing::info!(binary = %config.pdf.chromium_path, "Chromium PDF renderer initialized");
                Arc::new(ChromiumRenderer::new(
                    config.pdf.chromium_path.clone(),
                    Duration::from_secs(config.pdf.timeout_secs),
                ))
            }
            PdfEngine::Mock => {
                tracing::info!("Using mock PDF renderer");
                Arc::new(MockPdfRenderer::new())
            }
        };

        let mail: Arc<dyn MailProvider> = match config.mail.provider {
            MailProviderKind::Gmail => {
                tracing::info!("Gmail mail provider initialized");
                Arc::new(GmailProvider::new(config.mail.gmail_api_url.clone())?)
            }
            MailProviderKind::Mock => {
                tracing::info!("Using mock mail provider");
                Arc::new(MockMailProvider::new())
            }
        };

        Ok(Self {
            repository,
            pdf,
            mail,
        })
    }
}

fn token_cipher(config: &InvoicingConfig) -> Result<TokenCipher, AppError> {
    match &config.mail.token_encryption_key {
        Some(key) => TokenCipher::from_base64(key.expose_secret()),
        None => {
            tracing::warn!(
                "TOKEN_ENCRYPTION_KEY not set, using a per-process key; mail identities will not survive a restart"
            );
            Ok(TokenCipher::random())
        }
    }
}

impl AppState {
    pub fn new(config: InvoicingConfig, providers: Providers) -> Result<Self, AppError> {
        let oauth = match &config.google {
            Some(google) => Some(GoogleOAuthClient::new(google.clone())?),
            None => {
                tracing::warn!("Google OAuth is not configured, mail endpoints are disabled");
                None
            }
        };
        let vault = IdentityVault::new(token_cipher(&config)?);

        Ok(Self {
            mailer: Arc::new(MailDispatcher::new(providers.mail, oauth, vault)),
            repository: providers.repository,
            pdf: providers.pdf,
            config: Arc::new(config),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    install_http_recorder();

    let session_layer = SessionManagerLayer::new(SessionStore::default())
        .with_name(SESSION_COOKIE)
        .with_secure(state.config.session.secure_cookie)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(365)));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/invoices", post(documents::save_invoice))
        .route("/invoices/:number", put(documents::amend_invoice))
        .route("/invoices/preview", post(documents::preview_invoice))
        .route("/invoices/pdf", post(documents::invoice_pdf))
        .route("/invoices/email", post(documents::email_invoice))
        .route("/quotations", post(documents::save_quotation))
        .route("/quotations/:number", put(documents::amend_quotation))
        .route("/quotations/preview", post(documents::preview_quotation))
        .route("/quotations/pdf", post(documents::quotation_pdf))
        .route("/quotations/email", post(documents::email_quotation))
        .route("/activity", get(activity::recent_activity))
        .route("/mail/authorize", get(mail::authorize))
        .route("/mail/oauth2callback", get(mail::oauth_callback))
        .route("/mail/accounts", get(mail::list_accounts))
        .route("/mail/accounts/:email", delete(mail::remove_account))
        .route("/mail/send", post(mail::send_mail))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(session_layer)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    /// Build the application with backends chosen by configuration.
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let providers = Providers::from_config(&config).await?;
        Self::build_with_providers(config, providers).await
    }

    /// Build the application around explicit backends.
    pub async fn build_with_providers(
        config: InvoicingConfig,
        providers: Providers,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState::new(config, providers)?;
        let app = build_router(state);

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Invoicing service listening on port {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
