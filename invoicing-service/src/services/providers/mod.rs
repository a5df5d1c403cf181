pub mod gmail;

use async_trait::async_trait;
use serde::Serialize;
use service_core::error::AppError;
use thiserror::Error;

pub use gmail::{GmailProvider, MockMailProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    /// The provider rejected the bearer token.
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Authentication(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ProviderError::Connection(msg) | ProviderError::SendFailed(msg) => {
                AppError::EmailError(msg)
            }
        }
    }
}

/// Identifiers the provider assigned to a sent message.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub id: Option<String>,
    pub thread_id: Option<String>,
}

/// Submits an already encoded RFC 5322 message on behalf of the token owner.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send(&self, access_token: &str, raw: &[u8]) -> Result<ProviderResponse, ProviderError>;
    fn name(&self) -> &'static str;
}
