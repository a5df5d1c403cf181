use super::{MailProvider, ProviderError, ProviderResponse};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use service_core::observability::TracedClientExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    id: Option<String>,
    thread_id: Option<String>,
}

/// Gmail REST `users.messages.send`.
pub struct GmailProvider {
    api_base: String,
    http: reqwest::Client,
}

impl GmailProvider {
    pub fn new(api_base: impl Into<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Connection(format!("Failed to build client: {}", e)))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    #[tracing::instrument(skip_all, fields(raw_bytes = raw.len()))]
    async fn send(&self, access_token: &str, raw: &[u8]) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_base);
        let body = json!({ "raw": URL_SAFE_NO_PAD.encode(raw) });

        let response = self
            .http
            .traced_post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Gmail unreachable: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Authentication(
                "Gmail rejected the access token".to_string(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %text, "Gmail send failed");
            return Err(ProviderError::SendFailed(format!(
                "Gmail returned {}: {}",
                status, text
            )));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::SendFailed(format!("Invalid Gmail response: {}", e)))?;

        tracing::info!(message_id = ?sent.id, "Mail sent through Gmail");

        Ok(ProviderResponse {
            id: sent.id,
            thread_id: sent.thread_id,
        })
    }

    fn name(&self) -> &'static str {
        "gmail"
    }
}

/// Mock mail provider for testing
pub struct MockMailProvider {
    reject_token: bool,
    send_count: AtomicU64,
    last_message: Mutex<Option<Vec<u8>>>,
}

impl MockMailProvider {
    pub fn new() -> Self {
        Self {
            reject_token: false,
            send_count: AtomicU64::new(0),
            last_message: Mutex::new(None),
        }
    }

    /// A provider that answers every send as if the token were revoked.
    pub fn rejecting() -> Self {
        Self {
            reject_token: true,
            ..Self::new()
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Raw bytes of the most recent message.
    pub fn last_message(&self) -> Option<Vec<u8>> {
        self.last_message
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

impl Default for MockMailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailProvider for MockMailProvider {
    async fn send(&self, _access_token: &str, raw: &[u8]) -> Result<ProviderResponse, ProviderError> {
        if self.reject_token {
            return Err(ProviderError::Authentication(
                "Mock provider rejected the token".to_string(),
            ));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut last) = self.last_message.lock() {
            *last = Some(raw.to_vec());
        }

        tracing::info!(raw_bytes = raw.len(), "[MOCK] Mail would be sent");

        Ok(ProviderResponse {
            id: Some(format!("mock-mail-{}", count)),
            thread_id: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
