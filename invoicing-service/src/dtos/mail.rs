use super::documents::DocumentPayload;
use crate::services::mailer::{DispatchReceipt, MailAttachment, OutgoingMail};
use crate::services::providers::ProviderResponse;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SenderQuery {
    pub sender: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<String>,
}

/// Raw send: the caller supplies the attachment itself.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "No recipients provided"))]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub attachment_base64: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

/// Standard or URL-safe base64, padding optional, whitespace ignored.
fn decode_attachment(encoded: &str) -> Result<Vec<u8>, AppError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let padded = match compact.len() % 4 {
        2 => format!("{}==", compact),
        3 => format!("{}=", compact),
        _ => compact,
    };
    STANDARD
        .decode(&padded)
        .or_else(|_| URL_SAFE.decode(&padded))
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Attachment is not valid base64: {}", e)))
}

impl SendMailRequest {
    pub fn into_mail(self) -> Result<OutgoingMail, AppError> {
        let attachment = match (self.attachment_base64, self.filename) {
            (Some(encoded), filename) if !encoded.trim().is_empty() => Some(MailAttachment {
                filename: filename
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or_else(|| "document.pdf".to_string()),
                content: decode_attachment(&encoded)?,
            }),
            _ => None,
        };

        Ok(OutgoingMail {
            recipients: self.recipients,
            subject: self.subject.unwrap_or_default(),
            body: self.message.unwrap_or_default(),
            attachment,
        })
    }
}

/// Render a document to PDF and mail it.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailDocumentRequest {
    #[serde(default)]
    pub document: DocumentPayload,
    #[serde(default)]
    #[validate(length(min = 1, message = "No recipients provided"))]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub scale: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SendMailResponse {
    pub ok: bool,
    pub sender: String,
    pub result: ProviderResponse,
}

impl From<DispatchReceipt> for SendMailResponse {
    fn from(receipt: DispatchReceipt) -> Self {
        Self {
            ok: true,
            sender: receipt.sender,
            result: receipt.result,
        }
    }
}
