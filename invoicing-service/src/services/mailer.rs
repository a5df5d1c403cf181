//! Outgoing mail: MIME assembly and dispatch through an authorized identity.

use crate::services::google::GoogleOAuthClient;
use crate::services::metrics::MAILS_SENT_TOTAL;
use crate::services::providers::{MailProvider, ProviderResponse};
use crate::services::vault::IdentityVault;
use chrono::Utc;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

pub const DEFAULT_SUBJECT: &str = "Invoice";

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

impl OutgoingMail {
    /// Parsed recipient mailboxes. Fails on an empty list or any malformed
    /// address.
    pub fn mailboxes(&self) -> Result<Vec<Mailbox>, AppError> {
        let recipients: Vec<&str> = self
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();

        if recipients.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("No recipients provided")));
        }

        recipients
            .into_iter()
            .map(|r| {
                r.parse::<Mailbox>().map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Invalid recipient '{}': {}", r, e))
                })
            })
            .collect()
    }
}

/// `multipart/mixed` with a plain-text body and an optional PDF attachment.
pub fn build_message(from: &str, mail: &OutgoingMail) -> Result<Message, AppError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| AppError::EmailError(format!("Invalid sender address: {}", e)))?;

    let subject = if mail.subject.trim().is_empty() {
        DEFAULT_SUBJECT
    } else {
        mail.subject.as_str()
    };

    let mut builder = Message::builder().from(from).subject(subject);
    for mailbox in mail.mailboxes()? {
        builder = builder.to(mailbox);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    if let Some(attachment) = &mail.attachment {
        let content_type: ContentType = "application/pdf"
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid content type: {}", e)))?;
        parts = parts.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.content.clone(), content_type),
        );
    }

    Ok(builder.multipart(parts)?)
}

/// Where a dispatched message went.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub sender: String,
    pub result: ProviderResponse,
}

/// Sends mail as one of the caller's authorized identities.
pub struct MailDispatcher {
    provider: Arc<dyn MailProvider>,
    oauth: Option<GoogleOAuthClient>,
    vault: IdentityVault,
}

impl MailDispatcher {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        oauth: Option<GoogleOAuthClient>,
        vault: IdentityVault,
    ) -> Self {
        Self {
            provider,
            oauth,
            vault,
        }
    }

    pub fn vault(&self) -> &IdentityVault {
        &self.vault
    }

    /// The OAuth client, or a configuration error when Google credentials
    /// are not set.
    pub fn oauth(&self) -> Result<&GoogleOAuthClient, AppError> {
        self.oauth.as_ref().ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set to send mail"
            ))
        })
    }

    /// Validate, pick the sender, refresh its token if needed, then submit.
    ///
    /// Recipients are checked before the session or any provider is touched.
    #[instrument(skip_all, fields(provider = self.provider.name(), recipients = mail.recipients.len()))]
    pub async fn dispatch(
        &self,
        session: &Session,
        mail: &OutgoingMail,
        sender: Option<&str>,
    ) -> Result<DispatchReceipt, AppError> {
        mail.mailboxes()?;

        let (email, mut tokens) = self.vault.choose(session, sender).await?;

        if tokens.is_expired(Utc::now()) {
            info!(sender = %email, "Refreshing expired access token");
            tokens = self.oauth()?.refresh(&tokens).await?;
            self.vault.store(session, &email, &tokens).await?;
        }

        let raw = build_message(&email, mail)?.formatted();

        match self.provider.send(&tokens.access_token, &raw).await {
            Ok(result) => {
                MAILS_SENT_TOTAL
                    .with_label_values(&[self.provider.name(), "success"])
                    .inc();
                info!(sender = %email, id = ?result.id, "Mail dispatched");
                Ok(DispatchReceipt {
                    sender: email,
                    result,
                })
            }
            Err(e) => {
                MAILS_SENT_TOTAL
                    .with_label_values(&[self.provider.name(), "failure"])
                    .inc();
                warn!(sender = %email, error = %e, "Mail dispatch failed");
                Err(e.into())
            }
        }
    }
}
