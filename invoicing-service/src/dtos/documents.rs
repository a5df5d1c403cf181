use crate::config::DocumentDefaults;
use crate::models::{
    ActivityEntry, DocumentContent, DocumentItem, DocumentKind, DocumentRecord, PartyBlock,
    SaveAction,
};
use crate::services::reconciler::SaveOutcome;
use crate::services::totals::Totals;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

/// Document data as submitted by the editor.
///
/// Every field is optional so previews of half-filled forms still render.
/// Saving applies the stricter checks in [`DocumentPayload::to_record`].
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentPayload {
    #[serde(alias = "invoiceNumber", alias = "quotationNumber", alias = "number")]
    #[validate(length(max = 64, message = "Document number must be at most 64 characters"))]
    pub document_number: Option<String>,
    pub customer_id: Option<i32>,
    pub bill_to: PartyBlock,
    pub from: PartyBlock,
    #[validate(length(max = 255, message = "Project must be at most 255 characters"))]
    pub project: Option<String>,
    #[serde(alias = "invoiceDate", alias = "quoteDate")]
    #[validate(length(max = 64))]
    pub issued_at: Option<String>,
    #[serde(alias = "dueDate", alias = "dueAt", alias = "validUntil")]
    #[validate(length(max = 64))]
    pub deadline: Option<String>,
    #[validate(length(max = 128))]
    pub payment_terms: Option<String>,
    pub items: Vec<DocumentItem>,
    pub tax_rate: Decimal,
    pub terms: Vec<String>,
    pub logo_url: Option<String>,
    pub company_contact_email: Option<String>,
    pub company_contact_phone: Option<String>,
    pub currency: Option<String>,
    #[validate(length(max = 32, message = "Status must be at most 32 characters"))]
    pub status: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: Option<i32>,
}

/// Path segments routed to document actions, so never usable as a number.
const RESERVED_NUMBERS: [&str; 3] = ["preview", "pdf", "email"];

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Only web and inline image URLs are placed in `<img src>`.
fn is_embeddable_logo(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("data:image/")
}

fn bad_request(msg: String) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(msg))
}

impl DocumentPayload {
    pub fn number(&self) -> Option<String> {
        trimmed(&self.document_number)
    }

    /// Name for the PDF download: the number, or the kind when unnumbered.
    pub fn file_stem(&self, kind: DocumentKind) -> String {
        self.number().unwrap_or_else(|| kind.as_str().to_string())
    }

    fn currency_or(&self, defaults: &DocumentDefaults) -> String {
        trimmed(&self.currency)
            .unwrap_or_else(|| defaults.currency.clone())
            .to_ascii_uppercase()
    }

    /// Lenient view for rendering. Contact details fall back to the
    /// sender's block and the logo to the configured default.
    pub fn content(&self, kind: DocumentKind, defaults: &DocumentDefaults) -> DocumentContent {
        DocumentContent {
            kind,
            number: self.number().unwrap_or_default(),
            bill_to: self.bill_to.clone(),
            from: self.from.clone(),
            project: trimmed(&self.project),
            issued_at: trimmed(&self.issued_at).unwrap_or_default(),
            deadline: trimmed(&self.deadline),
            payment_terms: trimmed(&self.payment_terms),
            items: self.items.clone(),
            tax_rate: self.tax_rate,
            terms: self
                .terms
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            logo_url: trimmed(&self.logo_url)
                .filter(|url| is_embeddable_logo(url))
                .or_else(|| defaults.logo_url.clone()),
            contact_email: trimmed(&self.company_contact_email)
                .or_else(|| trimmed(&self.from.email)),
            contact_phone: trimmed(&self.company_contact_phone)
                .or_else(|| trimmed(&self.from.phone)),
            currency: self.currency_or(defaults),
        }
    }

    /// Validated record with a server-side totals snapshot.
    ///
    /// A missing number is generated as `<prefix>-<unix millis>`; a missing
    /// issue date becomes `now`.
    pub fn to_record(
        &self,
        kind: DocumentKind,
        default_status: &str,
        now: DateTime<Utc>,
        defaults: &DocumentDefaults,
    ) -> Result<DocumentRecord, AppError> {
        self.validate()?;

        for (index, item) in self.items.iter().enumerate() {
            let line = index + 1;
            if item.title.trim().is_empty() {
                return Err(bad_request(format!("Item {} needs a title", line)));
            }
            if item.quantity <= Decimal::ZERO {
                return Err(bad_request(format!(
                    "Item {} quantity must be greater than zero",
                    line
                )));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(bad_request(format!(
                    "Item {} unit price cannot be negative",
                    line
                )));
            }
        }

        if self.tax_rate < Decimal::ZERO {
            return Err(bad_request("Tax rate cannot be negative".to_string()));
        }

        let currency = self.currency_or(defaults);
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(bad_request(format!(
                "Currency must be a 3-letter code, got '{}'",
                currency
            )));
        }

        if let Some(number) = self.number() {
            if RESERVED_NUMBERS.contains(&number.as_str()) {
                return Err(bad_request(format!(
                    "Document number '{}' is reserved",
                    number
                )));
            }
        }

        let totals = Totals::compute(&self.items, self.tax_rate)?.to_cents()?;
        let line_item_count = i32::try_from(self.items.len())
            .map_err(|_| bad_request("Too many line items".to_string()))?;

        Ok(DocumentRecord {
            kind,
            document_number: self.number().unwrap_or_else(|| {
                format!("{}-{}", kind.number_prefix(), now.timestamp_millis())
            }),
            customer_id: self.customer_id,
            bill_to: self.bill_to.clone(),
            from: self.from.clone(),
            project: trimmed(&self.project),
            issued_at: trimmed(&self.issued_at).unwrap_or_else(|| now.to_rfc3339()),
            deadline: trimmed(&self.deadline),
            payment_terms: trimmed(&self.payment_terms),
            subtotal_cents: totals.subtotal_cents,
            tax_cents: totals.tax_cents,
            total_cents: totals.total_cents,
            currency,
            status: trimmed(&self.status).unwrap_or_else(|| default_status.to_string()),
            line_item_count,
            notes: trimmed(&self.notes),
            metadata: self
                .metadata
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            created_by: self.created_by,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PdfQuery {
    /// Best-effort save before rendering.
    #[serde(default)]
    pub save: bool,
    pub format: Option<String>,
    pub scale: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub ok: bool,
    pub action: SaveAction,
    pub id: i32,
    pub kind: DocumentKind,
    pub document_number: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SaveOutcome> for SaveResponse {
    fn from(outcome: SaveOutcome) -> Self {
        let doc = outcome.document;
        Self {
            ok: true,
            action: outcome.action,
            id: doc.id,
            kind: doc.kind,
            document_number: doc.document_number,
            subtotal_cents: doc.subtotal_cents,
            tax_cents: doc.tax_cents,
            total_cents: doc.total_cents,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

impl ActivityQuery {
    pub const DEFAULT_LIMIT: i64 = 16;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub items: Vec<ActivityEntry>,
}
