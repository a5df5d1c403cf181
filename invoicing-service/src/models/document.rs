//! Invoice and quotation models.
//!
//! Both kinds share one shape. They differ in labels, number prefix, the
//! name of the deadline field and how a repeated document number is saved.

use super::party::PartyBlock;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;

/// Document kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Invoice,
    Quotation,
}

/// What happens when a save hits an existing document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Duplicate numbers are rejected; changes go through an explicit amend.
    InsertOnly,
    /// The existing row is overwritten with the new content.
    Upsert,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Quotation => "quotation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INVOICE",
            DocumentKind::Quotation => "QUOTATION",
        }
    }

    pub fn date_label(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice Date",
            DocumentKind::Quotation => "Quote Date",
        }
    }

    pub fn deadline_label(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Due Date",
            DocumentKind::Quotation => "Valid Until",
        }
    }

    /// Prefix for generated document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::Quotation => "QT",
        }
    }

    pub fn save_policy(&self) -> SavePolicy {
        match self {
            DocumentKind::Invoice => SavePolicy::InsertOnly,
            DocumentKind::Quotation => SavePolicy::Upsert,
        }
    }

    /// Capitalized name used in default mail subjects.
    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Quotation => "Quotation",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Inserted,
    Updated,
}

impl SaveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveAction::Inserted => "inserted",
            SaveAction::Updated => "updated",
        }
    }
}

/// One billable line. The line total is derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "qty")]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
}

impl DocumentItem {
    /// `quantity * unit_price`, or `None` on decimal overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }
}

/// Normalized document content, ready to render.
///
/// Built leniently from a request payload; nothing here is validated beyond
/// what rendering needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContent {
    pub kind: DocumentKind,
    pub number: String,
    pub bill_to: PartyBlock,
    pub from: PartyBlock,
    pub project: Option<String>,
    pub issued_at: String,
    pub deadline: Option<String>,
    pub payment_terms: Option<String>,
    pub items: Vec<DocumentItem>,
    pub tax_rate: Decimal,
    pub terms: Vec<String>,
    pub logo_url: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub currency: String,
}

/// Row-to-be: validated content plus the totals snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub kind: DocumentKind,
    pub document_number: String,
    pub customer_id: Option<i32>,
    pub bill_to: PartyBlock,
    pub from: PartyBlock,
    pub project: Option<String>,
    pub issued_at: String,
    pub deadline: Option<String>,
    pub payment_terms: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub line_item_count: i32,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<i32>,
}

/// Persisted invoice or quotation row.
///
/// The deadline column is `due_at` for invoices and `valid_until` for
/// quotations; queries alias both to `deadline`.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: i32,
    #[sqlx(skip)]
    pub kind: DocumentKind,
    pub document_number: String,
    pub customer_id: Option<i32>,
    pub bill_to: Json<PartyBlock>,
    #[serde(rename = "from")]
    pub from_info: Json<PartyBlock>,
    pub project: Option<String>,
    pub issued_at: String,
    pub deadline: Option<String>,
    pub payment_terms: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub line_item_count: i32,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// New row for `record` with both timestamps set to `now`.
    pub fn from_record(id: i32, record: &DocumentRecord, now: DateTime<Utc>) -> Self {
        let mut row = Self {
            id,
            kind: record.kind,
            document_number: record.document_number.clone(),
            customer_id: None,
            bill_to: Json(PartyBlock::default()),
            from_info: Json(PartyBlock::default()),
            project: None,
            issued_at: String::new(),
            deadline: None,
            payment_terms: None,
            subtotal_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            currency: String::new(),
            status: String::new(),
            line_item_count: 0,
            notes: None,
            metadata: serde_json::Value::Null,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        row.overwrite(record, now);
        row
    }

    /// Replace every mutable field. `id`, `kind`, the number and
    /// `created_at` are kept.
    pub fn overwrite(&mut self, record: &DocumentRecord, now: DateTime<Utc>) {
        self.customer_id = record.customer_id;
        self.bill_to = Json(record.bill_to.clone());
        self.from_info = Json(record.from.clone());
        self.project = record.project.clone();
        self.issued_at = record.issued_at.clone();
        self.deadline = record.deadline.clone();
        self.payment_terms = record.payment_terms.clone();
        self.subtotal_cents = record.subtotal_cents;
        self.tax_cents = record.tax_cents;
        self.total_cents = record.total_cents;
        self.currency = record.currency.clone();
        self.status = record.status.clone();
        self.line_item_count = record.line_item_count;
        self.notes = record.notes.clone();
        self.metadata = record.metadata.clone();
        self.created_by = record.created_by;
        self.updated_at = now;
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }
}
