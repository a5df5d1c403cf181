//! Recent-activity feed entries.

use super::document::{DocumentKind, StoredDocument};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i32,
    pub kind: DocumentKind,
    pub number: String,
    pub date: String,
    pub created_at: DateTime<Utc>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub client_name: Option<String>,
    pub client_company: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub client_address: Option<String>,
}

impl From<&StoredDocument> for ActivityEntry {
    fn from(row: &StoredDocument) -> Self {
        let bill_to = &row.bill_to.0;
        let address = [&bill_to.address_line1, &bill_to.address_line2]
            .into_iter()
            .filter_map(|line| line.as_deref())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            id: row.id,
            kind: row.kind,
            number: row.document_number.clone(),
            date: row.issued_at.clone(),
            created_at: row.created_at,
            amount_cents: row.total_cents,
            currency: row.currency.clone(),
            status: row.status.clone(),
            client_name: bill_to.display_name().map(str::to_string),
            client_company: bill_to.company.clone(),
            client_email: bill_to.email.clone(),
            client_phone: bill_to.phone.clone(),
            client_address: (!address.is_empty()).then_some(address),
        }
    }
}

/// Merge the latest rows of both kinds, keep the newest `limit` overall and
/// return them oldest first.
pub fn merge_recent(
    invoices: &[StoredDocument],
    quotations: &[StoredDocument],
    limit: usize,
) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = invoices
        .iter()
        .chain(quotations.iter())
        .map(ActivityEntry::from)
        .collect();

    // Newest first to pick the window, ties broken by id for a stable order.
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    entries.truncate(limit);
    entries.reverse();
    entries
}
