//! Insert-or-update of documents keyed by number.

use crate::models::{DocumentRecord, SaveAction, SavePolicy, StoredDocument};
use crate::services::metrics::{
    DOCUMENTS_SAVED_TOTAL, DOCUMENT_AMOUNT_CENTS_TOTAL, DOCUMENT_CONFLICTS_TOTAL,
};
use crate::services::store::{DocumentRepository, StoreError};
use service_core::error::AppError;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub action: SaveAction,
    pub document: StoredDocument,
}

fn record_saved(record: &DocumentRecord, action: SaveAction) {
    DOCUMENTS_SAVED_TOTAL
        .with_label_values(&[record.kind.as_str(), action.as_str()])
        .inc();
    if action == SaveAction::Inserted && record.total_cents > 0 {
        DOCUMENT_AMOUNT_CENTS_TOTAL
            .with_label_values(&[record.kind.as_str(), &record.currency])
            .inc_by(record.total_cents as f64);
    }
}

/// Save a document under its kind's policy.
///
/// Inserts first. When the number is taken, quotations overwrite the
/// existing row (same id and `created_at`, fresh `updated_at`) and invoices
/// fail with `Conflict`, leaving the stored row untouched.
#[instrument(skip(repo, record), fields(kind = %record.kind, number = %record.document_number))]
pub async fn save(
    repo: &dyn DocumentRepository,
    record: &DocumentRecord,
) -> Result<SaveOutcome, AppError> {
    match repo.insert(record).await {
        Ok(document) => {
            record_saved(record, SaveAction::Inserted);
            info!(id = document.id, "Document inserted");
            Ok(SaveOutcome {
                action: SaveAction::Inserted,
                document,
            })
        }
        Err(duplicate @ StoreError::DuplicateNumber { .. }) => match record.kind.save_policy() {
            SavePolicy::Upsert => {
                // Not atomic with the insert: a row deleted in between
                // surfaces as a conflict.
                let document = repo
                    .update_by_number(record)
                    .await?
                    .ok_or_else(|| AppError::from(duplicate))?;
                record_saved(record, SaveAction::Updated);
                info!(id = document.id, "Document updated in place");
                Ok(SaveOutcome {
                    action: SaveAction::Updated,
                    document,
                })
            }
            SavePolicy::InsertOnly => {
                DOCUMENT_CONFLICTS_TOTAL
                    .with_label_values(&[record.kind.as_str()])
                    .inc();
                warn!("Duplicate document number rejected");
                Err(duplicate.into())
            }
        },
        Err(StoreError::Backend(e)) => Err(e),
    }
}

/// Overwrite an existing document of any kind. `NotFound` if the number
/// has never been saved.
#[instrument(skip(repo, record), fields(kind = %record.kind, number = %record.document_number))]
pub async fn amend(
    repo: &dyn DocumentRepository,
    record: &DocumentRecord,
) -> Result<SaveOutcome, AppError> {
    let document = repo.update_by_number(record).await?.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!(
            "{} '{}' not found",
            record.kind.display_name(),
            record.document_number
        ))
    })?;

    record_saved(record, SaveAction::Updated);
    info!(id = document.id, "Document amended");

    Ok(SaveOutcome {
        action: SaveAction::Updated,
        document,
    })
}
