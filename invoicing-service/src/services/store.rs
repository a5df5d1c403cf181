//! Document persistence seam.

use crate::models::{DocumentKind, DocumentRecord, StoredDocument};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} number '{number}' already exists")]
    DuplicateNumber { kind: DocumentKind, number: String },

    #[error(transparent)]
    Backend(#[from] AppError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateNumber { .. } => AppError::Conflict(anyhow::anyhow!("{}", err)),
            StoreError::Backend(e) => e,
        }
    }
}

/// Storage for invoices and quotations, one table per kind, keyed by
/// document number.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new row. Fails with `DuplicateNumber` if the number exists.
    async fn insert(&self, record: &DocumentRecord) -> Result<StoredDocument, StoreError>;

    /// Overwrite every mutable field of the row with this number and
    /// refresh `updated_at`. `None` when no such row exists.
    async fn update_by_number(
        &self,
        record: &DocumentRecord,
    ) -> Result<Option<StoredDocument>, AppError>;

    async fn find_by_number(
        &self,
        kind: DocumentKind,
        number: &str,
    ) -> Result<Option<StoredDocument>, AppError>;

    /// Latest rows of one kind, newest first.
    async fn recent(&self, kind: DocumentKind, limit: i64)
        -> Result<Vec<StoredDocument>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[derive(Default)]
struct Table {
    rows: Vec<StoredDocument>,
    next_id: i32,
}

/// In-process store for tests and running without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<DocumentKind, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, kind: DocumentKind) -> usize {
        self.tables
            .read()
            .await
            .get(&kind)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn insert(&self, record: &DocumentRecord) -> Result<StoredDocument, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(record.kind).or_default();

        if table
            .rows
            .iter()
            .any(|row| row.document_number == record.document_number)
        {
            return Err(StoreError::DuplicateNumber {
                kind: record.kind,
                number: record.document_number.clone(),
            });
        }

        table.next_id += 1;
        let row = StoredDocument::from_record(table.next_id, record, Utc::now());
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update_by_number(
        &self,
        record: &DocumentRecord,
    ) -> Result<Option<StoredDocument>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&record.kind) else {
            return Ok(None);
        };

        Ok(table
            .rows
            .iter_mut()
            .find(|row| row.document_number == record.document_number)
            .map(|row| {
                row.overwrite(record, Utc::now());
                row.clone()
            }))
    }

    async fn find_by_number(
        &self,
        kind: DocumentKind,
        number: &str,
    ) -> Result<Option<StoredDocument>, AppError> {
        Ok(self.tables.read().await.get(&kind).and_then(|table| {
            table
                .rows
                .iter()
                .find(|row| row.document_number == number)
                .cloned()
        }))
    }

    async fn recent(
        &self,
        kind: DocumentKind,
        limit: i64,
    ) -> Result<Vec<StoredDocument>, AppError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };

        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
