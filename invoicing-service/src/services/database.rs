//! Database service for invoicing-service.

use crate::models::{DocumentKind, DocumentRecord, StoredDocument};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{DocumentRepository, StoreError};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};

/// Table and column names that differ per kind.
struct TableSpec {
    table: &'static str,
    number_column: &'static str,
    deadline_column: &'static str,
}

fn table_spec(kind: DocumentKind) -> TableSpec {
    match kind {
        DocumentKind::Invoice => TableSpec {
            table: "invoices",
            number_column: "invoice_number",
            deadline_column: "due_at",
        },
        DocumentKind::Quotation => TableSpec {
            table: "quotations",
            number_column: "quotation_number",
            deadline_column: "valid_until",
        },
    }
}

impl TableSpec {
    fn returning(&self) -> String {
        format!(
            "id, {} AS document_number, customer_id, bill_to, from_info, project, issued_at, \
             {} AS deadline, payment_terms, subtotal_cents, tax_cents, total_cents, currency, \
             status, line_item_count, notes, metadata, created_by, created_at, updated_at",
            self.number_column, self.deadline_column
        )
    }

    fn insert_sql(&self) -> String {
        format!(
            r#"
            INSERT INTO {table} ({number}, customer_id, bill_to, from_info, project, issued_at,
                {deadline}, payment_terms, subtotal_cents, tax_cents, total_cents, currency,
                status, line_item_count, notes, metadata, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {returning}
            "#,
            table = self.table,
            number = self.number_column,
            deadline = self.deadline_column,
            returning = self.returning()
        )
    }

    fn update_sql(&self) -> String {
        format!(
            r#"
            UPDATE {table}
            SET customer_id = $2, bill_to = $3, from_info = $4, project = $5, issued_at = $6,
                {deadline} = $7, payment_terms = $8, subtotal_cents = $9, tax_cents = $10,
                total_cents = $11, currency = $12, status = $13, line_item_count = $14,
                notes = $15, metadata = $16, created_by = $17, updated_at = NOW()
            WHERE {number} = $1
            RETURNING {returning}
            "#,
            table = self.table,
            number = self.number_column,
            deadline = self.deadline_column,
            returning = self.returning()
        )
    }

    fn find_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = $1",
            self.returning(),
            self.table,
            self.number_column
        )
    }

    fn recent_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, id DESC LIMIT $1",
            self.returning(),
            self.table
        )
    }
}

/// Bind the seventeen record columns in statement order.
fn bind_record<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, StoredDocument, sqlx::postgres::PgArguments>,
    record: &'q DocumentRecord,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, StoredDocument, sqlx::postgres::PgArguments> {
    query
        .bind(&record.document_number)
        .bind(record.customer_id)
        .bind(Json(&record.bill_to))
        .bind(Json(&record.from))
        .bind(&record.project)
        .bind(&record.issued_at)
        .bind(&record.deadline)
        .bind(&record.payment_terms)
        .bind(record.subtotal_cents)
        .bind(record.tax_cents)
        .bind(record.total_cents)
        .bind(&record.currency)
        .bind(&record.status)
        .bind(record.line_item_count)
        .bind(&record.notes)
        .bind(&record.metadata)
        .bind(record.created_by)
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for Database {
    #[instrument(skip(self, record), fields(kind = %record.kind, number = %record.document_number))]
    async fn insert(&self, record: &DocumentRecord) -> Result<StoredDocument, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_document"])
            .start_timer();

        let sql = table_spec(record.kind).insert_sql();
        let row = bind_record(sqlx::query_as::<_, StoredDocument>(&sql), record)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::DuplicateNumber {
                        kind: record.kind,
                        number: record.document_number.clone(),
                    }
                }
                _ => StoreError::Backend(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert {}: {}",
                    record.kind,
                    e
                ))),
            })?;

        timer.observe_duration();

        info!(id = row.id, "Document inserted");

        Ok(row.with_kind(record.kind))
    }

    #[instrument(skip(self, record), fields(kind = %record.kind, number = %record.document_number))]
    async fn update_by_number(
        &self,
        record: &DocumentRecord,
    ) -> Result<Option<StoredDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_document"])
            .start_timer();

        let sql = table_spec(record.kind).update_sql();
        let row = bind_record(sqlx::query_as::<_, StoredDocument>(&sql), record)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update {}: {}", record.kind, e))
            })?;

        timer.observe_duration();

        if let Some(ref row) = row {
            info!(id = row.id, "Document updated");
        }

        Ok(row.map(|r| r.with_kind(record.kind)))
    }

    #[instrument(skip(self))]
    async fn find_by_number(
        &self,
        kind: DocumentKind,
        number: &str,
    ) -> Result<Option<StoredDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_document"])
            .start_timer();

        let sql = table_spec(kind).find_sql();
        let row = sqlx::query_as::<_, StoredDocument>(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get {}: {}", kind, e)))?;

        timer.observe_duration();

        Ok(row.map(|r| r.with_kind(kind)))
    }

    #[instrument(skip(self))]
    async fn recent(
        &self,
        kind: DocumentKind,
        limit: i64,
    ) -> Result<Vec<StoredDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recent_documents"])
            .start_timer();

        let sql = table_spec(kind).recent_sql();
        let rows = sqlx::query_as::<_, StoredDocument>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list {}s: {}", kind, e))
            })?;

        timer.observe_duration();

        Ok(rows.into_iter().map(|r| r.with_kind(kind)).collect())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}
