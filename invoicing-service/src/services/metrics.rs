//! Prometheus metrics for invoicing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Saved documents by kind and action (inserted, updated).
pub static DOCUMENTS_SAVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_documents_saved_total",
        "Total number of saved documents by kind and action",
        &["kind", "action"]
    )
    .expect("Failed to register documents_saved_total")
});

/// Saves rejected because the number already exists.
pub static DOCUMENT_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_document_conflicts_total",
        "Total number of rejected duplicate document numbers",
        &["kind"]
    )
    .expect("Failed to register document_conflicts_total")
});

/// Saved document value in cents by currency.
pub static DOCUMENT_AMOUNT_CENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_document_amount_cents_total",
        "Total saved document value in cents by kind and currency",
        &["kind", "currency"]
    )
    .expect("Failed to register document_amount_cents_total")
});

/// PDF renders by engine and outcome.
pub static PDF_RENDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_pdf_renders_total",
        "Total number of PDF renders by engine and outcome",
        &["engine", "outcome"]
    )
    .expect("Failed to register pdf_renders_total")
});

/// Mail sends by provider and outcome.
pub static MAILS_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_mails_sent_total",
        "Total number of mail sends by provider and outcome",
        &["provider", "outcome"]
    )
    .expect("Failed to register mails_sent_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoicing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DOCUMENTS_SAVED_TOTAL);
    Lazy::force(&DOCUMENT_CONFLICTS_TOTAL);
    Lazy::force(&DOCUMENT_AMOUNT_CENTS_TOTAL);
    Lazy::force(&PDF_RENDERS_TOTAL);
    Lazy::force(&MAILS_SENT_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
