use crate::dtos::{ActivityQuery, ActivityResponse};
use crate::models::{merge_recent, DocumentKind};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

/// Newest documents of both kinds, oldest first.
#[tracing::instrument(skip(state))]
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityResponse>, AppError> {
    let limit = query.limit();

    let (invoices, quotations) = tokio::try_join!(
        state.repository.recent(DocumentKind::Invoice, limit),
        state.repository.recent(DocumentKind::Quotation, limit),
    )?;

    let items = merge_recent(&invoices, &quotations, limit as usize);
    Ok(Json(ActivityResponse { items }))
}
