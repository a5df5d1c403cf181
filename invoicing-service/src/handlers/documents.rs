use crate::dtos::{
    DocumentPayload, EmailDocumentRequest, PdfQuery, SaveResponse, SendMailResponse, SenderQuery,
};
use crate::models::{DocumentKind, SaveAction};
use crate::services::mailer::{MailAttachment, OutgoingMail};
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::pdf::PdfOptions;
use crate::services::reconciler;
use crate::services::renderer::render_document;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::extract::{AppJson, ValidatedJson};
use tower_sessions::Session;

/// Status given to documents saved on the way to a PDF download.
const DOWNLOAD_STATUS: &str = "draft";
/// Status given to documents saved on the way to the client's inbox.
const EMAIL_STATUS: &str = "sent";

/// Every character outside `[A-Za-z0-9-_.]` becomes `_`.
pub fn sanitize_filename(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "document".to_string()
    } else {
        sanitized
    }
}

fn save_status(action: SaveAction) -> StatusCode {
    match action {
        SaveAction::Inserted => StatusCode::CREATED,
        SaveAction::Updated => StatusCode::OK,
    }
}

async fn save_document(
    state: &AppState,
    kind: DocumentKind,
    payload: DocumentPayload,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    let record = payload.to_record(kind, DOWNLOAD_STATUS, Utc::now(), &state.config.documents)?;
    let outcome = reconciler::save(state.repository.as_ref(), &record).await?;
    Ok((save_status(outcome.action), Json(outcome.into())))
}

async fn amend_document(
    state: &AppState,
    kind: DocumentKind,
    number: String,
    mut payload: DocumentPayload,
) -> Result<Json<SaveResponse>, AppError> {
    match payload.number() {
        Some(body_number) if body_number != number => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Document number '{}' does not match path '{}'",
                body_number,
                number
            )));
        }
        _ => payload.document_number = Some(number),
    }

    let record = payload.to_record(kind, DOWNLOAD_STATUS, Utc::now(), &state.config.documents)?;
    let outcome = reconciler::amend(state.repository.as_ref(), &record).await?;
    Ok(Json(outcome.into()))
}

/// Save before a download or send. Failures are logged and never block the
/// caller.
async fn save_quietly(
    state: &AppState,
    kind: DocumentKind,
    payload: &DocumentPayload,
    default_status: &str,
) {
    let result = match payload.to_record(
        kind,
        default_status,
        Utc::now(),
        &state.config.documents,
    ) {
        Ok(record) => reconciler::save(state.repository.as_ref(), &record)
            .await
            .map(|_| ()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        ERRORS_TOTAL.with_label_values(&["best_effort_save"]).inc();
        tracing::warn!(kind = %kind, error = %e, "Best-effort save failed");
    }
}

async fn render_pdf(
    state: &AppState,
    kind: DocumentKind,
    payload: &DocumentPayload,
    format: Option<&str>,
    scale: Option<f64>,
) -> Result<Vec<u8>, AppError> {
    let options = PdfOptions::resolve(format, scale, state.config.pdf.default_options())?;
    let html = render_document(&payload.content(kind, &state.config.documents))?;
    state.pdf.render(&html, &options).await.inspect_err(|e| {
        ERRORS_TOTAL.with_label_values(&["pdf_render"]).inc();
        tracing::error!(kind = %kind, error = %e, "PDF render failed");
    })
}

async fn preview_document(
    state: &AppState,
    kind: DocumentKind,
    payload: DocumentPayload,
) -> Result<Html<String>, AppError> {
    let html = render_document(&payload.content(kind, &state.config.documents))?;
    Ok(Html(html))
}

async fn download_pdf(
    state: &AppState,
    kind: DocumentKind,
    query: PdfQuery,
    payload: DocumentPayload,
) -> Result<Response, AppError> {
    if query.save {
        save_quietly(state, kind, &payload, DOWNLOAD_STATUS).await;
    }

    let pdf = render_pdf(state, kind, &payload, query.format.as_deref(), query.scale).await?;
    let filename = format!("{}.pdf", sanitize_filename(&payload.file_stem(kind)));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    )
        .into_response())
}

async fn email_document(
    state: &AppState,
    session: &Session,
    kind: DocumentKind,
    sender: Option<String>,
    request: EmailDocumentRequest,
) -> Result<Json<SendMailResponse>, AppError> {
    let number = request.document.number();
    let mut mail = OutgoingMail {
        recipients: request.recipients,
        subject: request
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| match &number {
                Some(n) => format!("{} {}", kind.display_name(), n),
                None => kind.display_name().to_string(),
            }),
        body: request.message.unwrap_or_else(|| {
            format!(
                "Please find the attached {}.",
                kind.display_name().to_lowercase()
            )
        }),
        attachment: None,
    };
    mail.mailboxes()?;

    save_quietly(state, kind, &request.document, EMAIL_STATUS).await;

    let pdf = render_pdf(
        state,
        kind,
        &request.document,
        request.format.as_deref(),
        request.scale,
    )
    .await?;
    mail.attachment = Some(MailAttachment {
        filename: format!("{}.pdf", sanitize_filename(&request.document.file_stem(kind))),
        content: pdf,
    });

    let receipt = state
        .mailer
        .dispatch(session, &mail, sender.as_deref())
        .await?;
    Ok(Json(receipt.into()))
}

#[tracing::instrument(skip(state, payload))]
pub async fn save_invoice(
    State(state): State<AppState>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    save_document(&state, DocumentKind::Invoice, payload).await
}

#[tracing::instrument(skip(state, payload))]
pub async fn save_quotation(
    State(state): State<AppState>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    save_document(&state, DocumentKind::Quotation, payload).await
}

#[tracing::instrument(skip(state, payload))]
pub async fn amend_invoice(
    State(state): State<AppState>,
    Path(number): Path<String>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Json<SaveResponse>, AppError> {
    amend_document(&state, DocumentKind::Invoice, number, payload).await
}

#[tracing::instrument(skip(state, payload))]
pub async fn amend_quotation(
    State(state): State<AppState>,
    Path(number): Path<String>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Json<SaveResponse>, AppError> {
    amend_document(&state, DocumentKind::Quotation, number, payload).await
}

pub async fn preview_invoice(
    State(state): State<AppState>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Html<String>, AppError> {
    preview_document(&state, DocumentKind::Invoice, payload).await
}

pub async fn preview_quotation(
    State(state): State<AppState>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Html<String>, AppError> {
    preview_document(&state, DocumentKind::Quotation, payload).await
}

#[tracing::instrument(skip(state, payload))]
pub async fn invoice_pdf(
    State(state): State<AppState>,
    Query(query): Query<PdfQuery>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Response, AppError> {
    download_pdf(&state, DocumentKind::Invoice, query, payload).await
}

#[tracing::instrument(skip(state, payload))]
pub async fn quotation_pdf(
    State(state): State<AppState>,
    Query(query): Query<PdfQuery>,
    AppJson(payload): AppJson<DocumentPayload>,
) -> Result<Response, AppError> {
    download_pdf(&state, DocumentKind::Quotation, query, payload).await
}

#[tracing::instrument(skip(state, session, query, request))]
pub async fn email_invoice(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SenderQuery>,
    ValidatedJson(request): ValidatedJson<EmailDocumentRequest>,
) -> Result<Json<SendMailResponse>, AppError> {
    let sender = query
        .sender
        .filter(|s| !s.trim().is_empty())
        .or_else(|| request.sender.clone());
    email_document(&state, &session, DocumentKind::Invoice, sender, request).await
}

#[tracing::instrument(skip(state, session, query, request))]
pub async fn email_quotation(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SenderQuery>,
    ValidatedJson(request): ValidatedJson<EmailDocumentRequest>,
) -> Result<Json<SendMailResponse>, AppError> {
    let sender = query
        .sender
        .filter(|s| !s.trim().is_empty())
        .or_else(|| request.sender.clone());
    email_document(&state, &session, DocumentKind::Quotation, sender, request).await
}
