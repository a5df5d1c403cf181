use crate::dtos::{AccountsResponse, OAuthCallbackQuery, SendMailRequest, SendMailResponse, SenderQuery};
use crate::services::google::{random_state, Pkce};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use tower_sessions::Session;

/// Start the consent flow for a new sending identity.
#[tracing::instrument(skip(state, session))]
pub async fn authorize(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect, AppError> {
    let oauth = state.mailer.oauth()?;
    let pkce = Pkce::generate();
    let oauth_state = random_state();

    state
        .mailer
        .vault()
        .begin_authorization(&session, &oauth_state, &pkce.verifier)
        .await?;

    let url = oauth.authorization_url(&oauth_state, &pkce.challenge)?;
    Ok(Redirect::to(&url))
}

#[tracing::instrument(skip(state, session, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Redirect, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Authorization was declined: {}",
            error
        )));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;

    let oauth = state.mailer.oauth()?;
    let vault = state.mailer.vault();

    let verifier = vault
        .finish_authorization(&session, query.state.as_deref().unwrap_or_default())
        .await?;
    let tokens = oauth.exchange_code(&code, &verifier).await?;
    let email = oauth.user_email(&tokens.access_token).await?;

    vault.store(&session, &email, &tokens).await?;
    tracing::info!(email = %email, "Mail identity authorized");

    Ok(Redirect::to("/"))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<AccountsResponse>, AppError> {
    let accounts = state.mailer.vault().emails(&session).await?;
    Ok(Json(AccountsResponse { accounts }))
}

#[tracing::instrument(skip(state, session))]
pub async fn remove_account(
    State(state): State<AppState>,
    session: Session,
    Path(email): Path<String>,
) -> Result<Json<Value>, AppError> {
    let removed = state.mailer.vault().remove(&session, &email).await?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

/// Send a caller-assembled message. `?sender=` wins over the body's sender.
#[tracing::instrument(skip(state, session, request))]
pub async fn send_mail(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SenderQuery>,
    ValidatedJson(request): ValidatedJson<SendMailRequest>,
) -> Result<Json<SendMailResponse>, AppError> {
    let sender = query
        .sender
        .filter(|s| !s.trim().is_empty())
        .or_else(|| request.sender.clone());
    let mail = request.into_mail()?;

    let receipt = state
        .mailer
        .dispatch(&session, &mail, sender.as_deref())
        .await?;
    Ok(Json(receipt.into()))
}
