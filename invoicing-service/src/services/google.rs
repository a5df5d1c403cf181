//! Google OAuth 2.0 client for delegated Gmail access.

use crate::config::GoogleConfig;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use sha2::{Digest, Sha256};
use std::time::Duration as StdDuration;
use tracing::{error, instrument};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Scopes requested on the consent screen.
pub const SCOPES: [&str; 4] = [GMAIL_SEND_SCOPE, "openid", "email", "profile"];

/// Tokens are treated as expired this long before Google says so.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Token set returned by the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenSet {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + Duration::seconds(EXPIRY_SKEW_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

/// PKCE verifier and its S256 challenge.
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random opaque value for the OAuth `state` parameter.
pub fn random_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Consent screen URL requesting offline access.
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, AppError> {
        let scope = SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid GOOGLE_AUTH_URL: {}", e)))?;
        Ok(url.into())
    }

    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, AppError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.token_request(&form).await
    }

    /// New access token from a refresh token. Google omits the refresh token
    /// on refresh, so the old one is carried over.
    #[instrument(skip_all)]
    pub async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet, AppError> {
        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            AppError::AuthRequired("Access token expired; authorize the account again".to_string())
        })?;

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let mut refreshed = self.token_request(&form).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.to_string());
        }
        Ok(refreshed)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, AppError> {
        let response = self
            .http
            .traced_post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Token endpoint unreachable");
                AppError::Unauthorized(anyhow::anyhow!("Token exchange failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Token endpoint rejected request");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Invalid token response: {}", e))
        })?;
        Ok(token.into_token_set(Utc::now()))
    }

    /// Email address of the account the token belongs to.
    #[instrument(skip_all)]
    pub async fn user_email(&self, access_token: &str) -> Result<String, AppError> {
        let response = self
            .http
            .traced_get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Unauthorized(anyhow::anyhow!("Userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Userinfo request failed with status {}",
                response.status()
            )));
        }

        let info: UserInfo = response.json().await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Invalid userinfo response: {}", e))
        })?;

        info.email.filter(|e| !e.is_empty()).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Could not determine the account email"))
        })
    }
}
