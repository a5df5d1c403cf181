//! Per-browser store of authorized mail identities.
//!
//! Identities live in the server-side session; the cookie only carries the
//! session id. Token sets are sealed with AES-256-GCM before they are
//! written, so a dump of the session store does not leak credentials.

use crate::services::google::TokenSet;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use tower_sessions::{Expiry, Session};
use tracing::{info, warn};

const IDENTITIES_KEY: &str = "mail.identities";
const PENDING_AUTH_KEY: &str = "mail.pending_authorization";
const NONCE_LEN: usize = 12;

/// Session lifetime while at least one identity is stored.
pub const IDENTITY_TTL: time::Duration = time::Duration::days(365);
/// Session lifetime once the last identity is removed.
pub const EMPTY_TTL: time::Duration = time::Duration::minutes(3);

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Session store error: {}", e))
}

/// AES-256-GCM sealing of token sets, base64 of `nonce || ciphertext`.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Key from base64-encoded 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, AppError> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("TOKEN_ENCRYPTION_KEY is not base64: {}", e))
        })?;
        if bytes.len() != 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_ENCRYPTION_KEY must decode to 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        })
    }

    /// Process-local random key. Sealed tokens do not survive a restart.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        }
    }

    pub fn seal(&self, tokens: &TokenSet) -> Result<String, AppError> {
        let plaintext = serde_json::to_vec(tokens)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Token encoding: {}", e)))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("Token encryption failed")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// `None` when the value was sealed under another key or tampered with.
    pub fn open(&self, sealed: &str) -> Option<TokenSet> {
        let bytes = STANDARD.decode(sealed).ok()?;
        if bytes.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        serde_json::from_slice(&plaintext).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIdentity {
    email: String,
    sealed_tokens: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingAuthorization {
    state: String,
    code_verifier: String,
}

#[derive(Clone)]
pub struct IdentityVault {
    cipher: Arc<TokenCipher>,
}

impl IdentityVault {
    pub fn new(cipher: TokenCipher) -> Self {
        Self {
            cipher: Arc::new(cipher),
        }
    }

    async fn load(&self, session: &Session) -> Result<Vec<StoredIdentity>, AppError> {
        Ok(session
            .get::<Vec<StoredIdentity>>(IDENTITIES_KEY)
            .await
            .map_err(session_error)?
            .unwrap_or_default())
    }

    async fn save(&self, session: &Session, identities: &[StoredIdentity]) -> Result<(), AppError> {
        session
            .insert(IDENTITIES_KEY, identities)
            .await
            .map_err(session_error)?;
        let ttl = if identities.is_empty() {
            EMPTY_TTL
        } else {
            IDENTITY_TTL
        };
        session.set_expiry(Some(Expiry::OnInactivity(ttl)));
        Ok(())
    }

    /// Add or replace the identity for `email`, keeping its position.
    pub async fn store(
        &self,
        session: &Session,
        email: &str,
        tokens: &TokenSet,
    ) -> Result<(), AppError> {
        let sealed_tokens = self.cipher.seal(tokens)?;
        let mut identities = self.load(session).await?;

        match identities
            .iter_mut()
            .find(|i| i.email.eq_ignore_ascii_case(email))
        {
            Some(existing) => existing.sealed_tokens = sealed_tokens,
            None => identities.push(StoredIdentity {
                email: email.to_string(),
                sealed_tokens,
            }),
        }

        self.save(session, &identities).await?;
        info!(email = %email, count = identities.len(), "Mail identity stored");
        Ok(())
    }

    /// Authorized sender addresses in authorization order.
    pub async fn emails(&self, session: &Session) -> Result<Vec<String>, AppError> {
        Ok(self
            .load(session)
            .await?
            .into_iter()
            .map(|i| i.email)
            .collect())
    }

    /// Pick the sending identity: the requested one when authorized, otherwise
    /// the first authorized.
    pub async fn choose(
        &self,
        session: &Session,
        sender: Option<&str>,
    ) -> Result<(String, TokenSet), AppError> {
        let identities = self.load(session).await?;
        if identities.is_empty() {
            return Err(AppError::AuthRequired(
                "No authorized mail account; authorize one first".to_string(),
            ));
        }

        let requested = sender.map(str::trim).filter(|s| !s.is_empty());
        let identity = match requested {
            Some(requested) => match identities
                .iter()
                .find(|i| i.email.eq_ignore_ascii_case(requested))
            {
                Some(identity) => identity,
                None => {
                    warn!(
                        requested = %requested,
                        fallback = %identities[0].email,
                        "Requested sender is not authorized, using first identity"
                    );
                    &identities[0]
                }
            },
            None => &identities[0],
        };

        let tokens = self.cipher.open(&identity.sealed_tokens).ok_or_else(|| {
            warn!(email = %identity.email, "Stored mail credentials could not be opened");
            AppError::AuthRequired(format!(
                "Credentials for {} are no longer valid; authorize again",
                identity.email
            ))
        })?;

        Ok((identity.email.clone(), tokens))
    }

    /// Forget an identity. Returns whether it existed.
    pub async fn remove(&self, session: &Session, email: &str) -> Result<bool, AppError> {
        let mut identities = self.load(session).await?;
        let before = identities.len();
        identities.retain(|i| !i.email.eq_ignore_ascii_case(email));
        let removed = identities.len() != before;

        self.save(session, &identities).await?;
        if removed {
            info!(email = %email, remaining = identities.len(), "Mail identity removed");
        }
        Ok(removed)
    }

    /// Remember the state and PKCE verifier of an authorization in flight.
    pub async fn begin_authorization(
        &self,
        session: &Session,
        state: &str,
        code_verifier: &str,
    ) -> Result<(), AppError> {
        session
            .insert(
                PENDING_AUTH_KEY,
                PendingAuthorization {
                    state: state.to_string(),
                    code_verifier: code_verifier.to_string(),
                },
            )
            .await
            .map_err(session_error)
    }

    /// Consume the pending authorization and return its PKCE verifier if
    /// `state` matches.
    pub async fn finish_authorization(
        &self,
        session: &Session,
        state: &str,
    ) -> Result<String, AppError> {
        let pending = session
            .remove::<PendingAuthorization>(PENDING_AUTH_KEY)
            .await
            .map_err(session_error)?
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("No authorization in progress"))
            })?;

        if pending.state != state {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
        }
        Ok(pending.code_verifier)
    }
}
