use crate::services::pdf::{PageFormat, PdfOptions};
use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` keeps documents in memory (development only).
    pub database: Option<DatabaseConfig>,
    /// `None` disables the mail endpoints with a configuration error.
    pub google: Option<GoogleConfig>,
    pub mail: MailConfig,
    pub session: SessionConfig,
    pub pdf: PdfConfig,
    pub documents: DocumentDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProviderKind {
    Gmail,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub provider: MailProviderKind,
    pub gmail_api_url: String,
    /// Base64 of 32 random bytes. Generated per process outside production.
    pub token_encryption_key: Option<Secret<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfEngine {
    Chromium,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    pub engine: PdfEngine,
    pub chromium_path: String,
    pub timeout_secs: u64,
    pub default_format: PageFormat,
    pub default_scale: f64,
}

impl PdfConfig {
    pub fn default_options(&self) -> PdfOptions {
        PdfOptions {
            format: self.default_format,
            scale: self.default_scale,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDefaults {
    pub logo_url: Option<String>,
    pub currency: String,
}

impl InvoicingConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = common_config.is_production();

        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1)?,
            }),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )))
            }
            Err(_) => None,
        };

        // Mail endpoints stay available for configuration errors without
        // these; they are never required at startup.
        let google = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret: Secret::new(client_secret),
                redirect_uri: get_env(
                    "GOOGLE_REDIRECT_URI",
                    Some("http://localhost:8080/mail/oauth2callback"),
                    is_prod,
                )?,
                auth_url: get_env(
                    "GOOGLE_AUTH_URL",
                    Some("https://accounts.google.com/o/oauth2/v2/auth"),
                    false,
                )?,
                token_url: get_env(
                    "GOOGLE_TOKEN_URL",
                    Some("https://oauth2.googleapis.com/token"),
                    false,
                )?,
                userinfo_url: get_env(
                    "GOOGLE_USERINFO_URL",
                    Some("https://www.googleapis.com/oauth2/v2/userinfo"),
                    false,
                )?,
            }),
            _ => None,
        };

        let provider = match get_env("MAIL_PROVIDER", Some("gmail"), false)?.as_str() {
            "gmail" => MailProviderKind::Gmail,
            "mock" => MailProviderKind::Mock,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "MAIL_PROVIDER must be 'gmail' or 'mock', got '{}'",
                    other
                )))
            }
        };

        let token_encryption_key = match env::var("TOKEN_ENCRYPTION_KEY") {
            Ok(key) => Some(Secret::new(key)),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_ENCRYPTION_KEY is required in production but not set"
                )))
            }
            Err(_) => None,
        };

        let engine = match get_env("PDF_ENGINE", Some("chromium"), false)?.as_str() {
            "chromium" => PdfEngine::Chromium,
            "mock" => PdfEngine::Mock,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "PDF_ENGINE must be 'chromium' or 'mock', got '{}'",
                    other
                )))
            }
        };

        Ok(InvoicingConfig {
            service_name: "invoicing-service".to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database,
            google,
            mail: MailConfig {
                provider,
                gmail_api_url: get_env(
                    "GMAIL_API_URL",
                    Some("https://gmail.googleapis.com"),
                    false,
                )?,
                token_encryption_key,
            },
            session: SessionConfig {
                secure_cookie: parse_env("SESSION_SECURE_COOKIE", is_prod)?,
            },
            pdf: PdfConfig {
                engine,
                chromium_path: get_env("CHROMIUM_PATH", Some("chromium"), false)?,
                timeout_secs: parse_env("PDF_TIMEOUT_SECS", 30)?,
                default_format: get_env("PDF_DEFAULT_FORMAT", Some("A4"), false)?
                    .parse()
                    .map_err(|e: AppError| AppError::ConfigError(anyhow::anyhow!("{}", e)))?,
                default_scale: parse_env("PDF_DEFAULT_SCALE", 1.0)?,
            },
            documents: DocumentDefaults {
                logo_url: env::var("DEFAULT_LOGO_URL").ok().filter(|s| !s.is_empty()),
                currency: get_env("DEFAULT_CURRENCY", Some("USD"), false)?,
            },
            common: common_config,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Optional typed variable; a present but unparsable value is an error.
fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}
