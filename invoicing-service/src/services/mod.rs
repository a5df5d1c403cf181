//! Services module for invoicing-service.

pub mod database;
pub mod executor;
pub mod google;
pub mod mailer;
pub mod metrics;
pub mod pdf;
pub mod providers;
pub mod reconciler;
pub mod renderer;
pub mod store;
pub mod totals;
pub mod vault;

pub use database::Database;
pub use google::{GoogleOAuthClient, TokenSet};
pub use mailer::{MailDispatcher, OutgoingMail};
pub use metrics::{get_metrics, init_metrics};
pub use pdf::{ChromiumRenderer, MockPdfRenderer, PdfOptions, PdfRenderer};
pub use providers::{GmailProvider, MailProvider, MockMailProvider};
pub use store::{DocumentRepository, MemoryStore};
pub use vault::{IdentityVault, TokenCipher};
