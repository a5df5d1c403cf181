//! Domain models for invoicing-service.

pub mod activity;
pub mod document;
pub mod party;

pub use activity::{merge_recent, ActivityEntry};
pub use document::{
    DocumentContent, DocumentItem, DocumentKind, DocumentRecord, SaveAction, SavePolicy,
    StoredDocument,
};
pub use party::PartyBlock;
