pub mod documents;
pub mod mail;

pub use documents::{ActivityQuery, ActivityResponse, DocumentPayload, PdfQuery, SaveResponse};
pub use mail::{
    AccountsResponse, EmailDocumentRequest, OAuthCallbackQuery, SendMailRequest, SendMailResponse,
    SenderQuery,
};
