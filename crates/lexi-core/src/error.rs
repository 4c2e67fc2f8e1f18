use thiserror::Error;

use crate::workspace::TabId;

pub type Result<T> = std::result::Result<T, LexiError>;

#[derive(Debug, Error)]
pub enum LexiError {
    /// No provider has been configured (missing API key or offline mode off).
    #[error("AI provider is not initialized. Set an API key or pick another provider.")]
    ProviderUnavailable,

    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("Lexi is still responding in tab {0}")]
    SendInProgress(TabId),

    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    /// Failure reported by the provider while opening or reading a stream.
    #[error("{0}")]
    Stream(String),

    /// Transport failure. The request URL is stripped before it is stored.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Invalid .aitxt file format: {0}")]
    InvalidDocumentFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LexiError {
    fn from(err: reqwest::Error) -> Self {
        LexiError::Http(err.without_url())
    }
}
