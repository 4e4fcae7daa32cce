use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Failures surfaced by the backend client.
///
/// The `Display` output of each variant is what ends up in front of the user,
/// so fixed messages mirror what the chat view shows.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, protocol or body decoding failure reported by `reqwest`.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Chat request failed")]
    Chat,

    #[error("Voice transcription failed")]
    Voice,

    /// Upload rejected by the backend; carries the server's `detail` text.
    #[error("{0}")]
    Upload(String),

    #[error("File type {0} not supported")]
    UnsupportedFileType(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid api base url: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Message for display, substituting `fallback` when the error has no text.
    pub fn user_message(&self, fallback: &str) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_owned()
        } else {
            message
        }
    }
}
