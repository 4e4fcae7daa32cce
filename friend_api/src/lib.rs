mod chat;
mod client;
mod decode;
mod error;
mod file;
mod types;
mod voice;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use chat::{ResponseMode, CHAT_PATH, RESPONSE_MODE_HEADER, SESSION_ID_HEADER};
pub use client::{ApiClient, ClientConfig, DEFAULT_API_BASE, HEALTH_PATH};
pub use decode::Utf8StreamDecoder;
pub use error::{ApiError, Result};
pub use file::{file_extension, is_accepted_file, ACCEPTED_EXTENSIONS, UPLOAD_TEXT_PATH};
pub use types::{
    ChatRequest, ChatResponse, FileUploadResponse, HealthResponse, StreamResult, VoiceResponse,
};
pub use voice::{DEFAULT_RECORDING_NAME, VOICE_PATH};

pub use tokio_util::sync::CancellationToken;
