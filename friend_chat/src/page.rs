use std::path::Path;

use friend_api::{ApiClient, FileUploadResponse};
use tracing::{debug, info};

use crate::{
    session::{ChatSession, SendStatus},
    voice::VoicePanel,
};

pub const ATTACHMENT_MARKER: &str = "[Attached File Content]:";

/// Fenced block the uploaded file is sent as.
pub fn format_attachment(upload: &FileUploadResponse) -> String {
    let lang = upload.file_type.trim_start_matches('.');
    format!(
        "[File: {}]\n```{lang}\n{}\n```",
        upload.filename, upload.content
    )
}

/// Composer-side state around a [`ChatSession`].
#[derive(Debug, Default)]
pub struct ChatPage {
    pub input: String,
    pub show_code_mode: bool,
    pub uploaded_file: Option<String>,
    pub is_uploading: bool,
    pub voice: VoicePanel,
}

impl ChatPage {
    /// Text the next send would carry, attachment included.
    pub fn compose_message(&self) -> String {
        match &self.uploaded_file {
            Some(attachment) => format!("{}\n\n{ATTACHMENT_MARKER}\n{attachment}", self.input),
            None => self.input.clone(),
        }
    }

    pub async fn handle_send(&mut self, session: &ChatSession) -> SendStatus {
        let text = self.compose_message();
        if text.trim().is_empty() {
            return SendStatus::Skipped;
        }

        if self.uploaded_file.take().is_some() {
            debug!("Sending message with attached file");
        }
        self.input.clear();
        session.send_message(&text).await
    }

    pub async fn attach_file(&mut self, client: &ApiClient, path: &Path) -> Result<(), String> {
        self.is_uploading = true;
        let result = client.upload_text_file(path).await;
        self.is_uploading = false;

        match result {
            Ok(upload) => {
                info!("Attached '{}' ({} bytes)", upload.filename, upload.size);
                self.uploaded_file = Some(format_attachment(&upload));
                Ok(())
            }
            Err(e) => Err(format!("Upload failed: {e}")),
        }
    }

    pub fn clear(&mut self, session: &ChatSession) {
        session.clear_chat();
        self.input.clear();
        self.uploaded_file = None;
    }

    pub fn toggle_code_mode(&mut self) -> bool {
        self.show_code_mode = !self.show_code_mode;
        self.show_code_mode
    }

    /// Replaces the composer text with an accepted transcript.
    pub fn accept_transcription(&mut self) -> bool {
        match self.voice.use_preview() {
            Some(text) => {
                self.input = text;
                true
            }
            None => false,
        }
    }
}
