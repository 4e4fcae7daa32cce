use std::{path::Path, time::Instant};

use friend_api::{ApiClient, DEFAULT_RECORDING_NAME};
use tracing::{info, warn};

const READ_ERROR: &str = "Could not read the recording.";
const TRANSCRIBE_ERROR: &str = "Transcription failed";

/// `mm:ss` label for a duration in whole seconds.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Turns a recorded clip into a preview the user accepts or discards.
///
/// Nothing here touches the chat session; a transcript only reaches the
/// composer through [`VoicePanel::use_preview`].
#[derive(Debug, Default)]
pub struct VoicePanel {
    pub is_processing: bool,
    pub preview_text: Option<String>,
    pub error: Option<String>,
    pub last_duration_secs: Option<u64>,
}

impl VoicePanel {
    pub async fn transcribe_file(&mut self, client: &ApiClient, path: &Path) {
        self.error = None;
        self.preview_text = None;
        self.last_duration_secs = None;

        let audio = match tokio::fs::read(path).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Failed to read recording '{}': {e}", path.display());
                self.error = Some(READ_ERROR.to_string());
                return;
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_RECORDING_NAME.to_string());

        self.is_processing = true;
        let started = Instant::now();
        let result = client.transcribe_audio(audio, &file_name).await;
        self.is_processing = false;

        match result {
            Ok(text) => {
                let elapsed = started.elapsed().as_secs();
                info!("Transcribed '{file_name}' in {}", format_elapsed(elapsed));
                self.last_duration_secs = Some(elapsed);
                self.preview_text = Some(text);
            }
            Err(e) => {
                self.error = Some(e.user_message(TRANSCRIBE_ERROR));
            }
        }
    }

    pub fn has_preview(&self) -> bool {
        self.preview_text.is_some()
    }

    /// Takes the trimmed preview when it has any text; the preview is cleared either way.
    pub fn use_preview(&mut self) -> Option<String> {
        let text = self.preview_text.take()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn discard_preview(&mut self) {
        self.preview_text = None;
    }
}
