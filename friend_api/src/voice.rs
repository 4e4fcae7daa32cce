use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::{ApiClient, ApiError, Result, VoiceResponse};

pub const VOICE_PATH: &str = "api/v1/voice";
pub const DEFAULT_RECORDING_NAME: &str = "recording.webm";

impl ApiClient {
    /// Uploads one recorded clip and returns the backend's best-effort transcript.
    pub async fn transcribe_audio(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        let url = self.endpoint(VOICE_PATH)?;
        debug!("Uploading {} bytes of audio for transcription", audio.len());

        let part = Part::bytes(audio).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response = self.http.post(url).multipart(form).send().await?;
        if !response.status().is_success() {
            warn!("Transcription rejected: status = {}", response.status());
            return Err(ApiError::Voice);
        }

        let body: VoiceResponse = response.json().await?;
        Ok(body.text)
    }
}
