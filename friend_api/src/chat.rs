use futures::StreamExt;
use reqwest::{
    header::{self, HeaderMap},
    StatusCode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    ApiClient, ApiError, ChatRequest, ChatResponse, Result, StreamResult, Utf8StreamDecoder,
};

pub const CHAT_PATH: &str = "api/v1/chat";

/// Optional header a backend can set to state the reply format outright.
pub const RESPONSE_MODE_HEADER: &str = "x-response-mode";
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Stream,
    Json,
}

impl ResponseMode {
    /// An explicit `x-response-mode` wins; otherwise a JSON content type
    /// means a whole reply and anything else is read as a text stream.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let explicit = headers
            .get(RESPONSE_MODE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase());

        match explicit.as_deref() {
            Some("stream") => return ResponseMode::Stream,
            Some("json") => return ResponseMode::Json,
            _ => {}
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.contains("application/json") {
            ResponseMode::Json
        } else {
            ResponseMode::Stream
        }
    }
}

impl ApiClient {
    pub async fn send_chat(&self, payload: &ChatRequest) -> Result<ChatResponse> {
        let url = self.endpoint(CHAT_PATH)?;
        debug!("Sending chat request to {url}");

        let response = self.http.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            warn!("Chat request rejected: status = {}", response.status());
            return Err(ApiError::Chat);
        }

        Ok(response.json().await?)
    }

    /// Attempts to read the chat reply as an incremental text stream.
    ///
    /// `on_chunk` receives each decoded fragment as soon as its segment is
    /// read. When the backend answers with an error status, an empty body or
    /// a JSON reply, no fragment is delivered and `streamed` is false, so the
    /// caller can fall back to [`ApiClient::send_chat`]. Cancelling `cancel`
    /// while waiting yields [`ApiError::Cancelled`].
    pub async fn stream_chat<F>(
        &self,
        payload: &ChatRequest,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<StreamResult>
    where
        F: FnMut(&str),
    {
        let url = self.endpoint(CHAT_PATH)?;
        let request = self
            .http
            .post(url)
            .header(header::ACCEPT, "text/plain")
            .json(payload);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() || status == StatusCode::NO_CONTENT {
            info!("Streaming unavailable: status = {status}");
            return Ok(StreamResult::not_streamed());
        }
        if ResponseMode::from_headers(response.headers()) == ResponseMode::Json {
            debug!("Backend replied with json, streaming skipped");
            return Ok(StreamResult::not_streamed());
        }

        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        let stream = response.bytes_stream();
        tokio::pin!(stream);
        let mut decoder = Utf8StreamDecoder::new();
        let mut segments = 0_usize;

        loop {
            let segment = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Chat stream cancelled after {segments} segments");
                    return Err(ApiError::Cancelled);
                }
                segment = stream.next() => segment,
            };

            let Some(segment) = segment else {
                break;
            };
            segments += 1;

            let text = decoder.decode(&segment?);
            if !text.is_empty() {
                on_chunk(&text);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            on_chunk(&tail);
        }

        debug!("Completed chat stream: segments = {segments}");
        Ok(StreamResult {
            streamed: true,
            session_id,
        })
    }
}
