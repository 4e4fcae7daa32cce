use std::time::Duration;

use reqwest::Url;
use tracing::{debug, info};

use crate::{ApiError, ChatRequest, HealthResponse, Result};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const HEALTH_PATH: &str = "api/v1/health";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Option<Duration>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
            model: None,
            temperature: None,
        }
    }
}

/// Thin wrapper over the backend's `/api/v1` endpoints.
///
/// Each call maps one request shape to one HTTP round trip. There are no
/// retries; failures are returned to the caller as they happen.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    base_url: Url,
    model: Option<String>,
    temperature: Option<f32>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        // trailing slash so relative endpoint paths keep any base prefix
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.base_url));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            // a total timeout would cut long streamed replies short
            builder = builder.connect_timeout(timeout);
        }

        info!("Configured api client for {base_url}");
        Ok(Self {
            http: builder.build()?,
            base_url,
            model: config.model,
            temperature: config.temperature,
        })
    }

    pub fn from_base_url(base_url: &str) -> Result<Self> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}{path}: {e}", self.base_url)))
    }

    /// Builds a chat payload carrying the client's model settings.
    pub fn chat_request(&self, message: &str, session_id: Option<String>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            session_id,
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint(HEALTH_PATH)?;
        debug!("Checking backend health at {url}");
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
