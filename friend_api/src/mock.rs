//! In-process stand-in for the assistant backend.
//!
//! Serves the same `/api/v1` routes as the real service on an ephemeral
//! localhost port, records what it receives, and replies according to the
//! configured behaviour. Streamed replies are pushed through a body channel
//! one segment at a time so clients observe real chunk boundaries.

use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use axum::http::StatusCode;

use crate::{
    file_extension, ApiClient, ChatRequest, ChatResponse, CHAT_PATH, HEALTH_PATH,
    RESPONSE_MODE_HEADER, SESSION_ID_HEADER, UPLOAD_TEXT_PATH, VOICE_PATH,
};

const SEGMENT_INTERVAL: Duration = Duration::from_millis(15);
const HANG_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct StreamReply {
    pub segments: Vec<Vec<u8>>,
    pub session_id: Option<String>,
    pub content_type: Option<String>,
    pub response_mode: Option<String>,
}

impl StreamReply {
    pub fn from_segments(segments: Vec<Vec<u8>>) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_response_mode(mut self, mode: &str) -> Self {
        self.response_mode = Some(mode.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub enum ChatBehavior {
    Stream(StreamReply),
    Json {
        reply: String,
        session_id: Option<String>,
    },
    Status(StatusCode),
    /// Streams `first`, then holds the connection open without finishing.
    Hang { first: Vec<u8> },
    /// Answers with a JSON reply only after `delay`.
    SlowJson { reply: String, delay: Duration },
}

impl ChatBehavior {
    pub fn stream<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let segments = segments.into_iter().map(|s| s.as_bytes().to_vec()).collect();
        ChatBehavior::Stream(StreamReply::from_segments(segments))
    }

    pub fn json(reply: &str, session_id: Option<String>) -> Self {
        ChatBehavior::Json {
            reply: reply.to_string(),
            session_id,
        }
    }

    pub fn hang(first: &str) -> Self {
        ChatBehavior::Hang {
            first: first.as_bytes().to_vec(),
        }
    }

    pub fn slow_json(reply: &str, delay: Duration) -> Self {
        ChatBehavior::SlowJson {
            reply: reply.to_string(),
            delay,
        }
    }
}

#[derive(Debug, Clone)]
pub enum VoiceBehavior {
    Text(String),
    MissingText,
    Status(StatusCode),
}

#[derive(Debug, Clone)]
pub enum UploadBehavior {
    Echo,
    Reject { status: StatusCode, body: String },
}

#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub accept: Option<String>,
    pub body: ChatRequest,
}

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub field: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

struct MockState {
    chat: Mutex<ChatBehavior>,
    voice: Mutex<VoiceBehavior>,
    upload: Mutex<UploadBehavior>,
    chat_requests: Mutex<Vec<RecordedChat>>,
    uploads: Mutex<Vec<RecordedUpload>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Binds an ephemeral port and serves on the current tokio runtime.
    pub fn start(chat: ChatBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            chat: Mutex::new(chat),
            voice: Mutex::new(VoiceBehavior::Text(String::new())),
            upload: Mutex::new(UploadBehavior::Echo),
            chat_requests: Mutex::new(vec![]),
            uploads: Mutex::new(vec![]),
        });

        let app = Router::new()
            .route(&format!("/{CHAT_PATH}"), post(chat_handler))
            .route(&format!("/{VOICE_PATH}"), post(voice_handler))
            .route(&format!("/{UPLOAD_TEXT_PATH}"), post(upload_handler))
            .route(&format!("/{HEALTH_PATH}"), get(health_handler))
            .with_state(state.clone());

        let server = axum::Server::from_tcp(listener)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let server = tokio::spawn(async move {
            if let Err(e) = server.serve(app.into_make_service()).await {
                error!("mock backend stopped: {e}");
            }
        });

        info!("mock backend listening on {addr}");
        Ok(Self {
            addr,
            state,
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> crate::Result<ApiClient> {
        ApiClient::from_base_url(&self.base_url())
    }

    pub fn set_chat(&self, behavior: ChatBehavior) {
        *lock(&self.state.chat) = behavior;
    }

    pub fn set_voice(&self, behavior: VoiceBehavior) {
        *lock(&self.state.voice) = behavior;
    }

    pub fn set_upload(&self, behavior: UploadBehavior) {
        *lock(&self.state.upload) = behavior;
    }

    pub fn chat_requests(&self) -> Vec<RecordedChat> {
        lock(&self.state.chat_requests).clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        lock(&self.state.uploads).clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn chat_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    lock(&state.chat_requests).push(RecordedChat { accept, body });

    let behavior = lock(&state.chat).clone();
    match behavior {
        ChatBehavior::Json { reply, session_id } => Json(ChatResponse {
            reply,
            session_id,
            ..Default::default()
        })
        .into_response(),
        ChatBehavior::Status(status) => (status, "backend unavailable").into_response(),
        ChatBehavior::Stream(reply) => stream_response(reply),
        ChatBehavior::Hang { first } => hanging_response(first),
        ChatBehavior::SlowJson { reply, delay } => {
            tokio::time::sleep(delay).await;
            Json(ChatResponse {
                reply,
                ..Default::default()
            })
            .into_response()
        }
    }
}

fn stream_response(reply: StreamReply) -> Response {
    let StreamReply {
        segments,
        session_id,
        content_type,
        response_mode,
    } = reply;

    let (mut tx, body) = Body::channel();
    tokio::spawn(async move {
        for segment in segments {
            if tx.send_data(Bytes::from(segment)).await.is_err() {
                return;
            }
            tokio::time::sleep(SEGMENT_INTERVAL).await;
        }
    });

    let content_type = content_type.unwrap_or_else(|| "text/plain; charset=utf-8".to_string());
    let mut builder = axum::http::Response::builder().header(header::CONTENT_TYPE, content_type);
    if let Some(session_id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, session_id);
    }
    if let Some(mode) = response_mode {
        builder = builder.header(RESPONSE_MODE_HEADER, mode);
    }

    builder
        .body(body)
        .map(IntoResponse::into_response)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn hanging_response(first: Vec<u8>) -> Response {
    let (mut tx, body) = Body::channel();
    tokio::spawn(async move {
        if tx.send_data(Bytes::from(first)).await.is_err() {
            return;
        }
        tokio::time::sleep(HANG_DURATION).await;
        drop(tx);
    });

    axum::http::Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body)
        .map(IntoResponse::into_response)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn read_file_field(multipart: &mut Multipart) -> Option<RecordedUpload> {
    let field = multipart.next_field().await.ok().flatten()?;
    let name = field.name().unwrap_or_default().to_string();
    let file_name = field.file_name().map(str::to_owned);
    let bytes = field.bytes().await.ok()?;

    Some(RecordedUpload {
        field: name,
        file_name,
        bytes: bytes.to_vec(),
    })
}

async fn voice_handler(State(state): State<Arc<MockState>>, mut multipart: Multipart) -> Response {
    let Some(upload) = read_file_field(&mut multipart).await else {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing file").into_response();
    };
    lock(&state.uploads).push(upload);

    let behavior = lock(&state.voice).clone();
    match behavior {
        VoiceBehavior::Text(text) => Json(json!({ "text": text })).into_response(),
        VoiceBehavior::MissingText => Json(json!({})).into_response(),
        VoiceBehavior::Status(status) => status.into_response(),
    }
}

async fn upload_handler(State(state): State<Arc<MockState>>, mut multipart: Multipart) -> Response {
    let Some(upload) = read_file_field(&mut multipart).await else {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing file").into_response();
    };
    lock(&state.uploads).push(upload.clone());

    let behavior = lock(&state.upload).clone();
    match behavior {
        UploadBehavior::Echo => {
            let filename = upload.file_name.unwrap_or_default();
            let file_type = file_extension(&filename).unwrap_or_default();
            Json(json!({
                "filename": filename,
                "content": String::from_utf8_lossy(&upload.bytes),
                "size": upload.bytes.len(),
                "type": file_type,
            }))
            .into_response()
        }
        UploadBehavior::Reject { status, body } => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
