use std::sync::{Mutex, MutexGuard, PoisonError};

use friend_api::{ApiClient, ApiError, CancellationToken, ChatRequest};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::message::{ChatMessage, Conversation};

const EVENT_CAPACITY: usize = 256;
const UNEXPECTED_ERROR: &str = "Unexpected error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Blank input; nothing was appended or sent.
    Skipped,
    Answered { streamed: bool },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chunk { message_id: String, text: String },
    MessagesChanged,
    Settled(SendStatus),
}

#[derive(Debug, Default)]
struct SessionState {
    conversation: Conversation,
    is_loading: bool,
    error: Option<String>,
    session_id: Option<String>,
    abort: Option<CancellationToken>,
}

/// State of one chat thread and the send/stream/fallback orchestration.
///
/// The state lock is only taken for short synchronous updates, never across
/// an await, so the session can be shared between the task driving a send
/// and a task that cancels it.
pub struct ChatSession {
    client: ApiClient,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(client: ApiClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            state: Mutex::new(SessionState::default()),
            events,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().conversation.messages().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state().session_id.clone()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn update_messages(&self, f: impl FnOnce(&mut Conversation)) {
        f(&mut self.state().conversation);
        self.emit(SessionEvent::MessagesChanged);
    }

    fn merge_chunk(&self, message_id: &str, chunk: &str) {
        self.state().conversation.append_content(message_id, chunk);
        self.emit(SessionEvent::Chunk {
            message_id: message_id.to_string(),
            text: chunk.to_string(),
        });
    }

    /// Sends `text` and settles the reply into the message list.
    ///
    /// The user message and an empty streaming assistant placeholder are
    /// appended before any network I/O. The reply is streamed into the
    /// placeholder when the backend supports it, otherwise fetched whole.
    /// On failure the placeholder is dropped, the user message stays and
    /// [`ChatSession::error`] carries the reason.
    pub async fn send_message(&self, text: &str) -> SendStatus {
        if text.trim().is_empty() {
            return SendStatus::Skipped;
        }

        let placeholder = ChatMessage::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        let cancel = CancellationToken::new();

        let prior_session_id = {
            let mut state = self.state();
            state.error = None;
            state.is_loading = true;
            state.conversation.push(ChatMessage::user(text));
            state.conversation.push(placeholder);
            state.abort = Some(cancel.clone());
            state.session_id.clone()
        };
        self.emit(SessionEvent::MessagesChanged);

        let payload = self.client.chat_request(text, prior_session_id.clone());
        let outcome = self
            .exchange(&payload, &placeholder_id, &cancel, prior_session_id)
            .await;

        let status = match outcome {
            Ok(streamed) => {
                info!("Chat reply settled: streamed = {streamed}");
                SendStatus::Answered { streamed }
            }
            Err(err) => {
                let message = err.user_message(UNEXPECTED_ERROR);
                warn!("Chat send failed: {message}");
                self.update_messages(|conversation| {
                    conversation.remove(&placeholder_id);
                });
                self.state().error = Some(message.clone());
                SendStatus::Failed(message)
            }
        };

        {
            let mut state = self.state();
            state.is_loading = false;
            state.abort = None;
        }
        self.emit(SessionEvent::Settled(status.clone()));

        status
    }

    async fn exchange(
        &self,
        payload: &ChatRequest,
        placeholder_id: &str,
        cancel: &CancellationToken,
        prior_session_id: Option<String>,
    ) -> Result<bool, ApiError> {
        let stream = self
            .client
            .stream_chat(payload, cancel, |chunk| self.merge_chunk(placeholder_id, chunk))
            .await?;

        if stream.streamed {
            self.update_messages(|conversation| {
                conversation.update(placeholder_id, |msg| msg.is_streaming = false);
            });
            self.state().session_id = stream.session_id.or(prior_session_id);
            return Ok(true);
        }

        debug!("Falling back to a non-streamed chat request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = self.client.send_chat(payload) => response?,
        };

        self.update_messages(|conversation| {
            conversation.update(placeholder_id, |msg| {
                msg.content = response.reply;
                msg.is_streaming = false;
            });
        });
        self.state().session_id = response.session_id.or(prior_session_id);
        Ok(false)
    }

    /// Aborts the most recent in-flight send, which then settles as failed.
    pub fn cancel_stream(&self) {
        if let Some(token) = self.state().abort.take() {
            info!("Cancelling in-flight chat request");
            token.cancel();
        }
    }

    pub fn clear_chat(&self) {
        {
            let mut state = self.state();
            state.conversation.clear();
            state.session_id = None;
            state.error = None;
        }
        self.emit(SessionEvent::MessagesChanged);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use friend_api::mock::{ChatBehavior, MockBackend, StatusCode, StreamReply};
    use test_log::test;

    use super::*;
    use crate::message::Role;

    fn session_for(backend: &MockBackend) -> Arc<ChatSession> {
        Arc::new(ChatSession::new(backend.client().unwrap()))
    }

    async fn next_chunk(events: &mut broadcast::Receiver<SessionEvent>) -> String {
        loop {
            if let SessionEvent::Chunk { text, .. } = events.recv().await.unwrap() {
                return text;
            }
        }
    }

    #[test(tokio::test)]
    async fn blank_input_is_a_no_op() {
        let backend = MockBackend::start(ChatBehavior::stream(["unused"])).unwrap();
        let session = session_for(&backend);

        assert_eq!(SendStatus::Skipped, session.send_message("   \n\t").await);
        assert_eq!(SendStatus::Skipped, session.send_message("").await);

        assert!(session.messages().is_empty());
        assert!(!session.is_loading());
        assert!(backend.chat_requests().is_empty());
    }

    #[test(tokio::test)]
    async fn pair_is_appended_before_any_reply() {
        let backend = MockBackend::start(ChatBehavior::hang("late")).unwrap();
        let session = session_for(&backend);
        let mut events = session.subscribe();

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send_message("hello?").await }
        });

        assert_eq!(SessionEvent::MessagesChanged, events.recv().await.unwrap());
        let messages = session.messages();
        assert_eq!(2, messages.len());
        assert_eq!(Role::User, messages[0].role);
        assert_eq!("hello?", messages[0].content);
        assert_eq!(Role::Assistant, messages[1].role);
        assert!(messages[1].is_streaming);
        assert!(session.is_loading());

        session.cancel_stream();
        send.await.unwrap();
    }

    #[test(tokio::test)]
    async fn streamed_chunks_merge_into_placeholder() {
        let backend = MockBackend::start(ChatBehavior::stream(["Hel", "lo"])).unwrap();
        let session = session_for(&backend);

        let status = session.send_message("hi").await;

        assert_eq!(SendStatus::Answered { streamed: true }, status);
        let messages = session.messages();
        assert_eq!(2, messages.len());
        assert_eq!("hi", messages[0].content);
        assert_eq!("Hello", messages[1].content);
        assert!(!messages[1].is_streaming);
        assert!(!session.is_loading());
        assert_eq!(None, session.error());
        assert_eq!(1, backend.chat_requests().len());
    }

    #[test(tokio::test)]
    async fn json_reply_falls_back_once_with_same_payload() {
        let backend =
            MockBackend::start(ChatBehavior::json("Hi there", Some("s-1".to_string()))).unwrap();
        let session = session_for(&backend);
        let mut events = session.subscribe();

        let status = session.send_message("hello").await;

        assert_eq!(SendStatus::Answered { streamed: false }, status);
        let messages = session.messages();
        assert_eq!("Hi there", messages[1].content);
        assert!(!messages[1].is_streaming);
        assert_eq!(Some("s-1".to_string()), session.session_id());

        let requests = backend.chat_requests();
        assert_eq!(2, requests.len());
        assert_eq!(Some("text/plain".to_string()), requests[0].accept);
        assert_ne!(Some("text/plain".to_string()), requests[1].accept);
        assert_eq!(requests[0].body, requests[1].body);

        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::Chunk { .. }));
        }
    }

    #[test(tokio::test)]
    async fn cancel_mid_stream_drops_placeholder_and_keeps_user_message() {
        let backend = MockBackend::start(ChatBehavior::hang("Hel")).unwrap();
        let session = session_for(&backend);
        let mut events = session.subscribe();

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send_message("tell me a story").await }
        });

        assert_eq!("Hel", next_chunk(&mut events).await);
        session.cancel_stream();
        let status = send.await.unwrap();

        assert_eq!(SendStatus::Failed("Request cancelled".to_string()), status);
        let messages = session.messages();
        assert_eq!(1, messages.len());
        assert_eq!(Role::User, messages[0].role);
        assert_eq!(Some("Request cancelled".to_string()), session.error());
        assert!(!session.is_loading());
    }

    #[test(tokio::test)]
    async fn cancel_during_fallback_settles_as_cancelled() {
        let backend =
            MockBackend::start(ChatBehavior::slow_json("too late", Duration::from_secs(1)))
                .unwrap();
        let session = session_for(&backend);

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send_message("slow question").await }
        });

        // the second recorded request is the non-streamed fallback
        while backend.chat_requests().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session.cancel_stream();
        let status = send.await.unwrap();

        assert_eq!(SendStatus::Failed("Request cancelled".to_string()), status);
        let messages = session.messages();
        assert_eq!(1, messages.len());
        assert_eq!(Role::User, messages[0].role);
        assert_eq!(Some("Request cancelled".to_string()), session.error());
        assert!(!session.is_loading());
    }

    #[test(tokio::test)]
    async fn failed_fallback_sets_error() {
        let backend =
            MockBackend::start(ChatBehavior::Status(StatusCode::INTERNAL_SERVER_ERROR)).unwrap();
        let session = session_for(&backend);

        let status = session.send_message("hi").await;

        assert_eq!(SendStatus::Failed("Chat request failed".to_string()), status);
        assert_eq!(1, session.messages().len());
        assert_eq!(Some("Chat request failed".to_string()), session.error());
        assert_eq!(2, backend.chat_requests().len());
    }

    #[test(tokio::test)]
    async fn next_send_clears_previous_error() {
        let backend =
            MockBackend::start(ChatBehavior::Status(StatusCode::BAD_GATEWAY)).unwrap();
        let session = session_for(&backend);
        session.send_message("first").await;
        assert!(session.error().is_some());

        backend.set_chat(ChatBehavior::stream(["fine"]));
        session.send_message("second").await;

        assert_eq!(None, session.error());
        assert_eq!(3, session.messages().len());
    }

    #[test(tokio::test)]
    async fn session_id_is_reused_when_reply_omits_it() {
        let backend =
            MockBackend::start(ChatBehavior::json("first", Some("abc".to_string()))).unwrap();
        let session = session_for(&backend);
        session.send_message("one").await;
        assert_eq!(Some("abc".to_string()), session.session_id());

        backend.set_chat(ChatBehavior::stream(["second"]));
        session.send_message("two").await;

        assert_eq!(Some("abc".to_string()), session.session_id());
        let requests = backend.chat_requests();
        let last = requests.last().unwrap();
        assert_eq!("two", last.body.message);
        assert_eq!(Some("abc".to_string()), last.body.session_id);
    }

    #[test(tokio::test)]
    async fn stream_session_header_replaces_session_id() {
        let reply = StreamReply::from_segments(vec![b"ok".to_vec()]).with_session_id("s-9");
        let backend = MockBackend::start(ChatBehavior::Stream(reply)).unwrap();
        let session = session_for(&backend);

        session.send_message("hi").await;

        assert_eq!(Some("s-9".to_string()), session.session_id());
    }

    #[test(tokio::test)]
    async fn clear_chat_resets_everything() {
        let backend =
            MockBackend::start(ChatBehavior::json("reply", Some("abc".to_string()))).unwrap();
        let session = session_for(&backend);
        session.send_message("hi").await;
        backend.set_chat(ChatBehavior::Status(StatusCode::BAD_REQUEST));
        session.send_message("again").await;
        assert!(session.error().is_some());

        session.clear_chat();

        assert!(session.messages().is_empty());
        assert_eq!(None, session.session_id());
        assert_eq!(None, session.error());
    }

    #[test(tokio::test)]
    async fn cancel_without_send_is_harmless() {
        let backend = MockBackend::start(ChatBehavior::stream(["x"])).unwrap();
        let session = session_for(&backend);

        session.cancel_stream();

        assert_eq!(SendStatus::Answered { streamed: true }, session.send_message("go").await);
    }
}
