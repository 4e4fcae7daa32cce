use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_streaming: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            is_streaming: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Empty assistant turn that fills in as the reply arrives.
    pub fn assistant_placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Role::Assistant, String::new())
        }
    }
}

/// Ordered message list of one chat thread.
///
/// Mutations address messages by id and leave every other entry untouched.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut ChatMessage)) -> bool {
        match self.messages.iter_mut().find(|msg| msg.id == id) {
            Some(msg) => {
                f(msg);
                true
            }
            None => false,
        }
    }

    pub fn append_content(&mut self, id: &str, chunk: &str) -> bool {
        self.update(id, |msg| msg.content.push_str(chunk))
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatMessage> {
        let index = self.messages.iter().position(|msg| msg.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|msg| msg.id == id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
