pub mod config;
pub mod logging;
pub mod message;
pub mod page;
pub mod repl;
pub mod session;
pub mod view;
pub mod voice;

pub use message::{ChatMessage, Conversation, Role};
pub use page::ChatPage;
pub use session::{ChatSession, SendStatus, SessionEvent};
pub use voice::VoicePanel;
