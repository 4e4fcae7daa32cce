//! Terminal renderings of the chat surface.
//!
//! Each function returns a ready-to-print string; styling goes through
//! `crossterm::style` so colours degrade the same way the rest of the
//! terminal output does.

use crossterm::style::Stylize;

use crate::{
    message::{ChatMessage, Role},
    page::ChatPage,
    voice::{format_elapsed, VoicePanel},
};

pub const STREAMING_MARKER: &str = "Streaming...";
pub const ERROR_TITLE: &str = "Something went wrong.";
pub const THINKING_LABEL: &str = "Thinking";
pub const AWAITING_LABEL: &str = "Awaiting your first message";
pub const CODE_MODE_READY_LABEL: &str = "Ready for coding tasks";
pub const CODE_MODE_HEADER: &str =
    "Code Mode - Ask coding questions, paste code for review, or request code generation";
pub const ATTACHMENT_READY: &str = "✅ File uploaded and ready to send";

pub fn message_label(message: &ChatMessage) -> &'static str {
    match message.role {
        Role::User => "You",
        Role::Assistant | Role::System => "AI",
    }
}

pub fn message_body(message: &ChatMessage) -> &str {
    if message.content.is_empty() {
        "..."
    } else {
        &message.content
    }
}

/// Header line for a message, without its body.
pub fn render_message_meta(message: &ChatMessage) -> String {
    let label = match message.role {
        Role::User => message_label(message).cyan().bold(),
        _ => message_label(message).green().bold(),
    };
    if message.is_streaming {
        format!("{label} {}", STREAMING_MARKER.dim().italic())
    } else {
        label.to_string()
    }
}

/// Label printed once before a streamed reply's first chunk.
pub fn render_reply_header() -> String {
    "AI".green().bold().to_string()
}

pub fn render_message(message: &ChatMessage) -> String {
    format!("{}\n{}", render_message_meta(message), message_body(message))
}

pub fn render_error_banner(message: &str) -> String {
    format!("{} {}", ERROR_TITLE.red().bold(), message.red())
}

pub fn render_loading_dots(label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{} {}", label.dim(), "• • •".dim()),
        None => "• • •".dim().to_string(),
    }
}

/// Label for the empty message list while a reply is pending.
pub fn empty_state_label(show_code_mode: bool) -> &'static str {
    if show_code_mode {
        CODE_MODE_READY_LABEL
    } else {
        AWAITING_LABEL
    }
}

pub fn render_code_mode_header() -> String {
    format!("{}", CODE_MODE_HEADER.magenta().bold())
}

pub fn render_attachment_notice() -> String {
    ATTACHMENT_READY.green().to_string()
}

pub fn render_voice_panel(voice: &VoicePanel) -> Option<String> {
    if voice.is_processing {
        return Some(render_loading_dots(Some("Transcribing")));
    }
    if let Some(error) = &voice.error {
        return Some(error.as_str().red().to_string());
    }

    let preview = voice.preview_text.as_deref()?;
    let heading = match voice.last_duration_secs {
        Some(secs) => format!("Transcription preview ({})", format_elapsed(secs)),
        None => "Transcription preview".to_string(),
    };
    let shown = if preview.trim().is_empty() {
        "(no speech detected)"
    } else {
        preview
    };
    Some(format!(
        "{}\n{}\n{}",
        heading.bold(),
        shown,
        "Type .use to move it into the composer or .discard to drop it".dim()
    ))
}

/// Full redraw of the message list and the page's banners.
pub fn render_transcript(
    messages: &[ChatMessage],
    error: Option<&str>,
    is_loading: bool,
    page: &ChatPage,
) -> String {
    let mut blocks = vec![];

    if let Some(error) = error {
        blocks.push(render_error_banner(error));
    }
    if page.uploaded_file.is_some() {
        blocks.push(render_attachment_notice());
    }
    if page.show_code_mode {
        blocks.push(render_code_mode_header());
    }

    blocks.extend(messages.iter().map(render_message));

    if is_loading && messages.is_empty() {
        blocks.push(render_loading_dots(Some(empty_state_label(
            page.show_code_mode,
        ))));
    }

    blocks.join("\n\n")
}
