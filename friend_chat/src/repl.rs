use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Context;
use friend_api::ACCEPTED_EXTENSIONS;
use itertools::Itertools;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, warn};

use crate::{
    page::ChatPage,
    session::{ChatSession, SendStatus, SessionEvent},
    view,
};

const COMMANDS: &[(&str, &str)] = &[
    (".help", "show this list"),
    (".quit", "leave the chat"),
    (".clear", "clear all messages"),
    (".code", "toggle code mode"),
    (".upload <path>", "attach a text file to the next message"),
    (".voice <path>", "transcribe a recorded clip"),
    (".use", "replace the draft with the transcription preview"),
    (".discard", "drop the transcription preview"),
    (".history", "redraw the conversation"),
    (".health", "check the backend"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Message(String),
    SendDraft,
    Help,
    Quit,
    Clear,
    ToggleCode,
    Upload(PathBuf),
    Voice(PathBuf),
    UsePreview,
    DiscardPreview,
    History,
    Health,
    Usage(&'static str),
    Unknown(String),
}

pub fn parse_repl_command(input_txt: &str) -> ReplCommand {
    let input_txt = input_txt.trim();
    if input_txt.is_empty() {
        return ReplCommand::SendDraft;
    }
    if !input_txt.starts_with('.') {
        return ReplCommand::Message(input_txt.to_string());
    }
    // `..` escapes a message that starts with a dot
    if let Some(escaped) = input_txt.strip_prefix("..") {
        return ReplCommand::Message(format!(".{escaped}"));
    }

    let (command, arg) = match input_txt.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (input_txt, ""),
    };

    match (command, arg) {
        (".help", _) => ReplCommand::Help,
        (".quit", _) => ReplCommand::Quit,
        (".clear", _) => ReplCommand::Clear,
        (".code", _) => ReplCommand::ToggleCode,
        (".use", _) => ReplCommand::UsePreview,
        (".discard", _) => ReplCommand::DiscardPreview,
        (".history", _) => ReplCommand::History,
        (".health", _) => ReplCommand::Health,
        (".upload", "") => ReplCommand::Usage(".upload <FILE_PATH>"),
        (".upload", path) => ReplCommand::Upload(PathBuf::from(path)),
        (".voice", "") => ReplCommand::Usage(".voice <RECORDING_PATH>"),
        (".voice", path) => ReplCommand::Voice(PathBuf::from(path)),
        _ if is_command_word(command) => ReplCommand::Unknown(command.to_string()),
        _ => ReplCommand::Message(input_txt.to_string()),
    }
}

/// Commands are a dot followed by lowercase letters; `.NET` or `.5` are text.
fn is_command_word(command: &str) -> bool {
    command
        .strip_prefix('.')
        .map_or(false, |word| {
            !word.is_empty() && word.chars().all(|c| c.is_ascii_lowercase())
        })
}

pub fn help_text() -> String {
    let commands = COMMANDS
        .iter()
        .map(|(command, about)| format!("   {command:<16} {about}"))
        .join("\n");
    format!(
        "{commands}\n   Any other line is sent as a message; start it with `..` to send a leading dot.\n   An empty line sends the pending draft.\n   Ctrl-C cancels a reply in flight.\n   Attachable files: {}",
        ACCEPTED_EXTENSIONS.iter().join(" ")
    )
}

fn flush() -> anyhow::Result<()> {
    io::stdout().flush().context("failed to flush stdout")
}

fn prompt() -> anyhow::Result<()> {
    print!("\n> ");
    flush()
}

async fn next_line(lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<String>> {
    tokio::select! {
        line = lines.next_line() => line.context("failed to read from stdin"),
        _ = tokio::signal::ctrl_c() => Ok(None),
    }
}

pub async fn run(session: &ChatSession, page: &mut ChatPage) -> anyhow::Result<()> {
    println!("Connected to {}", session.client().base_url());
    println!("   - Commands available: [ '.help' | '.upload <path>' | '.voice <path>' | '.code' | '.clear' | '.quit' ]");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let Some(input_txt) = next_line(&mut lines).await? else {
            break;
        };

        match parse_repl_command(&input_txt) {
            ReplCommand::Message(text) => {
                if page.input.trim().is_empty() {
                    page.input = text;
                } else {
                    page.input.push('\n');
                    page.input.push_str(&text);
                }
                send_and_render(session, page).await?;
            }
            ReplCommand::SendDraft => {
                if page.compose_message().trim().is_empty() {
                    continue;
                }
                send_and_render(session, page).await?;
            }
            ReplCommand::Help => println!("{}", help_text()),
            ReplCommand::Quit => break,
            ReplCommand::Clear => {
                print!("Clear all messages? [y/N] ");
                flush()?;
                let answer = next_line(&mut lines).await?.unwrap_or_default();
                if matches!(answer.trim(), "y" | "Y" | "yes") {
                    page.clear(session);
                    println!("Conversation cleared");
                }
            }
            ReplCommand::ToggleCode => {
                if page.toggle_code_mode() {
                    println!("{}", view::render_code_mode_header());
                } else {
                    println!("Code mode off");
                }
            }
            ReplCommand::Upload(path) => {
                println!("{}", view::render_loading_dots(Some("Uploading")));
                match page.attach_file(session.client(), &path).await {
                    Ok(()) => println!("{}", view::render_attachment_notice()),
                    Err(message) => println!("{}", view::render_error_banner(&message)),
                }
            }
            ReplCommand::Voice(path) => {
                println!("{}", view::render_loading_dots(Some("Transcribing")));
                page.voice.transcribe_file(session.client(), &path).await;
                if let Some(panel) = view::render_voice_panel(&page.voice) {
                    println!("{panel}");
                }
            }
            ReplCommand::UsePreview => {
                if page.accept_transcription() {
                    println!("Draft: {}", page.input);
                    println!("Press Enter to send it, or type more to add to it");
                } else {
                    println!("No transcription to use");
                }
            }
            ReplCommand::DiscardPreview => {
                page.voice.discard_preview();
                println!("Transcription discarded");
            }
            ReplCommand::History => {
                let messages = session.messages();
                let error = session.error();
                println!(
                    "{}",
                    view::render_transcript(&messages, error.as_deref(), session.is_loading(), page)
                );
            }
            ReplCommand::Health => match session.client().health().await {
                Ok(health) => println!("Backend status: {}", health.status),
                Err(e) => println!("{}", view::render_error_banner(&e.to_string())),
            },
            ReplCommand::Usage(usage) => println!("Command usage: {usage}"),
            ReplCommand::Unknown(command) => {
                println!("Unknown command '{command}', try .help");
            }
        }
    }

    Ok(())
}

/// Drives one send, printing chunks as they land; Ctrl-C cancels it.
async fn send_and_render(session: &ChatSession, page: &mut ChatPage) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    let mut header_printed = false;

    println!("{}", view::render_loading_dots(Some(view::THINKING_LABEL)));

    let send = page.handle_send(session);
    tokio::pin!(send);

    let status = loop {
        tokio::select! {
            status = &mut send => break status,
            event = events.recv() => match event {
                Ok(SessionEvent::Chunk { text, .. }) => {
                    print_chunk(&text, &mut header_printed)?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Render fell behind by {skipped} events");
                }
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Ctrl-C during send");
                session.cancel_stream();
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Chunk { text, .. } = event {
            print_chunk(&text, &mut header_printed)?;
        }
    }

    match status {
        SendStatus::Skipped => {}
        SendStatus::Answered { streamed: true } => println!(),
        SendStatus::Answered { streamed: false } => {
            if let Some(reply) = session.messages().last() {
                println!("{}", view::render_message(reply));
            }
        }
        SendStatus::Failed(message) => {
            if header_printed {
                println!();
            }
            println!("{}", view::render_error_banner(&message));
        }
    }

    Ok(())
}

fn print_chunk(text: &str, header_printed: &mut bool) -> anyhow::Result<()> {
    if !*header_printed {
        println!("{}", view::render_reply_header());
        *header_printed = true;
    }
    print!("{text}");
    flush()
}
