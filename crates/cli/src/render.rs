use std::io::{self, Write};

use colored::Colorize;
use pdfchat_session::{ChatSession, Message, MessageLog, Sender};

pub const NO_SESSION_HINT: &str = "Upload PDFs to start chatting (/upload <files...>)";
pub const SESSION_HINT: &str = "Ask a question about your PDFs...";

/// Formats one log entry as a transcript line.
pub fn format_message(message: &Message) -> String {
    match message.sender {
        Sender::User => format!("{} {}", "you ›".blue().bold(), message.text),
        Sender::Ai => format!("{} {}", "assistant ›".green().bold(), message.text),
        Sender::System => format!("· {}", message.text).yellow().to_string(),
    }
}

pub fn status_line(session: &ChatSession) -> Option<&'static str> {
    if session.is_loading() {
        Some("Processing...")
    } else if session.is_ai_responding() {
        Some("assistant is typing...")
    } else {
        None
    }
}

pub fn prompt_hint(session: &ChatSession) -> &'static str {
    if session.has_session() {
        SESSION_HINT
    } else {
        NO_SESSION_HINT
    }
}

/// Prints each log entry exactly once, in log order.
#[derive(Debug, Default)]
pub struct Transcript {
    rendered: usize,
    last_status: Option<&'static str>,
}

impl Transcript {
    pub fn flush_messages(&mut self, log: &MessageLog, out: &mut impl Write) -> io::Result<()> {
        for message in log.since(self.rendered) {
            writeln!(out, "{}", format_message(message))?;
        }
        self.rendered = log.len();
        Ok(())
    }

    /// Writes new messages, then the status line if it changed since the last call.
    pub fn flush(&mut self, session: &ChatSession, out: &mut impl Write) -> io::Result<()> {
        self.flush_messages(session.messages(), out)?;

        let status = status_line(session);
        if status != self.last_status {
            if let Some(status) = status {
                writeln!(out, "{}", status.dimmed())?;
            }
            self.last_status = status;
        }
        out.flush()
    }
}
