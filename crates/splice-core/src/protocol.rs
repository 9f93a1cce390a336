//! Wire format between the pipeline and an interpreter process.
//!
//! Messages are line-delimited. In plain mode a message is the command text
//! followed by `\n`. In structured mode it is one JSON object per line:
//!
//! ```json
//! {"command":"1 + 1","frontmatter":{"title":"x"},"context":{"notePath":"a.md","cursorLine":3}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frontmatter::Frontmatter;

/// Where a command was issued from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionContext {
    pub note_path: String,
    pub cursor_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

/// Structured message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    #[serde(default)]
    pub frontmatter: Frontmatter,
    #[serde(default)]
    pub context: ExecutionContext,
}

/// A message sent to an interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Plain(String),
    Structured(Envelope),
}

impl OutboundMessage {
    /// The command carried by the message.
    pub fn command(&self) -> &str {
        match self {
            OutboundMessage::Plain(command) => command,
            OutboundMessage::Structured(envelope) => &envelope.command,
        }
    }

    /// Serialize as one newline-terminated line.
    pub fn encode(&self) -> Result<String> {
        let mut line = match self {
            OutboundMessage::Plain(command) => command.clone(),
            OutboundMessage::Structured(envelope) => serde_json::to_string(envelope)?,
        };
        line.push('\n');
        Ok(line)
    }
}

/// A message as seen by the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Plain(String),
    Structured(Envelope),
}

impl IncomingMessage {
    /// Decode one input line.
    ///
    /// Lines that look like JSON objects and parse as an [`Envelope`] are
    /// structured; everything else is plain text. Blank lines decode to
    /// `None`.
    pub fn decode_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        if line.trim_start().starts_with('{')
            && let Ok(envelope) = serde_json::from_str::<Envelope>(line)
        {
            return Some(IncomingMessage::Structured(envelope));
        }
        Some(IncomingMessage::Plain(line.to_string()))
    }

    pub fn command(&self) -> &str {
        match self {
            IncomingMessage::Plain(command) => command,
            IncomingMessage::Structured(envelope) => &envelope.command,
        }
    }
}
