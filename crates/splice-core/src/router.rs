//! Execution routing: which transport runs a command and under which
//! session key.

use std::fmt;

use crate::frontmatter::Frontmatter;
use crate::protocol::{Envelope, ExecutionContext, OutboundMessage};
use crate::settings::Settings;

/// Key of the shared session.
pub const GLOBAL_SESSION_KEY: &str = "*";

/// Key used for in-process execution.
pub const IN_PROCESS_KEY: &str = "<in-process>";

/// Identifies a session: the shared one, a document, or in-process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn global() -> Self {
        Self(GLOBAL_SESSION_KEY.to_string())
    }

    pub fn in_process() -> Self {
        Self(IN_PROCESS_KEY.to_string())
    }

    pub fn for_document(path: &str) -> Self {
        Self(path.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Evaluated by the in-process evaluator.
    InProcess,
    /// Sent to an interpreter process.
    Process { structured: bool },
}

/// Routing decisions for one settings snapshot.
#[derive(Debug, Clone)]
pub struct Router {
    transport: Transport,
    separate_sessions: bool,
}

impl Router {
    /// Advanced mode selects the process transport, except on mobile hosts
    /// where processes cannot be spawned.
    pub fn new(settings: &Settings, mobile: bool) -> Self {
        let transport = if settings.advanced_mode && !mobile {
            Transport::Process {
                structured: settings.structured_protocol,
            }
        } else {
            Transport::InProcess
        };
        Self {
            transport,
            separate_sessions: settings.separate_sessions,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Session key for a command issued while `active` is the active document.
    pub fn route_key(&self, active: Option<&str>) -> SessionKey {
        match (self.transport, active) {
            (Transport::InProcess, _) => SessionKey::in_process(),
            (Transport::Process { .. }, Some(path)) if self.separate_sessions => {
                SessionKey::for_document(path)
            }
            _ => SessionKey::global(),
        }
    }

    /// Build the outbound message for `command`.
    ///
    /// `frontmatter` is only used by the structured protocol; a missing
    /// mapping serializes as `{}`.
    pub fn message(
        &self,
        command: &str,
        frontmatter: Option<Frontmatter>,
        context: ExecutionContext,
    ) -> OutboundMessage {
        match self.transport {
            Transport::Process { structured: true } => OutboundMessage::Structured(Envelope {
                command: command.to_string(),
                frontmatter: frontmatter.unwrap_or_default(),
                context,
            }),
            _ => OutboundMessage::Plain(command.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advanced(structured: bool, separate: bool) -> Settings {
        Settings {
            advanced_mode: true,
            structured_protocol: structured,
            separate_sessions: separate,
            ..Settings::default()
        }
    }

    #[test]
    fn test_transport_selection() {
        assert_eq!(
            Router::new(&Settings::default(), false).transport(),
            Transport::InProcess
        );
        assert_eq!(
            Router::new(&advanced(true, false), false).transport(),
            Transport::Process { structured: true }
        );
        assert_eq!(
            Router::new(&advanced(false, false), false).transport(),
            Transport::Process { structured: false }
        );
        assert_eq!(
            Router::new(&advanced(true, false), true).transport(),
            Transport::InProcess
        );
    }

    #[test]
    fn test_route_keys() {
        let shared = Router::new(&advanced(true, false), false);
        assert_eq!(shared.route_key(Some("a.md")), SessionKey::global());

        let separate = Router::new(&advanced(true, true), false);
        assert_eq!(separate.route_key(Some("a.md")).as_str(), "a.md");
        assert_eq!(separate.route_key(None), SessionKey::global());

        let local = Router::new(&Settings::default(), false);
        assert_eq!(local.route_key(Some("a.md")).as_str(), IN_PROCESS_KEY);
    }

    #[test]
    fn test_message_shapes() {
        let context = ExecutionContext {
            note_path: "a.md".to_string(),
            cursor_line: 2,
            selected_text: None,
        };

        let plain = Router::new(&advanced(false, false), false).message("1", None, context.clone());
        assert_eq!(plain, OutboundMessage::Plain("1".to_string()));

        let structured = Router::new(&advanced(true, false), false).message("1", None, context);
        let OutboundMessage::Structured(envelope) = structured else {
            panic!("expected structured message");
        };
        assert!(envelope.frontmatter.is_empty());
        assert_eq!(envelope.context.cursor_line, 2);
    }
}
